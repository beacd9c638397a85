//! Identity broker: the trust-exchange protocol.
//!
//! The broker turns the run's ambient identity token into a publish
//! credential. It walks a fixed state machine:
//!
//! ```text
//! Unauthenticated -> TokenRequested -> CredentialIssued -> Consumed
//!                                  \-> Rejected
//! ```
//!
//! The token is fetched fresh from an [`IdentityTokenSource`] passed in by the
//! caller (never looked up globally), the exchange is attempted exactly once,
//! and the credential is handed to the publisher by value exactly once.

use crate::credential::{IdentityToken, PublishCredential};
use crate::error::{Error, Result};
use crate::scope::MintCapability;
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

/// Claims the run asserts about itself during the exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityClaims {
    /// Audience the identity token is scoped to.
    pub audience: String,
    /// Repository the run belongs to (e.g. "org/repo").
    pub repository: String,
    /// Deployment environment the run is bound to.
    pub environment: String,
    /// Fully-qualified ref that triggered the run.
    #[serde(rename = "ref")]
    pub reference: String,
}

/// Outcome of presenting a token to the federation endpoint.
#[derive(Debug)]
pub enum ExchangeOutcome {
    /// The registry accepted the claims and minted a credential.
    Issued(PublishCredential),
    /// The registry refused the claims.
    Rejected {
        /// Human-readable reason.
        reason: String,
        /// Machine-readable reason code, if any.
        code: Option<String>,
    },
}

/// Source of the run's ambient identity token.
#[async_trait]
pub trait IdentityTokenSource: Send + Sync {
    /// Requests a new token for `audience`.
    ///
    /// Implementations must not cache tokens between calls.
    async fn fetch(&self, audience: &str) -> Result<IdentityToken>;
}

/// Client for the registry's federation endpoint.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    /// Presents the token and claims and returns the registry's verdict.
    ///
    /// Transport failures are returned as errors; a refusal of the claims is
    /// an [`ExchangeOutcome::Rejected`].
    async fn exchange(
        &self,
        token: IdentityToken,
        claims: &IdentityClaims,
    ) -> Result<ExchangeOutcome>;
}

/// State of a broker within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerState {
    /// Nothing has been requested yet.
    Unauthenticated,
    /// The token has been presented to the federation endpoint.
    TokenRequested,
    /// A credential is held and waiting for handoff.
    CredentialIssued,
    /// The credential was handed to the publisher.
    Consumed,
    /// The exchange failed; the run must abort.
    Rejected,
}

impl fmt::Display for BrokerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unauthenticated => "unauthenticated",
            Self::TokenRequested => "token-requested",
            Self::CredentialIssued => "credential-issued",
            Self::Consumed => "consumed",
            Self::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// Per-run identity broker.
pub struct IdentityBroker<'a> {
    tokens: &'a dyn IdentityTokenSource,
    federation: &'a dyn TokenExchange,
    claims: IdentityClaims,
    namespace: String,
    capability: Option<MintCapability>,
    state: BrokerState,
    credential: Option<PublishCredential>,
}

impl<'a> IdentityBroker<'a> {
    /// Creates a broker for one run.
    ///
    /// `capability` proves the run was admitted by a tag trigger and scoped
    /// by an environment granting `mint_identity_token`. `namespace` is the
    /// only package namespace an issued credential may cover.
    #[must_use]
    pub fn new(
        capability: MintCapability,
        tokens: &'a dyn IdentityTokenSource,
        federation: &'a dyn TokenExchange,
        claims: IdentityClaims,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            tokens,
            federation,
            claims,
            namespace: namespace.into(),
            capability: Some(capability),
            state: BrokerState::Unauthenticated,
            credential: None,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> BrokerState {
        self.state
    }

    /// Claims presented by this broker.
    #[must_use]
    pub const fn claims(&self) -> &IdentityClaims {
        &self.claims
    }

    /// Performs the exchange.
    ///
    /// # Errors
    ///
    /// Returns `TrustExchangeFailure` if the token cannot be obtained, the
    /// registry rejects the claims, or the issued credential is broader than
    /// the configured namespace or already expired. Returns `InvalidState`
    /// if called more than once.
    pub async fn request_credential(&mut self) -> Result<()> {
        let Some(capability) = self.capability.take() else {
            return Err(Error::invalid_state(format!(
                "credential already requested (state: {})",
                self.state
            )));
        };

        let result = self.exchange(&capability).await;
        match result {
            Ok(credential) => {
                info!(
                    environment = %capability.environment(),
                    tag = %capability.tag(),
                    namespace = %credential.namespace(),
                    expires_at = ?credential.expires_at(),
                    "Publish credential issued"
                );
                self.credential = Some(credential);
                self.state = BrokerState::CredentialIssued;
                Ok(())
            }
            Err(e) => {
                self.state = BrokerState::Rejected;
                warn!(
                    environment = %capability.environment(),
                    tag = %capability.tag(),
                    error = %e,
                    "Trust exchange failed"
                );
                Err(e)
            }
        }
    }

    async fn exchange(&mut self, capability: &MintCapability) -> Result<PublishCredential> {
        if capability.environment() != self.claims.environment {
            return Err(Error::invalid_state(format!(
                "capability for environment '{}' cannot assert environment '{}'",
                capability.environment(),
                self.claims.environment
            )));
        }

        let token = self
            .tokens
            .fetch(&self.claims.audience)
            .await
            .map_err(|e| match e {
                Error::TrustExchangeFailure { .. } => e,
                other => Error::trust_exchange(
                    format!("could not obtain identity token: {other}"),
                    None,
                ),
            })?;

        self.state = BrokerState::TokenRequested;

        match self.federation.exchange(token, &self.claims).await? {
            ExchangeOutcome::Issued(credential) => self.check_scope(credential),
            ExchangeOutcome::Rejected { reason, code } => {
                Err(Error::trust_exchange(reason, code))
            }
        }
    }

    fn check_scope(&self, credential: PublishCredential) -> Result<PublishCredential> {
        if credential.namespace() != self.namespace {
            return Err(Error::trust_exchange(
                format!(
                    "credential scoped to '{}' but only '{}' may be published",
                    credential.namespace(),
                    self.namespace
                ),
                Some("scope-mismatch".to_string()),
            ));
        }
        if credential.is_expired_at(Utc::now()) {
            return Err(Error::trust_exchange(
                "credential was already expired when issued",
                Some("expired".to_string()),
            ));
        }
        Ok(credential)
    }

    /// Hands the credential to the publisher. Callable exactly once.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if no credential is held.
    pub fn hand_off(&mut self) -> Result<PublishCredential> {
        let credential = self.credential.take().ok_or_else(|| {
            Error::invalid_state(format!("no credential to hand off (state: {})", self.state))
        })?;
        self.state = BrokerState::Consumed;
        Ok(credential)
    }
}

impl fmt::Debug for IdentityBroker<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityBroker")
            .field("claims", &self.claims)
            .field("namespace", &self.namespace)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ReleaseEvent;
    use crate::scope::{EnvironmentConfig, EnvironmentGate, Permission};
    use crate::trigger::{TriggerPolicy, admit};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticTokens {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl IdentityTokenSource for StaticTokens {
        async fn fetch(&self, audience: &str) -> Result<IdentityToken> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::dependency_unavailable("oidc", "no token endpoint"));
            }
            Ok(IdentityToken::new("oidc-token".to_string(), audience))
        }
    }

    enum Verdict {
        Issue(&'static str),
        Reject(&'static str),
    }

    struct ScriptedExchange {
        verdict: Verdict,
        seen: Mutex<Vec<IdentityClaims>>,
    }

    #[async_trait]
    impl TokenExchange for ScriptedExchange {
        async fn exchange(
            &self,
            token: IdentityToken,
            claims: &IdentityClaims,
        ) -> Result<ExchangeOutcome> {
            assert_eq!(token.expose(), "oidc-token");
            self.seen.lock().unwrap().push(claims.clone());
            Ok(match self.verdict {
                Verdict::Issue(ns) => {
                    ExchangeOutcome::Issued(PublishCredential::new("cred".to_string(), ns))
                }
                Verdict::Reject(reason) => ExchangeOutcome::Rejected {
                    reason: reason.to_string(),
                    code: Some("invalid-publisher".to_string()),
                },
            })
        }
    }

    fn capability() -> MintCapability {
        let gate = EnvironmentGate::new(vec![EnvironmentConfig::new(
            "pypi",
            [Permission::ReadContents, Permission::MintIdentityToken],
        )])
        .unwrap();
        let release = admit(
            &ReleaseEvent::tag("v1.2.3"),
            &TriggerPolicy::new("v*").unwrap(),
        )
        .unwrap();
        gate.resolve("pypi").unwrap().mint_capability(&release).unwrap()
    }

    fn claims() -> IdentityClaims {
        IdentityClaims {
            audience: "pypi".into(),
            repository: "org/repo".into(),
            environment: "pypi".into(),
            reference: "refs/tags/v1.2.3".into(),
        }
    }

    fn tokens() -> StaticTokens {
        StaticTokens {
            calls: AtomicUsize::new(0),
            fail: false,
        }
    }

    fn exchange(verdict: Verdict) -> ScriptedExchange {
        ScriptedExchange {
            verdict,
            seen: Mutex::new(Vec::new()),
        }
    }

    #[tokio::test]
    async fn test_issue_and_hand_off_once() {
        let tokens = tokens();
        let federation = exchange(Verdict::Issue("my-package"));
        let mut broker = IdentityBroker::new(capability(), &tokens, &federation, claims(), "my-package");
        assert_eq!(broker.state(), BrokerState::Unauthenticated);

        broker.request_credential().await.unwrap();
        assert_eq!(broker.state(), BrokerState::CredentialIssued);

        let credential = broker.hand_off().unwrap();
        assert_eq!(credential.namespace(), "my-package");
        assert_eq!(broker.state(), BrokerState::Consumed);

        let again = broker.hand_off().unwrap_err();
        assert_eq!(again.label(), "InvalidState");
        assert_eq!(federation.seen.lock().unwrap().as_slice(), &[claims()]);
    }

    #[tokio::test]
    async fn test_rejection_is_trust_exchange_failure() {
        let tokens = tokens();
        let federation = exchange(Verdict::Reject("claims mismatch"));
        let mut broker = IdentityBroker::new(capability(), &tokens, &federation, claims(), "my-package");

        let err = broker.request_credential().await.unwrap_err();
        assert_eq!(err.label(), "TrustExchangeFailure");
        assert!(err.to_string().contains("claims mismatch"));
        assert_eq!(broker.state(), BrokerState::Rejected);
        assert!(broker.hand_off().is_err());
    }

    #[tokio::test]
    async fn test_exchange_is_never_retried() {
        let tokens = tokens();
        let federation = exchange(Verdict::Reject("claims mismatch"));
        let mut broker = IdentityBroker::new(capability(), &tokens, &federation, claims(), "my-package");

        assert!(broker.request_credential().await.is_err());
        let second = broker.request_credential().await.unwrap_err();
        assert_eq!(second.label(), "InvalidState");
        assert_eq!(tokens.calls.load(Ordering::SeqCst), 1);
        assert_eq!(federation.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_broader_scope_rejected() {
        let tokens = tokens();
        let federation = exchange(Verdict::Issue("*"));
        let mut broker = IdentityBroker::new(capability(), &tokens, &federation, claims(), "my-package");

        let err = broker.request_credential().await.unwrap_err();
        assert_eq!(err.label(), "TrustExchangeFailure");
        assert!(broker.hand_off().is_err());
    }

    #[tokio::test]
    async fn test_token_fetch_failure_is_trust_exchange_failure() {
        let tokens = StaticTokens {
            calls: AtomicUsize::new(0),
            fail: true,
        };
        let federation = exchange(Verdict::Issue("my-package"));
        let mut broker = IdentityBroker::new(capability(), &tokens, &federation, claims(), "my-package");

        let err = broker.request_credential().await.unwrap_err();
        assert_eq!(err.label(), "TrustExchangeFailure");
        assert!(federation.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_capability_environment_must_match_claims() {
        let tokens = tokens();
        let federation = exchange(Verdict::Issue("my-package"));
        let mut wrong = claims();
        wrong.environment = "prod".into();
        let mut broker = IdentityBroker::new(capability(), &tokens, &federation, wrong, "my-package");

        let err = broker.request_credential().await.unwrap_err();
        assert_eq!(err.label(), "InvalidState");
        assert_eq!(tokens.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_claims_serialize_ref_field() {
        let json = serde_json::to_value(claims()).unwrap();
        assert_eq!(json["ref"], "refs/tags/v1.2.3");
        assert_eq!(json["repository"], "org/repo");
    }
}
