//! In-memory secret types for the trust exchange.
//!
//! Both types wrap `secrecy::SecretString`, so the value is zeroed on drop and
//! `Debug`/`Display` print `[REDACTED]`. Neither is `Clone` nor serializable:
//! a token or credential exists once, in memory, for one run.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;

/// Short-lived, audience-scoped token issued to the run by its platform.
pub struct IdentityToken {
    inner: SecretString,
    audience: String,
}

impl IdentityToken {
    /// Wraps a freshly issued token.
    #[must_use]
    pub fn new(value: String, audience: impl Into<String>) -> Self {
        Self {
            inner: SecretString::from(value),
            audience: audience.into(),
        }
    }

    /// Audience the token was requested for.
    #[must_use]
    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Exposes the raw token for the federation request body.
    ///
    /// The caller must not log, persist or copy the value beyond the request.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.inner.expose_secret()
    }
}

impl fmt::Debug for IdentityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityToken")
            .field("audience", &self.audience)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

impl fmt::Display for IdentityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Registry credential returned by the federation endpoint.
///
/// Scoped to a single package namespace and time-boxed by the registry.
pub struct PublishCredential {
    inner: SecretString,
    namespace: String,
    expires_at: Option<DateTime<Utc>>,
}

impl PublishCredential {
    /// Wraps a credential minted for `namespace`.
    #[must_use]
    pub fn new(value: String, namespace: impl Into<String>) -> Self {
        Self {
            inner: SecretString::from(value),
            namespace: namespace.into(),
            expires_at: None,
        }
    }

    /// Sets the expiry reported by the registry.
    #[must_use]
    pub const fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Package namespace the credential can publish to.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Expiry instant, if the registry reported one.
    #[must_use]
    pub const fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Returns true if the credential is already past its expiry at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }

    /// Exposes the raw credential for the upload request.
    ///
    /// The caller must not log, persist or copy the value beyond the request.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.inner.expose_secret()
    }
}

impl fmt::Debug for PublishCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublishCredential")
            .field("namespace", &self.namespace)
            .field("expires_at", &self.expires_at)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

impl fmt::Display for PublishCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_identity_token_redacted() {
        let token = IdentityToken::new("eyJhbGciOi.secret".to_string(), "pypi");
        let debug = format!("{token:?}");
        assert!(!debug.contains("eyJhbGciOi"));
        assert!(debug.contains("[REDACTED]"));
        assert_eq!(token.to_string(), "[REDACTED]");
        assert_eq!(token.expose(), "eyJhbGciOi.secret");
    }

    #[test]
    fn test_publish_credential_redacted() {
        let cred = PublishCredential::new("pypi-AgEIcHlwaS5vcmc".to_string(), "my-package");
        let debug = format!("{cred:?}");
        assert!(!debug.contains("pypi-AgEI"));
        assert!(debug.contains("my-package"));
        assert_eq!(cred.to_string(), "[REDACTED]");
    }

    #[test]
    fn test_credential_expiry() {
        let now = Utc::now();
        let cred = PublishCredential::new("x".to_string(), "pkg").with_expiry(now);
        assert!(cred.is_expired_at(now));
        assert!(!cred.is_expired_at(now - Duration::seconds(1)));

        let open = PublishCredential::new("x".to_string(), "pkg");
        assert!(!open.is_expired_at(now));
    }
}
