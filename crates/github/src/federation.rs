//! HTTP client for a registry's token federation endpoint.
//!
//! Request: `POST <federation_url>` with `{"token": <jwt>, "claims": {...}}`.
//! A 2xx response carries `{"success": true, "token", "namespace", "expires"}`.
//! Any other response carries `{"message", "errors": [{"code", "description"}]}`
//! and is treated as a rejection of the claims, except 5xx which means the
//! endpoint itself is unhealthy.

use crate::http::{client, excerpt};
use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tagpub_release::config::require_secure_endpoint;
use tagpub_release::{
    Error, ExchangeOutcome, IdentityClaims, IdentityToken, PublishCredential, Result,
    TokenExchange,
};
use tracing::{debug, warn};

#[derive(Serialize)]
struct MintRequest<'a> {
    token: &'a str,
    claims: &'a IdentityClaims,
}

#[derive(Deserialize)]
struct MintResponse {
    #[serde(default)]
    success: bool,
    token: Option<String>,
    namespace: Option<String>,
    expires: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct MintErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    errors: Vec<MintError>,
}

#[derive(Deserialize)]
struct MintError {
    code: String,
    #[serde(default)]
    description: String,
}

/// Federation endpoint client.
#[derive(Debug, Clone)]
pub struct HttpTokenExchange {
    client: Client,
    endpoint: String,
}

impl HttpTokenExchange {
    /// Creates a client for `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the endpoint is not integrity-protected.
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let endpoint = endpoint.into();
        require_secure_endpoint("registry.federation_url", &endpoint)?;
        Ok(Self {
            client: client()?,
            endpoint,
        })
    }
}

fn unavailable(message: String) -> Error {
    Error::trust_exchange(message, Some("federation-unavailable".to_string()))
}

fn rejection_from(status: reqwest::StatusCode, body: &str) -> ExchangeOutcome {
    let Ok(parsed) = serde_json::from_str::<MintErrorBody>(body) else {
        return ExchangeOutcome::Rejected {
            reason: format!(
                "federation endpoint returned HTTP {status}: {}",
                excerpt(body)
            ),
            code: None,
        };
    };

    let message = parsed
        .message
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("federation endpoint returned HTTP {status}"));
    let details: Vec<&str> = parsed
        .errors
        .iter()
        .map(|e| e.description.as_str())
        .filter(|d| !d.is_empty())
        .collect();
    let reason = if details.is_empty() {
        message
    } else {
        format!("{message}: {}", details.join("; "))
    };

    ExchangeOutcome::Rejected {
        reason,
        code: parsed.errors.first().map(|e| e.code.clone()),
    }
}

#[async_trait]
impl TokenExchange for HttpTokenExchange {
    async fn exchange(
        &self,
        token: IdentityToken,
        claims: &IdentityClaims,
    ) -> Result<ExchangeOutcome> {
        debug!(
            endpoint = %self.endpoint,
            audience = %claims.audience,
            repository = %claims.repository,
            environment = %claims.environment,
            reference = %claims.reference,
            "Presenting identity claims"
        );

        let request = MintRequest {
            token: token.expose(),
            claims,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| unavailable(format!("federation endpoint unreachable: {e}")))?;
        drop(token);

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| unavailable(format!("cannot read federation response: {e}")))?;

        if status.is_server_error() {
            warn!(%status, "Federation endpoint failed");
            return Err(unavailable(format!(
                "federation endpoint returned HTTP {status}: {}",
                excerpt(&body)
            )));
        }
        if !status.is_success() {
            return Ok(rejection_from(status, &body));
        }

        let minted: MintResponse = serde_json::from_str(&body).map_err(|e| {
            Error::trust_exchange(
                format!("malformed federation response: {e}"),
                Some("malformed-response".to_string()),
            )
        })?;

        let (true, Some(value), Some(namespace)) = (minted.success, minted.token, minted.namespace)
        else {
            return Ok(ExchangeOutcome::Rejected {
                reason: minted
                    .message
                    .unwrap_or_else(|| "federation endpoint did not issue a credential".to_string()),
                code: None,
            });
        };

        let mut credential = PublishCredential::new(value, namespace);
        if let Some(expires) = minted.expires {
            let expires_at = DateTime::from_timestamp(expires, 0).ok_or_else(|| {
                Error::trust_exchange(
                    format!("credential expiry {expires} is out of range"),
                    Some("malformed-response".to_string()),
                )
            })?;
            credential = credential.with_expiry(expires_at);
        }
        Ok(ExchangeOutcome::Issued(credential))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_rejection_uses_error_descriptions() {
        let body = r#"{"message":"Token request failed","errors":[{"code":"invalid-publisher","description":"claims mismatch"}]}"#;
        match rejection_from(StatusCode::UNPROCESSABLE_ENTITY, body) {
            ExchangeOutcome::Rejected { reason, code } => {
                assert_eq!(reason, "Token request failed: claims mismatch");
                assert_eq!(code.as_deref(), Some("invalid-publisher"));
            }
            ExchangeOutcome::Issued(_) => panic!("expected rejection"),
        }
    }

    #[test]
    fn test_rejection_without_json_body() {
        match rejection_from(StatusCode::FORBIDDEN, "forbidden") {
            ExchangeOutcome::Rejected { reason, code } => {
                assert!(reason.contains("403"));
                assert!(reason.contains("forbidden"));
                assert!(code.is_none());
            }
            ExchangeOutcome::Issued(_) => panic!("expected rejection"),
        }
    }

    #[test]
    fn test_plain_http_endpoint_rejected() {
        let err = HttpTokenExchange::new("http://pypi.org/_/oidc/mint-token").unwrap_err();
        assert_eq!(err.label(), "ConfigurationError");
    }

    #[test]
    fn test_userinfo_endpoint_rejected() {
        let err =
            HttpTokenExchange::new("http://localhost:1@pypi-mirror.evil.com/mint").unwrap_err();
        assert_eq!(err.label(), "ConfigurationError");
    }
}
