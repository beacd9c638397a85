//! GitHub Actions OIDC identity token source.
//!
//! A job with `permissions: id-token: write` receives a request URL and a
//! bearer token for the runner's token service. Each [`fetch`] asks that
//! service for a new audience-scoped JWT; nothing is cached.
//!
//! [`fetch`]: IdentityTokenSource::fetch

use crate::http::{client, excerpt};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tagpub_release::config::require_secure_endpoint;
use tagpub_release::{Error, IdentityToken, IdentityTokenSource, Result};
use tracing::debug;

const REQUEST_URL_VAR: &str = "ACTIONS_ID_TOKEN_REQUEST_URL";
const REQUEST_TOKEN_VAR: &str = "ACTIONS_ID_TOKEN_REQUEST_TOKEN";

#[derive(Deserialize)]
struct TokenResponse {
    value: String,
}

/// Identity token source backed by the Actions runner token service.
#[derive(Debug)]
pub struct ActionsIdentityTokenSource {
    client: Client,
    request_url: String,
    request_token: SecretString,
}

impl ActionsIdentityTokenSource {
    /// Creates a source for an explicit endpoint.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the endpoint is not integrity-protected.
    pub fn new(request_url: impl Into<String>, request_token: SecretString) -> Result<Self> {
        let request_url = request_url.into();
        require_secure_endpoint(REQUEST_URL_VAR, &request_url)?;
        Ok(Self {
            client: client()?,
            request_url,
            request_token,
        })
    }

    /// Reads the runner's token service endpoint from the environment.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the job was not granted
    /// `id-token: write`.
    pub fn from_env() -> Result<Self> {
        let url = std::env::var(REQUEST_URL_VAR).ok().filter(|v| !v.is_empty());
        let token = std::env::var(REQUEST_TOKEN_VAR).ok().filter(|v| !v.is_empty());
        match (url, token) {
            (Some(url), Some(token)) => Self::new(url, SecretString::from(token)),
            _ => Err(Error::configuration(
                format!("{REQUEST_URL_VAR} / {REQUEST_TOKEN_VAR} are not set"),
                "Grant the job `permissions: id-token: write` and run it in the configured environment",
            )),
        }
    }
}

#[async_trait]
impl IdentityTokenSource for ActionsIdentityTokenSource {
    async fn fetch(&self, audience: &str) -> Result<IdentityToken> {
        debug!(audience, "Requesting identity token");

        let response = self
            .client
            .get(&self.request_url)
            .query(&[("audience", audience)])
            .bearer_auth(self.request_token.expose_secret())
            .send()
            .await
            .map_err(|e| {
                Error::trust_exchange(
                    format!("identity token request failed: {e}"),
                    Some("token-request".to_string()),
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::trust_exchange(
                format!(
                    "identity token request returned HTTP {status}: {}",
                    excerpt(&body)
                ),
                Some("token-request".to_string()),
            ));
        }

        let body: TokenResponse = response.json().await.map_err(|e| {
            Error::trust_exchange(
                format!("malformed identity token response: {e}"),
                Some("token-request".to_string()),
            )
        })?;

        if body.value.is_empty() {
            return Err(Error::trust_exchange(
                "identity token response was empty",
                Some("token-request".to_string()),
            ));
        }

        Ok(IdentityToken::new(body.value, audience))
    }
}
