//! Shared HTTP client setup.

use reqwest::Client;
use std::time::Duration;
use tagpub_release::{Error, Result};

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Builds the client used for all identity and registry calls.
///
/// Redirects are disabled so credentials are only ever sent to the
/// configured endpoint.
///
/// # Errors
///
/// Returns `DependencyUnavailable` if the TLS backend cannot be initialized.
pub fn client() -> Result<Client> {
    Client::builder()
        .user_agent(concat!("tagpub/", env!("CARGO_PKG_VERSION")))
        .timeout(REQUEST_TIMEOUT)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| Error::dependency_unavailable("http", format!("cannot build HTTP client: {e}")))
}

/// Truncates a response body for inclusion in an error message.
pub(crate) fn excerpt(body: &str) -> String {
    const LIMIT: usize = 512;
    let trimmed = body.trim();
    match trimmed.char_indices().nth(LIMIT) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
