//! Registry upload over the legacy multipart API.
//!
//! Each artifact is one `POST` to the upload endpoint, authenticated as
//! `__token__` with the minted credential as password, and carrying the
//! artifact's SHA-256 digest so the registry can verify the payload.
//!
//! Status mapping:
//! - 2xx: accepted
//! - 400, 401, 403, 409: [`Error::PublishRejected`] (duplicate file, bad
//!   checksum, credential refused or not valid for the project)
//! - anything else, or a transport error: [`Error::PublishUnavailable`]

use crate::http::{client, excerpt};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use std::future::Future;
use std::pin::Pin;
use tagpub_release::config::require_secure_endpoint;
use tagpub_release::{
    Artifact, ArtifactSet, Error, PublishContext, PublishCredential, PublishReceipt, Publisher,
    RegistryConfig, Result,
};
use tracing::{debug, info};

/// Username the registry expects for token authentication.
const TOKEN_USERNAME: &str = "__token__";

/// Uploads artifacts to a PyPI-compatible registry.
#[derive(Debug, Clone)]
pub struct HttpPublisher {
    client: Client,
    name: &'static str,
    upload_url: String,
    project_url: String,
}

impl HttpPublisher {
    /// Creates a publisher for the given endpoints.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the upload endpoint is not
    /// integrity-protected.
    pub fn new(upload_url: impl Into<String>, project_url: impl Into<String>) -> Result<Self> {
        let upload_url = upload_url.into();
        require_secure_endpoint("registry.upload_url", &upload_url)?;
        Ok(Self {
            client: client()?,
            name: "pypi",
            upload_url,
            project_url: project_url.into(),
        })
    }

    /// Creates a publisher from the registry section of the configuration.
    ///
    /// # Errors
    ///
    /// See [`HttpPublisher::new`].
    pub fn from_config(registry: &RegistryConfig) -> Result<Self> {
        Self::new(&registry.upload_url, &registry.project_url)
    }

    /// Where an accepted release can be found.
    #[must_use]
    pub fn release_location(&self, namespace: &str, version: &str) -> String {
        format!(
            "{}/{namespace}/{version}/",
            self.project_url.trim_end_matches('/')
        )
    }

    async fn upload_one(
        &self,
        ctx: &PublishContext,
        artifact: &Artifact,
        credential: &PublishCredential,
    ) -> Result<()> {
        let content = tokio::fs::read(&artifact.path).await.map_err(|e| {
            Error::publish_unavailable(format!("cannot read {}: {e}", artifact.path.display()))
        })?;

        let form = Form::new()
            .text(":action", "file_upload")
            .text("protocol_version", "1")
            .text("name", ctx.namespace.clone())
            .text("version", ctx.version.clone())
            .text("sha256_digest", artifact.sha256.clone())
            .part(
                "content",
                Part::bytes(content).file_name(artifact.file_name.clone()),
            );

        debug!(
            artifact = %artifact.file_name,
            size = artifact.size,
            sha256 = %artifact.sha256,
            "Uploading artifact"
        );

        let response = self
            .client
            .post(&self.upload_url)
            .basic_auth(TOKEN_USERNAME, Some(credential.expose()))
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                Error::publish_unavailable(format!("upload of {} failed: {e}", artifact.file_name))
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let reason = if body.trim().is_empty() {
            status.to_string()
        } else {
            format!("{status}: {}", excerpt(&body))
        };

        match status {
            StatusCode::BAD_REQUEST
            | StatusCode::UNAUTHORIZED
            | StatusCode::FORBIDDEN
            | StatusCode::CONFLICT => Err(Error::publish_rejected(
                reason,
                Some(artifact.file_name.clone()),
            )),
            _ => Err(Error::publish_unavailable(format!(
                "upload of {} returned {reason}",
                artifact.file_name
            ))),
        }
    }
}

impl Publisher for HttpPublisher {
    fn name(&self) -> &'static str {
        self.name
    }

    fn publish<'a>(
        &'a self,
        ctx: &'a PublishContext,
        artifacts: &'a ArtifactSet,
        credential: PublishCredential,
    ) -> Pin<Box<dyn Future<Output = Result<PublishReceipt>> + Send + 'a>> {
        Box::pin(async move {
            if credential.namespace() != ctx.namespace {
                return Err(Error::invalid_state(format!(
                    "credential for '{}' cannot publish '{}'",
                    credential.namespace(),
                    ctx.namespace
                )));
            }

            let mut uploaded = Vec::with_capacity(artifacts.len());
            for artifact in artifacts {
                self.upload_one(ctx, artifact, &credential).await?;
                info!(artifact = %artifact.file_name, "Artifact accepted");
                uploaded.push(artifact.file_name.clone());
            }
            drop(credential);

            Ok(PublishReceipt::new(
                &ctx.version,
                self.release_location(&ctx.namespace, &ctx.version),
            )
            .with_uploaded(uploaded))
        })
    }
}
