//! Registry publishers.
//!
//! This module defines the [`Publisher`] trait that provider crates implement
//! to upload an [`ArtifactSet`] to a package registry.
//!
//! # Architecture
//!
//! The release crate provides:
//! - [`Publisher`] trait - interface for uploading artifacts
//! - [`PublishContext`] - what is being published and where
//! - [`PublishReceipt`] - the registry's acceptance
//!
//! Provider crates implement `Publisher`:
//! - `tagpub-github` - HTTP upload to a PyPI-compatible registry
//!
//! # Example
//!
//! ```rust,ignore
//! use tagpub_release::publisher::{Publisher, PublishContext, PublishReceipt};
//!
//! struct MyRegistry;
//!
//! impl Publisher for MyRegistry {
//!     fn name(&self) -> &'static str { "my-registry" }
//!
//!     fn publish<'a>(
//!         &'a self,
//!         ctx: &'a PublishContext,
//!         artifacts: &'a ArtifactSet,
//!         credential: PublishCredential,
//!     ) -> Pin<Box<dyn Future<Output = Result<PublishReceipt>> + Send + 'a>> {
//!         Box::pin(async move {
//!             // Upload artifacts...
//!             Ok(PublishReceipt::new(&ctx.version, "https://registry/pkg/1.0.0/"))
//!         })
//!     }
//! }
//! ```

use crate::artifact::ArtifactSet;
use crate::credential::PublishCredential;
use crate::error::Result;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;

/// What is being published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishContext {
    /// Package namespace (project name) in the registry.
    pub namespace: String,
    /// Version being released (tag without its version marker).
    pub version: String,
    /// Tag that triggered the run.
    pub tag: String,
}

impl PublishContext {
    /// Creates a new publish context.
    #[must_use]
    pub fn new(
        namespace: impl Into<String>,
        version: impl Into<String>,
        tag: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            version: version.into(),
            tag: tag.into(),
        }
    }
}

/// The registry's acceptance of a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishReceipt {
    /// Version the registry accepted.
    pub version: String,
    /// Where the release can be found.
    pub location: String,
    /// Artifact file names uploaded, in upload order.
    pub uploaded: Vec<String>,
}

impl PublishReceipt {
    /// Creates a receipt.
    #[must_use]
    pub fn new(version: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            location: location.into(),
            uploaded: Vec::new(),
        }
    }

    /// Sets the uploaded file names.
    #[must_use]
    pub fn with_uploaded(mut self, uploaded: Vec<String>) -> Self {
        self.uploaded = uploaded;
        self
    }
}

/// Uploads artifacts to a registry.
///
/// The credential is passed by value: a publisher owns it for the duration
/// of one upload and drops it afterwards. Implementations must not retry a
/// partially failed upload; registries reject re-uploads of accepted files.
///
/// Failures are `PublishRejected` for business-rule refusals (duplicate
/// version, checksum mismatch) and `PublishUnavailable` for transient faults.
pub trait Publisher: Send + Sync {
    /// Returns the name of this publisher (e.g., "pypi").
    fn name(&self) -> &'static str;

    /// Publishes the given artifacts.
    fn publish<'a>(
        &'a self,
        ctx: &'a PublishContext,
        artifacts: &'a ArtifactSet,
        credential: PublishCredential,
    ) -> Pin<Box<dyn Future<Output = Result<PublishReceipt>> + Send + 'a>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_context_new() {
        let ctx = PublishContext::new("my-package", "1.2.3", "v1.2.3");
        assert_eq!(ctx.namespace, "my-package");
        assert_eq!(ctx.version, "1.2.3");
        assert_eq!(ctx.tag, "v1.2.3");
    }

    #[test]
    fn test_publish_receipt_builder() {
        let receipt = PublishReceipt::new("1.2.3", "https://pypi.org/project/my-package/1.2.3/")
            .with_uploaded(vec!["my_package-1.2.3.tar.gz".into()]);
        assert_eq!(receipt.version, "1.2.3");
        assert_eq!(receipt.uploaded.len(), 1);
    }

    #[test]
    fn test_publish_receipt_serializes() {
        let receipt = PublishReceipt::new("1.0.0", "https://example.com/pkg/1.0.0/");
        let json = serde_json::to_value(&receipt).unwrap();
        assert_eq!(json["location"], "https://example.com/pkg/1.0.0/");
    }
}
