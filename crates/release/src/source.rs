//! Source trees materialized for a run.

use crate::error::Result;
use crate::trigger::TriggeredRelease;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Exact tagged source tree, owned by one run.
///
/// When backed by a temporary directory the tree is deleted on drop, which
/// happens at the end of the run at the latest.
#[derive(Debug)]
pub struct SourceTree {
    root: PathBuf,
    tag: String,
    _guard: Option<TempDir>,
}

impl SourceTree {
    /// Wraps a temporary checkout that is removed when the tree is dropped.
    #[must_use]
    pub fn ephemeral(dir: TempDir, tag: impl Into<String>) -> Self {
        Self {
            root: dir.path().to_path_buf(),
            tag: tag.into(),
            _guard: Some(dir),
        }
    }

    /// Wraps a directory the caller owns; it is left in place on drop.
    #[must_use]
    pub fn borrowed(root: impl Into<PathBuf>, tag: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            tag: tag.into(),
            _guard: None,
        }
    }

    /// Root of the tree.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Tag the tree was checked out at.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }
}

/// Materializes the source tree for a triggered release.
#[async_trait]
pub trait CheckoutProvider: Send + Sync {
    /// Checks out exactly the tag of `release`.
    ///
    /// # Errors
    ///
    /// Implementations return `DependencyUnavailable` on failure.
    async fn checkout(&self, release: &TriggeredRelease) -> Result<SourceTree>;
}
