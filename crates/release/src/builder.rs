//! Builder contract.

use crate::artifact::ArtifactSet;
use crate::error::Result;
use crate::source::SourceTree;
use crate::toolchain::ToolchainHandle;
use async_trait::async_trait;

/// Turns a source tree into distributable artifacts.
///
/// Implementations must fail with `BuildFailure` rather than return a
/// partial set.
#[async_trait]
pub trait Builder: Send + Sync {
    /// Builds `tree` with the provisioned `toolchain`.
    async fn build(&self, tree: &SourceTree, toolchain: &ToolchainHandle) -> Result<ArtifactSet>;
}
