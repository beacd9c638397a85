//! Toolchain pinning.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Tool and version a build requires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolchainSpec {
    /// Executable name or path (e.g. "python3").
    pub tool: String,
    /// Version that must be reported by the tool (e.g. "3.12").
    pub version: String,
}

impl ToolchainSpec {
    /// Creates a spec.
    #[must_use]
    pub fn new(tool: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for ToolchainSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.tool, self.version)
    }
}

/// A provisioned toolchain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolchainHandle {
    /// Tool that was provisioned.
    pub tool: String,
    /// Full version string the tool reported.
    pub reported_version: String,
    /// Resolved location, when known.
    pub path: Option<PathBuf>,
}

/// Installs or verifies the toolchain a build needs.
#[async_trait]
pub trait ToolchainProvisioner: Send + Sync {
    /// Provisions `spec`.
    ///
    /// # Errors
    ///
    /// Implementations return `DependencyUnavailable` on failure.
    async fn provision(&self, spec: &ToolchainSpec) -> Result<ToolchainHandle>;
}
