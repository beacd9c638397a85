//! Process-backed collaborators.
//!
//! - [`GitCheckout`] clones the repository at the triggering tag
//! - [`CommandProvisioner`] verifies a pinned tool version
//! - [`CommandBuilder`] runs the build command and collects its outputs

use crate::artifact::{ArtifactSet, CHECKSUMS_FILE};
use crate::builder::Builder;
use crate::config::BuildConfig;
use crate::error::{Error, Result};
use crate::source::{CheckoutProvider, SourceTree};
use crate::toolchain::{ToolchainHandle, ToolchainProvisioner, ToolchainSpec};
use crate::trigger::TriggeredRelease;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Output;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info};

/// Lines of stderr kept in error messages.
const STDERR_TAIL_LINES: usize = 20;

fn stderr_tail(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let lines: Vec<&str> = stderr.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Clones the tagged revision into a temporary directory.
#[derive(Debug, Clone)]
pub struct GitCheckout {
    repository: String,
    git: PathBuf,
}

impl GitCheckout {
    /// Creates a checkout provider for `repository` (URL or local path).
    #[must_use]
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            git: PathBuf::from("git"),
        }
    }

    /// Uses a specific git executable.
    #[must_use]
    pub fn with_git(mut self, git: impl Into<PathBuf>) -> Self {
        self.git = git.into();
        self
    }
}

#[async_trait]
impl CheckoutProvider for GitCheckout {
    async fn checkout(&self, release: &TriggeredRelease) -> Result<SourceTree> {
        let dir = TempDir::new().map_err(|e| {
            Error::dependency_unavailable("checkout", format!("cannot create work dir: {e}"))
        })?;

        info!(
            repository = %self.repository,
            tag = %release.tag(),
            "Checking out tagged source"
        );

        let output = Command::new(&self.git)
            .args(["clone", "--quiet", "--depth", "1", "--branch"])
            .arg(release.tag())
            .arg(&self.repository)
            .arg(dir.path())
            .output()
            .await
            .map_err(|e| {
                Error::dependency_unavailable("checkout", format!("cannot run git: {e}"))
            })?;

        if !output.status.success() {
            return Err(Error::dependency_unavailable(
                "checkout",
                format!(
                    "git clone of {} at {} failed ({}): {}",
                    self.repository,
                    release.tag(),
                    output.status,
                    stderr_tail(&output)
                ),
            ));
        }

        Ok(SourceTree::ephemeral(dir, release.tag()))
    }
}

/// Verifies that `<tool> --version` reports the pinned version.
#[derive(Debug, Clone, Default)]
pub struct CommandProvisioner;

impl CommandProvisioner {
    /// Creates a provisioner.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ToolchainProvisioner for CommandProvisioner {
    async fn provision(&self, spec: &ToolchainSpec) -> Result<ToolchainHandle> {
        let output = Command::new(&spec.tool)
            .arg("--version")
            .output()
            .await
            .map_err(|e| {
                Error::dependency_unavailable(
                    "toolchain",
                    format!("cannot run {}: {e}", spec.tool),
                )
            })?;

        if !output.status.success() {
            return Err(Error::dependency_unavailable(
                "toolchain",
                format!("{} --version exited with {}", spec.tool, output.status),
            ));
        }

        // Some tools (older Python) print their version on stderr.
        let reported = [&output.stdout, &output.stderr]
            .iter()
            .map(|b| String::from_utf8_lossy(b).trim().to_string())
            .find(|s| !s.is_empty())
            .unwrap_or_default();

        if !reported_matches(&reported, &spec.version) {
            return Err(Error::dependency_unavailable(
                "toolchain",
                format!(
                    "{} reports '{}', pinned version is {}",
                    spec.tool, reported, spec.version
                ),
            ));
        }

        debug!(tool = %spec.tool, version = %reported, "Toolchain verified");

        Ok(ToolchainHandle {
            tool: spec.tool.clone(),
            reported_version: reported,
            path: None,
        })
    }
}

/// True if any whitespace-separated word of `reported` equals `pinned` or
/// starts with `pinned.` (so "3.12" accepts "Python 3.12.4").
fn reported_matches(reported: &str, pinned: &str) -> bool {
    reported.split_whitespace().any(|word| {
        let word = word.trim_start_matches('v');
        word == pinned
            || word
                .strip_prefix(pinned)
                .is_some_and(|rest| rest.starts_with('.'))
    })
}

/// Runs the configured build command inside the source tree.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    config: BuildConfig,
}

impl CommandBuilder {
    /// Creates a builder from build settings.
    #[must_use]
    pub const fn new(config: BuildConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Builder for CommandBuilder {
    async fn build(&self, tree: &SourceTree, toolchain: &ToolchainHandle) -> Result<ArtifactSet> {
        let Some((program, args)) = self.config.command.split_first() else {
            return Err(Error::build_failure("build command is empty"));
        };

        info!(
            command = %self.config.command.join(" "),
            toolchain = %toolchain.reported_version,
            tag = %tree.tag(),
            "Running build"
        );

        let output = Command::new(program)
            .args(args)
            .current_dir(tree.root())
            .output()
            .await
            .map_err(|e| Error::build_failure(format!("cannot run {program}: {e}")))?;

        if !output.status.success() {
            return Err(Error::build_failure(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                stderr_tail(&output)
            )));
        }

        let output_dir = tree.root().join(&self.config.output_dir);
        let artifacts = ArtifactSet::collect(&output_dir)?;

        if self.config.checksums {
            artifacts.checksums().write(&output_dir.join(CHECKSUMS_FILE))?;
        }

        info!(artifact_count = artifacts.len(), "Build produced artifacts");
        Ok(artifacts)
    }
}
