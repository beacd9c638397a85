//! Error taxonomy for release runs.
//!
//! Every failure a run can hit maps to exactly one variant, and each variant
//! carries a stable label that is surfaced to the operator. Nothing in this
//! crate retries on any of these; a failed run is re-triggered by a human.

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for release operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort a release run.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Undeclared environment, invalid trigger policy or malformed config file.
    #[error("Configuration error: {message}")]
    #[diagnostic(code(tagpub::release::configuration), help("{help}"))]
    Configuration {
        /// The error message
        message: String,
        /// Help text for the operator
        help: String,
        /// Config file involved, if any
        path: Option<PathBuf>,
    },

    /// Checkout or toolchain provisioning could not complete.
    #[error("Dependency unavailable ({dependency}): {message}")]
    #[diagnostic(
        code(tagpub::release::dependency_unavailable),
        help("The run can be re-triggered manually once the dependency is reachable")
    )]
    DependencyUnavailable {
        /// Which collaborator failed (e.g. "checkout", "toolchain")
        dependency: String,
        /// The error message
        message: String,
    },

    /// The builder reported a failure or produced no artifacts.
    #[error("Build failed: {message}")]
    #[diagnostic(
        code(tagpub::release::build_failure),
        help("Fix the build and push a new tag; no credential was requested")
    )]
    BuildFailure {
        /// The error message
        message: String,
    },

    /// The tag version does not match the version declared in the source tree.
    #[error("Version mismatch: tag declares {tag_version}, {file} declares {declared}")]
    #[diagnostic(
        code(tagpub::release::version_mismatch),
        help("Bump the version in the package metadata or re-tag the release")
    )]
    VersionMismatch {
        /// Version derived from the tag
        tag_version: String,
        /// Version found in the metadata file
        declared: String,
        /// Metadata file that was checked
        file: PathBuf,
    },

    /// The federation endpoint rejected the run's identity claims.
    #[error("Trust exchange failed: {reason}")]
    #[diagnostic(
        code(tagpub::release::trust_exchange_failure),
        help(
            "Check the registry's trusted publisher configuration for this repository, \
             workflow and environment. This is never retried automatically."
        )
    )]
    TrustExchangeFailure {
        /// Rejection reason reported by the registry
        reason: String,
        /// Machine-readable reason code, if the registry supplied one
        code: Option<String>,
    },

    /// The registry refused the upload (duplicate version, checksum mismatch, ...).
    #[error("Publish rejected: {reason}")]
    #[diagnostic(
        code(tagpub::release::publish_rejected),
        help("A new version tag is required to publish again")
    )]
    PublishRejected {
        /// Rejection reason reported by the registry
        reason: String,
        /// Artifact that was being uploaded
        artifact: Option<String>,
    },

    /// Transient registry or network fault during upload.
    #[error("Publish unavailable: {message}")]
    #[diagnostic(
        code(tagpub::release::publish_unavailable),
        help("The operator may re-trigger the run once the registry is reachable")
    )]
    PublishUnavailable {
        /// The error message
        message: String,
    },

    /// The run was cancelled from outside.
    #[error("Release run cancelled during {step}")]
    #[diagnostic(code(tagpub::release::cancelled))]
    Cancelled {
        /// Step that was active when cancellation was observed
        step: String,
    },

    /// The identity broker was driven out of order.
    #[error("Identity broker misuse: {message}")]
    #[diagnostic(code(tagpub::release::invalid_state))]
    InvalidState {
        /// The error message
        message: String,
    },
}

impl Error {
    /// Create a new configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            help: help.into(),
            path: None,
        }
    }

    /// Create a new configuration error tied to a config file.
    #[must_use]
    pub fn configuration_at(
        message: impl Into<String>,
        help: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self::Configuration {
            message: message.into(),
            help: help.into(),
            path: Some(path.into()),
        }
    }

    /// Create a new dependency-unavailable error.
    #[must_use]
    pub fn dependency_unavailable(
        dependency: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::DependencyUnavailable {
            dependency: dependency.into(),
            message: message.into(),
        }
    }

    /// Create a new build failure.
    #[must_use]
    pub fn build_failure(message: impl Into<String>) -> Self {
        Self::BuildFailure {
            message: message.into(),
        }
    }

    /// Create a new trust exchange failure.
    #[must_use]
    pub fn trust_exchange(reason: impl Into<String>, code: Option<String>) -> Self {
        Self::TrustExchangeFailure {
            reason: reason.into(),
            code,
        }
    }

    /// Create a new publish rejection.
    #[must_use]
    pub fn publish_rejected(reason: impl Into<String>, artifact: Option<String>) -> Self {
        Self::PublishRejected {
            reason: reason.into(),
            artifact,
        }
    }

    /// Create a new publish-unavailable error.
    #[must_use]
    pub fn publish_unavailable(message: impl Into<String>) -> Self {
        Self::PublishUnavailable {
            message: message.into(),
        }
    }

    /// Create a new cancellation error.
    #[must_use]
    pub fn cancelled(step: impl Into<String>) -> Self {
        Self::Cancelled { step: step.into() }
    }

    /// Create a new invalid-state error.
    #[must_use]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Taxonomy label surfaced to the operator.
    ///
    /// Collaborators map their own I/O and parse failures to the label of
    /// their step; there is no blanket conversion.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "ConfigurationError",
            Self::DependencyUnavailable { .. } => "DependencyUnavailable",
            Self::BuildFailure { .. } => "BuildFailure",
            Self::VersionMismatch { .. } => "VersionMismatch",
            Self::TrustExchangeFailure { .. } => "TrustExchangeFailure",
            Self::PublishRejected { .. } => "PublishRejected",
            Self::PublishUnavailable { .. } => "PublishUnavailable",
            Self::Cancelled { .. } => "Cancelled",
            Self::InvalidState { .. } => "InvalidState",
        }
    }

    /// Whether this failure should page an operator rather than just fail the run.
    ///
    /// A rejected trust exchange can mean policy drift or an attempted
    /// impersonation.
    #[must_use]
    pub const fn requires_operator_alert(&self) -> bool {
        matches!(self, Self::TrustExchangeFailure { .. })
    }
}
