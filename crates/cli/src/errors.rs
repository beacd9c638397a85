//! CLI error type and process exit codes
//!
//! Release failures keep their taxonomy label all the way to the process
//! exit status, so a workflow can tell a rejected publish from a flaky
//! registry without parsing logs.

use miette::Diagnostic;
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// A release step failed.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Release(#[from] tagpub_release::Error),

    #[error("Invalid command line argument: {argument}")]
    #[diagnostic(code(tagpub::cli::invalid_argument))]
    InvalidArgument {
        argument: String,
        #[help]
        suggestion: Option<String>,
    },

    #[error("Cannot determine the triggering ref")]
    #[diagnostic(
        code(tagpub::cli::no_event),
        help("Pass --ref refs/tags/<tag>, or run inside a GitHub Actions workflow")
    )]
    NoEvent,

    #[error("Failed to write output")]
    #[diagnostic(code(tagpub::cli::output))]
    Output {
        #[source]
        source: serde_json::Error,
    },

    #[error("Tracing initialization failed: {message}")]
    #[diagnostic(code(tagpub::cli::tracing_error))]
    Tracing { message: String },
}

impl CliError {
    pub fn invalid_argument(argument: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::InvalidArgument {
            argument: argument.into(),
            suggestion: Some(suggestion.into()),
        }
    }

    /// Process exit status for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Release(e) => match e.label() {
                "ConfigurationError" => 2,
                "DependencyUnavailable" => 3,
                "BuildFailure" => 4,
                "TrustExchangeFailure" => 5,
                "PublishRejected" => 6,
                "PublishUnavailable" => 7,
                "VersionMismatch" => 8,
                "Cancelled" => 130,
                _ => 1,
            },
            Self::InvalidArgument { .. } | Self::NoEvent => 2,
            Self::Output { .. } | Self::Tracing { .. } => 1,
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(source: serde_json::Error) -> Self {
        Self::Output { source }
    }
}

pub type Result<T> = std::result::Result<T, CliError>;
