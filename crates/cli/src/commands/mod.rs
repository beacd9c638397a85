pub mod inspect;
pub mod run;
pub mod version;

use crate::errors::Result;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Internal command, decoupled from clap's argument types.
#[derive(Debug, Clone)]
pub enum Command {
    Run {
        config: PathBuf,
        reference: Option<String>,
        repository: Option<String>,
        environment: Option<String>,
        dry_run: bool,
        json: bool,
    },
    CheckTrigger {
        config: PathBuf,
        reference: String,
        json: bool,
    },
    Scope {
        config: PathBuf,
        environment: Option<String>,
    },
    Version,
}

impl Command {
    /// Short command name for spans.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Run { .. } => "run",
            Self::CheckTrigger { .. } => "check-trigger",
            Self::Scope { .. } => "scope",
            Self::Version => "version",
        }
    }

    /// Executes the command and returns the text to print on stdout.
    pub async fn execute(self, cancel: CancellationToken) -> Result<String> {
        match self {
            Self::Run {
                config,
                reference,
                repository,
                environment,
                dry_run,
                json,
            } => {
                run::execute_run(
                    run::RunArgs {
                        config,
                        reference,
                        repository,
                        environment,
                        dry_run,
                        json,
                    },
                    cancel,
                )
                .await
            }
            Self::CheckTrigger {
                config,
                reference,
                json,
            } => inspect::execute_check_trigger(&config, &reference, json),
            Self::Scope {
                config,
                environment,
            } => inspect::execute_scope(&config, environment.as_deref()),
            Self::Version => Ok(version::get_version_info()),
        }
    }
}

/// Parses a fully-qualified ref passed on the command line.
pub(crate) fn parse_ref(reference: &str) -> Result<tagpub_release::ReleaseEvent> {
    if !reference.starts_with("refs/") {
        return Err(crate::errors::CliError::invalid_argument(
            format!("--ref {reference}"),
            format!(
                "Pass the fully-qualified ref, e.g. refs/tags/{reference} or refs/heads/{reference}"
            ),
        ));
    }
    Ok(tagpub_release::ReleaseEvent::from_full_ref(reference))
}
