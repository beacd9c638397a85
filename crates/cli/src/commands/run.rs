//! The `tagpub run` command.
//!
//! Wires the process-backed checkout, toolchain and build steps together
//! with the GitHub Actions identity source and the registry's HTTP
//! endpoints, then hands the event to the orchestrator.

use super::parse_ref;
use crate::errors::{CliError, Result};
use async_trait::async_trait;
use std::fmt::Write;
use std::path::PathBuf;
use tagpub_github::{ActionsIdentityTokenSource, HttpPublisher, HttpTokenExchange, RunContext};
use tagpub_release::{
    Collaborators, CommandBuilder, CommandProvisioner, Error, GitCheckout, IdentityToken,
    IdentityTokenSource, OrchestratorConfig, ReleaseConfig, ReleaseOrchestrator, ReleaseReport,
    RunOutcome, trigger,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Arguments of one `run` invocation.
#[derive(Debug, Clone)]
pub struct RunArgs {
    pub config: PathBuf,
    pub reference: Option<String>,
    pub repository: Option<String>,
    pub environment: Option<String>,
    pub dry_run: bool,
    pub json: bool,
}

/// Token source for runs that must never reach the identity provider.
///
/// Used for dry runs and for events the trigger policy does not admit, so
/// those runs need no OIDC variables at all.
#[derive(Debug, Clone, Copy, Default)]
struct DisabledTokenSource;

#[async_trait]
impl IdentityTokenSource for DisabledTokenSource {
    async fn fetch(&self, audience: &str) -> tagpub_release::Result<IdentityToken> {
        Err(Error::invalid_state(format!(
            "identity token for '{audience}' requested by a run that cannot publish"
        )))
    }
}

/// Execute the `run` command.
///
/// # Errors
///
/// Returns the run's failure, or a usage error if no event can be
/// determined.
pub async fn execute_run(args: RunArgs, cancel: CancellationToken) -> Result<String> {
    let mut config = ReleaseConfig::load(&args.config)?;
    if let Some(environment) = args.environment {
        debug!(environment = %environment, "Overriding configured environment");
        config.environment = environment;
        config.validate()?;
    }

    let detected = RunContext::detect();
    let event = match (&args.reference, &detected) {
        (Some(reference), _) => parse_ref(reference)?,
        (None, Some(context)) => context.event.clone(),
        (None, None) => return Err(CliError::NoEvent),
    };

    let will_publish = !args.dry_run && trigger::matches(&event, &config.trigger_policy()?);

    let repository = match args
        .repository
        .or_else(|| detected.map(|context| context.repository))
    {
        Some(repository) => repository,
        None if will_publish => {
            return Err(CliError::invalid_argument(
                "--repository",
                "Pass --repository owner/name or set GITHUB_REPOSITORY",
            ));
        }
        None => String::new(),
    };

    let tokens: Box<dyn IdentityTokenSource> = if will_publish {
        Box::new(ActionsIdentityTokenSource::from_env()?)
    } else {
        Box::new(DisabledTokenSource)
    };

    let collaborators = Collaborators {
        checkout: Box::new(GitCheckout::new(&config.source.repository)),
        provisioner: Box::new(CommandProvisioner::new()),
        builder: Box::new(CommandBuilder::new(config.build.clone())),
        tokens,
        federation: Box::new(HttpTokenExchange::new(&config.registry.federation_url)?),
        publisher: Box::new(HttpPublisher::from_config(&config.registry)?),
    };

    let options = OrchestratorConfig::new(repository).with_dry_run(args.dry_run);
    let orchestrator = ReleaseOrchestrator::new(&config, options, collaborators);
    let report = orchestrator.run(event, cancel).await?;

    info!(
        run_id = %report.run_id,
        outcome = ?report.outcome,
        "Release run finished"
    );

    if args.json {
        return Ok(serde_json::to_string_pretty(&report)?);
    }
    Ok(render_summary(&report))
}

/// Human-readable summary of a finished run.
fn render_summary(report: &ReleaseReport) -> String {
    let mut out = String::new();
    match report.outcome {
        RunOutcome::Skipped => {
            let _ = write!(
                out,
                "Skipped: {} is not a release trigger",
                report.event.full_ref()
            );
            return out;
        }
        RunOutcome::Built => {
            let _ = writeln!(
                out,
                "Dry run: built {} {} without publishing",
                report.tag.as_deref().unwrap_or_default(),
                report.version.as_deref().unwrap_or_default()
            );
        }
        RunOutcome::Published => {
            let location = report
                .receipt
                .as_ref()
                .map_or("", |receipt| receipt.location.as_str());
            let _ = writeln!(
                out,
                "Published {} to {location}",
                report.version.as_deref().unwrap_or_default()
            );
        }
    }

    for artifact in &report.artifacts {
        let _ = writeln!(out, "  {}  {}", artifact.sha256, artifact.file_name);
    }
    let _ = write!(out, "Run ID: {}", report.run_id);
    out
}
