//! Release orchestrator.
//!
//! Coordinates one release run in dependency order:
//!
//! ```text
//! trigger -> gate -> checkout -> provision -> [consistency] -> build
//!         -> exchange -> publish
//! ```
//!
//! Every step can abort the run; nothing is retried. The identity exchange
//! only starts once the build has produced artifacts, so any earlier failure
//! leaves the identity provider untouched.

use crate::artifact::Artifact;
use crate::broker::{IdentityBroker, IdentityClaims, IdentityTokenSource, TokenExchange};
use crate::builder::Builder;
use crate::config::ReleaseConfig;
use crate::consistency;
use crate::error::{Error, Result};
use crate::event::ReleaseEvent;
use crate::publisher::{PublishContext, PublishReceipt, Publisher};
use crate::source::CheckoutProvider;
use crate::toolchain::ToolchainProvisioner;
use crate::trigger::admit;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

/// Pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Matching the event against the trigger policy.
    Trigger,
    /// Resolving the environment scope.
    Gate,
    /// Materializing the tagged source tree.
    Checkout,
    /// Pinning the toolchain.
    Provision,
    /// Comparing tag and declared versions.
    Consistency,
    /// Producing artifacts.
    Build,
    /// Trading the identity token for a publish credential.
    Exchange,
    /// Uploading artifacts.
    Publish,
}

impl Step {
    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trigger => "trigger",
            Self::Gate => "gate",
            Self::Checkout => "checkout",
            Self::Provision => "provision",
            Self::Consistency => "consistency",
            Self::Build => "build",
            Self::Exchange => "exchange",
            Self::Publish => "publish",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run-level options.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Repository the run asserts in its identity claims (e.g. "org/repo").
    pub repository: String,
    /// Stop after the build; never contact the identity provider.
    pub dry_run: bool,
}

impl OrchestratorConfig {
    /// Creates run options for `repository`.
    #[must_use]
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            dry_run: false,
        }
    }

    /// Sets dry-run mode.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// External collaborators of a run.
pub struct Collaborators {
    /// Source checkout.
    pub checkout: Box<dyn CheckoutProvider>,
    /// Toolchain pinning.
    pub provisioner: Box<dyn ToolchainProvisioner>,
    /// Artifact builder.
    pub builder: Box<dyn Builder>,
    /// Ambient identity token source.
    pub tokens: Box<dyn IdentityTokenSource>,
    /// Federation endpoint client.
    pub federation: Box<dyn TokenExchange>,
    /// Registry uploader.
    pub publisher: Box<dyn Publisher>,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// The event was not a release trigger; nothing ran.
    Skipped,
    /// Dry run: artifacts were built but not published.
    Built,
    /// The registry accepted the release.
    Published,
}

/// Timing of one completed or failed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepTiming {
    /// Step that ran.
    pub step: Step,
    /// When the step started.
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: i64,
}

/// Report from a release run.
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseReport {
    /// Unique id of the run.
    pub run_id: Uuid,
    /// How the run ended.
    pub outcome: RunOutcome,
    /// Event that started the run.
    pub event: ReleaseEvent,
    /// Tag, when the event was admitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Version derived from the tag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Environment the run was scoped to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    /// Per-step timings in execution order.
    pub steps: Vec<StepTiming>,
    /// Built artifacts.
    pub artifacts: Vec<Artifact>,
    /// The registry's acceptance, for published runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<PublishReceipt>,
}

impl ReleaseReport {
    fn new(event: ReleaseEvent) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            outcome: RunOutcome::Skipped,
            event,
            tag: None,
            version: None,
            environment: None,
            steps: Vec::new(),
            artifacts: Vec::new(),
            receipt: None,
        }
    }

    fn record(&mut self, step: Step, started_at: DateTime<Utc>) {
        self.steps.push(StepTiming {
            step,
            started_at,
            duration_ms: (Utc::now() - started_at).num_milliseconds(),
        });
    }

    /// Steps that ran, in order.
    #[must_use]
    pub fn executed_steps(&self) -> Vec<Step> {
        self.steps.iter().map(|s| s.step).collect()
    }
}

/// Release orchestrator.
///
/// Holds the immutable configuration and the collaborators; `run` takes
/// `&self`, so independent runs may proceed concurrently.
pub struct ReleaseOrchestrator<'a> {
    config: &'a ReleaseConfig,
    options: OrchestratorConfig,
    collaborators: Collaborators,
}

impl<'a> ReleaseOrchestrator<'a> {
    /// Creates an orchestrator.
    #[must_use]
    pub const fn new(
        config: &'a ReleaseConfig,
        options: OrchestratorConfig,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            config,
            options,
            collaborators,
        }
    }

    /// Run options.
    #[must_use]
    pub const fn options(&self) -> &OrchestratorConfig {
        &self.options
    }

    /// Executes one run for `event`.
    ///
    /// Returns a `Skipped` report when the event is not a release trigger.
    ///
    /// # Errors
    ///
    /// Returns the first step failure, labelled with its taxonomy kind, or
    /// `Cancelled` if `cancel` fires before the run completes.
    pub async fn run(&self, event: ReleaseEvent, cancel: CancellationToken) -> Result<ReleaseReport> {
        let mut report = ReleaseReport::new(event);
        let span = info_span!("release", run_id = %report.run_id, event = %report.event);

        let result = self.execute(&mut report, &cancel).instrument(span).await;
        match result {
            Ok(()) => Ok(report),
            Err(e) => {
                warn!(
                    run_id = %report.run_id,
                    label = e.label(),
                    error = %e,
                    "Release run aborted"
                );
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_lines)]
    async fn execute(&self, report: &mut ReleaseReport, cancel: &CancellationToken) -> Result<()> {
        let config = self.config;
        let c = &self.collaborators;

        let policy = config.trigger_policy()?;
        let event = report.event.clone();
        let admitted = step(report, cancel, Step::Trigger, async {
            Ok(admit(&event, &policy))
        })
        .await?;
        let Some(release) = admitted else {
            info!(
                reference = %event,
                pattern = policy.as_str(),
                "Not a release trigger; nothing to do"
            );
            return Ok(());
        };
        report.tag = Some(release.tag().to_string());
        report.version = Some(release.version().to_string());

        let gate = config.environment_gate()?;
        let scope = step(report, cancel, Step::Gate, async {
            gate.resolve(&config.environment)
        })
        .await?;
        report.environment = Some(scope.name().to_string());
        info!(
            environment = scope.name(),
            permissions = ?scope.granted_permissions(),
            "Environment resolved"
        );

        // Fail on a missing grant before any work is done.
        let capability = if self.options.dry_run {
            None
        } else {
            Some(scope.mint_capability(&release)?)
        };

        let tree = step(report, cancel, Step::Checkout, c.checkout.checkout(&release)).await?;
        let toolchain = step(
            report,
            cancel,
            Step::Provision,
            c.provisioner.provision(&config.toolchain),
        )
        .await?;

        if let Some(check) = &config.consistency {
            step(report, cancel, Step::Consistency, async {
                consistency::verify(&release, &tree, check)
            })
            .await?;
        }

        let artifacts = step(report, cancel, Step::Build, c.builder.build(&tree, &toolchain)).await?;
        report.artifacts = artifacts.as_slice().to_vec();

        let Some(capability) = capability else {
            info!(
                artifact_count = artifacts.len(),
                "[dry-run] Would publish artifacts"
            );
            report.outcome = RunOutcome::Built;
            return Ok(());
        };

        let claims = IdentityClaims {
            audience: config.registry.audience.clone(),
            repository: self.options.repository.clone(),
            environment: scope.name().to_string(),
            reference: release.full_ref(),
        };
        let mut broker = IdentityBroker::new(
            capability,
            c.tokens.as_ref(),
            c.federation.as_ref(),
            claims,
            &config.registry.namespace,
        );
        step(report, cancel, Step::Exchange, broker.request_credential()).await?;
        let credential = broker.hand_off()?;

        let ctx = PublishContext::new(
            &config.registry.namespace,
            release.version(),
            release.tag(),
        );
        info!(
            publisher = c.publisher.name(),
            namespace = %ctx.namespace,
            version = %ctx.version,
            "Publishing release"
        );
        let receipt = step(
            report,
            cancel,
            Step::Publish,
            c.publisher.publish(&ctx, &artifacts, credential),
        )
        .await?;

        info!(location = %receipt.location, "Release published");
        report.receipt = Some(receipt);
        report.outcome = RunOutcome::Published;
        Ok(())
    }
}

/// Runs one step inside its span, racing it against cancellation.
///
/// A step that was never started because the run is already cancelled is not
/// recorded. A cancelled step drops its future, and with it anything the
/// future owns.
async fn step<T, F>(
    report: &mut ReleaseReport,
    cancel: &CancellationToken,
    name: Step,
    work: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if cancel.is_cancelled() {
        return Err(Error::cancelled(name.as_str()));
    }

    let started_at = Utc::now();
    let span = info_span!("step", name = name.as_str());
    let result = tokio::select! {
        biased;
        () = cancel.cancelled() => Err(Error::cancelled(name.as_str())),
        r = work.instrument(span) => r,
    };
    report.record(name, started_at);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_names() {
        assert_eq!(Step::Exchange.to_string(), "exchange");
        assert_eq!(
            serde_json::to_value(Step::Provision).unwrap(),
            serde_json::json!("provision")
        );
    }

    #[test]
    fn test_orchestrator_config_builder() {
        let options = OrchestratorConfig::new("org/repo").with_dry_run(true);
        assert_eq!(options.repository, "org/repo");
        assert!(options.dry_run);
    }

    #[test]
    fn test_report_starts_skipped() {
        let report = ReleaseReport::new(ReleaseEvent::branch("main"));
        assert_eq!(report.outcome, RunOutcome::Skipped);
        assert!(report.executed_steps().is_empty());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcome"], "skipped");
        assert!(json.get("receipt").is_none());
    }

    #[tokio::test]
    async fn test_cancelled_step_not_started() {
        let mut report = ReleaseReport::new(ReleaseEvent::tag("v1.0.0"));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = step(&mut report, &cancel, Step::Build, async { Ok(()) })
            .await
            .unwrap_err();
        assert_eq!(err.label(), "Cancelled");
        assert!(report.steps.is_empty());
    }

    #[tokio::test]
    async fn test_step_records_timing() {
        let mut report = ReleaseReport::new(ReleaseEvent::tag("v1.0.0"));
        let value = step(&mut report, &CancellationToken::new(), Step::Gate, async {
            Ok(7)
        })
        .await
        .unwrap();
        assert_eq!(value, 7);
        assert_eq!(report.executed_steps(), vec![Step::Gate]);
        assert!(report.steps[0].duration_ms >= 0);
    }
}
