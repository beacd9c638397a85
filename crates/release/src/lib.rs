//! Tag-triggered release publication with trusted publishing.
//!
//! This crate turns a pushed version tag into a published package release
//! without any long-lived registry secret. The run authenticates to the
//! registry by exchanging its ambient identity token for a short-lived,
//! namespace-scoped publish credential.
//!
//! # Architecture
//!
//! - [`trigger`] - decides whether an event is a release trigger
//! - [`scope`] - resolves the environment and its permission grants
//! - [`source`], [`toolchain`], [`builder`] - checkout, pinning and build contracts
//! - [`process`] - process-backed implementations of those contracts
//! - [`broker`] - the identity exchange state machine
//! - [`publisher`] - registry upload contract
//! - [`orchestrator`] - runs the steps in order with cancellation
//!
//! Ordering is enforced by types: only [`trigger::admit`] creates a
//! [`TriggeredRelease`], only a scope plus a `TriggeredRelease` creates a
//! [`MintCapability`], and only a `MintCapability` creates an
//! [`IdentityBroker`].
//!
//! # Example
//!
//! ```rust,ignore
//! use tagpub_release::{ReleaseConfig, ReleaseEvent, ReleaseOrchestrator, OrchestratorConfig};
//!
//! let config = ReleaseConfig::load(Path::new("tagpub.toml"))?;
//! let orchestrator = ReleaseOrchestrator::new(
//!     &config,
//!     OrchestratorConfig::new("org/repo"),
//!     collaborators,
//! );
//! let report = orchestrator
//!     .run(ReleaseEvent::tag("v1.2.3"), CancellationToken::new())
//!     .await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod artifact;
pub mod broker;
pub mod builder;
pub mod config;
pub mod consistency;
pub mod credential;
pub mod error;
pub mod event;
pub mod orchestrator;
pub mod process;
pub mod publisher;
pub mod scope;
pub mod source;
pub mod toolchain;
pub mod trigger;

// Re-export main types
pub use artifact::{Artifact, ArtifactSet, ChecksumsManifest};
pub use broker::{
    BrokerState, ExchangeOutcome, IdentityBroker, IdentityClaims, IdentityTokenSource,
    TokenExchange,
};
pub use builder::Builder;
pub use config::{BuildConfig, RegistryConfig, ReleaseConfig, SourceConfig};
pub use consistency::ConsistencyConfig;
pub use credential::{IdentityToken, PublishCredential};
pub use error::{Error, Result};
pub use event::{RefKind, ReleaseEvent};
pub use orchestrator::{
    Collaborators, OrchestratorConfig, ReleaseOrchestrator, ReleaseReport, RunOutcome, Step,
    StepTiming,
};
pub use process::{CommandBuilder, CommandProvisioner, GitCheckout};
pub use publisher::{PublishContext, PublishReceipt, Publisher};
pub use scope::{EnvironmentConfig, EnvironmentGate, EnvironmentScope, MintCapability, Permission};
pub use source::{CheckoutProvider, SourceTree};
pub use toolchain::{ToolchainHandle, ToolchainProvisioner, ToolchainSpec};
pub use trigger::{TriggerConfig, TriggerPolicy, TriggeredRelease};
