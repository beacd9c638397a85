//! GitHub Actions and HTTP registry providers for tagpub.
//!
//! This crate provides concrete implementations of the collaborator traits
//! defined in `tagpub-release`:
//! - [`RunContext`] detects the triggering ref and repository from the
//!   Actions environment
//! - [`ActionsIdentityTokenSource`] requests OIDC tokens from the runner
//! - [`HttpTokenExchange`] trades them at a registry's federation endpoint
//! - [`HttpPublisher`] uploads artifacts with the minted credential

#![warn(missing_docs)]

pub mod actions;
pub mod federation;
pub mod http;
pub mod oidc;
pub mod upload;

// Re-exports for convenience
pub use actions::RunContext;
pub use federation::HttpTokenExchange;
pub use oidc::ActionsIdentityTokenSource;
pub use upload::HttpPublisher;
