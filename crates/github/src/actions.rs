//! GitHub Actions run context.
//!
//! Reads the workflow's `GITHUB_*` variables once, at startup, into a
//! [`RunContext`] carrying the triggering [`ReleaseEvent`] and the repository
//! the run asserts in its identity claims.

use tagpub_release::{RefKind, ReleaseEvent};
use tracing::debug;

/// Context of the current workflow run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    /// Repository in `owner/name` form.
    pub repository: String,
    /// Pushed reference that started the run.
    pub event: ReleaseEvent,
}

impl RunContext {
    /// Detects the run context from the process environment.
    ///
    /// Returns `None` outside GitHub Actions or when the run has no ref.
    #[must_use]
    pub fn detect() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Detects the run context through `lookup`.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        if lookup("GITHUB_ACTIONS").as_deref() != Some("true") {
            return None;
        }

        let repository = lookup("GITHUB_REPOSITORY").filter(|r| !r.is_empty())?;
        let full_ref = lookup("GITHUB_REF").filter(|r| !r.is_empty())?;

        let mut event = ReleaseEvent::from_full_ref(&full_ref);

        // GITHUB_REF_TYPE is authoritative when present.
        match lookup("GITHUB_REF_TYPE").as_deref() {
            Some("tag") if !event.is_tag() => event = ReleaseEvent::tag(short_name(&full_ref)),
            Some("branch") if event.is_tag() => {
                event = ReleaseEvent::branch(short_name(&full_ref));
            }
            _ => {}
        }

        if let Some(sha) = lookup("GITHUB_SHA").filter(|s| !s.is_empty()) {
            event = event.with_sha(sha);
        }

        debug!(
            repository = %repository,
            reference = %event.reference,
            kind = %event.kind,
            "Detected GitHub Actions run"
        );

        Some(Self { repository, event })
    }

    /// Returns true if the run was started by a tag push.
    #[must_use]
    pub fn is_tag_push(&self) -> bool {
        self.event.kind == RefKind::Tag
    }
}

fn short_name(full_ref: &str) -> &str {
    full_ref
        .strip_prefix("refs/tags/")
        .or_else(|| full_ref.strip_prefix("refs/heads/"))
        .unwrap_or(full_ref)
}
