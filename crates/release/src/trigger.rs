//! Release trigger matching.
//!
//! A trigger is a pure predicate over an immutable [`ReleaseEvent`] and a
//! static [`TriggerPolicy`]. Only tag events can ever match. A successful
//! match yields a [`TriggeredRelease`], which is the only way downstream
//! steps can prove the run was admitted.

use crate::error::{Error, Result};
use crate::event::ReleaseEvent;
use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};

const WILDCARDS: &[char] = &['*', '?', '['];

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Raw trigger configuration as it appears in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Glob matched against tag names (e.g. `v*`).
    pub pattern: String,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            pattern: "v*".to_string(),
        }
    }
}

/// Validated tag pattern.
#[derive(Debug, Clone)]
pub struct TriggerPolicy {
    raw: String,
    pattern: Pattern,
    prefix: String,
}

impl TriggerPolicy {
    /// Compiles and validates a tag pattern.
    ///
    /// The pattern must start with a literal character so it can only select
    /// tags carrying a version marker; `*` on its own would release any tag.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the pattern is empty, is not a valid
    /// glob, or starts with a wildcard.
    pub fn new(pattern: &str) -> Result<Self> {
        let trimmed = pattern.trim();
        if trimmed.is_empty() {
            return Err(Error::configuration(
                "trigger pattern is empty",
                "Set [trigger].pattern to a version tag glob such as \"v*\"",
            ));
        }

        let prefix: String = trimmed.chars().take_while(|c| !WILDCARDS.contains(c)).collect();
        if prefix.is_empty() {
            return Err(Error::configuration(
                format!("trigger pattern '{trimmed}' starts with a wildcard"),
                "Prefix the pattern with a literal version marker, e.g. \"v*\"",
            ));
        }

        let compiled = Pattern::new(trimmed).map_err(|e| {
            Error::configuration(
                format!("trigger pattern '{trimmed}' is not a valid glob: {e}"),
                "Use glob syntax: *, ? and [...] are supported",
            )
        })?;

        Ok(Self {
            raw: trimmed.to_string(),
            pattern: compiled,
            prefix,
        })
    }

    /// Returns the pattern as configured.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Literal prefix in front of the first wildcard.
    #[must_use]
    pub fn literal_prefix(&self) -> &str {
        &self.prefix
    }

    fn matches_tag(&self, tag: &str) -> bool {
        self.pattern.matches_with(tag, MATCH_OPTIONS)
    }
}

impl TryFrom<&TriggerConfig> for TriggerPolicy {
    type Error = Error;

    fn try_from(config: &TriggerConfig) -> Result<Self> {
        Self::new(&config.pattern)
    }
}

/// Returns true iff the event is a tag whose name satisfies the policy.
#[must_use]
pub fn matches(event: &ReleaseEvent, policy: &TriggerPolicy) -> bool {
    event.is_tag() && policy.matches_tag(&event.reference)
}

/// Admits an event into the pipeline.
///
/// Returns `None` for non-matching events; that is a normal outcome and the
/// run stops without touching any other component.
#[must_use]
pub fn admit(event: &ReleaseEvent, policy: &TriggerPolicy) -> Option<TriggeredRelease> {
    if !matches(event, policy) {
        return None;
    }

    let version = event
        .reference
        .strip_prefix(policy.literal_prefix())
        .filter(|v| !v.is_empty())
        .unwrap_or(&event.reference)
        .to_string();

    Some(TriggeredRelease {
        tag: event.reference.clone(),
        version,
        sha: event.sha.clone(),
    })
}

/// Proof that a tag event passed the trigger policy.
///
/// Only [`admit`] constructs this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggeredRelease {
    tag: String,
    version: String,
    sha: Option<String>,
}

impl TriggeredRelease {
    /// Tag name that triggered the run.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Version derived from the tag (the tag minus the pattern's literal prefix).
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Commit SHA of the tag, when the event source supplied one.
    #[must_use]
    pub fn sha(&self) -> Option<&str> {
        self.sha.as_deref()
    }

    /// Fully-qualified tag ref.
    #[must_use]
    pub fn full_ref(&self) -> String {
        format!("refs/tags/{}", self.tag)
    }
}
