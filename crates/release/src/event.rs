//! Repository events that may start a release run.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of reference a push event points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefKind {
    /// A mutable branch head.
    Branch,
    /// An immutable tag.
    Tag,
}

impl fmt::Display for RefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Branch => write!(f, "branch"),
            Self::Tag => write!(f, "tag"),
        }
    }
}

/// A pushed reference as reported by the event source.
///
/// `reference` is the short name (`v1.2.3`, `main`), never the
/// fully-qualified `refs/...` form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseEvent {
    /// Short reference name.
    pub reference: String,
    /// Whether the reference is a tag or a branch.
    pub kind: RefKind,
    /// Commit the reference pointed at, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
}

impl ReleaseEvent {
    /// Creates a tag event.
    #[must_use]
    pub fn tag(name: impl Into<String>) -> Self {
        Self {
            reference: name.into(),
            kind: RefKind::Tag,
            sha: None,
        }
    }

    /// Creates a branch event.
    #[must_use]
    pub fn branch(name: impl Into<String>) -> Self {
        Self {
            reference: name.into(),
            kind: RefKind::Branch,
            sha: None,
        }
    }

    /// Attaches the commit SHA.
    #[must_use]
    pub fn with_sha(mut self, sha: impl Into<String>) -> Self {
        self.sha = Some(sha.into());
        self
    }

    /// Builds an event from a fully-qualified ref.
    ///
    /// `refs/tags/*` becomes a tag event and `refs/heads/*` a branch event.
    /// Anything else (pull request merge refs, notes, bare names) is treated
    /// as a branch so it can never satisfy a release trigger.
    #[must_use]
    pub fn from_full_ref(full_ref: &str) -> Self {
        if let Some(tag) = full_ref.strip_prefix("refs/tags/") {
            Self::tag(tag)
        } else if let Some(branch) = full_ref.strip_prefix("refs/heads/") {
            Self::branch(branch)
        } else {
            Self::branch(full_ref)
        }
    }

    /// Returns true if the event points at a tag.
    #[must_use]
    pub fn is_tag(&self) -> bool {
        self.kind == RefKind::Tag
    }

    /// Fully-qualified form of the reference.
    #[must_use]
    pub fn full_ref(&self) -> String {
        match self.kind {
            RefKind::Tag => format!("refs/tags/{}", self.reference),
            RefKind::Branch => format!("refs/heads/{}", self.reference),
        }
    }
}

impl fmt::Display for ReleaseEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sha {
            Some(sha) => write!(
                f,
                "{} {} ({})",
                self.kind,
                self.reference,
                sha.get(..7).unwrap_or(sha)
            ),
            None => write!(f, "{} {}", self.kind, self.reference),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_full_ref_tag() {
        let event = ReleaseEvent::from_full_ref("refs/tags/v1.2.3");
        assert_eq!(event.reference, "v1.2.3");
        assert!(event.is_tag());
    }

    #[test]
    fn test_from_full_ref_branch() {
        let event = ReleaseEvent::from_full_ref("refs/heads/main");
        assert_eq!(event.reference, "main");
        assert_eq!(event.kind, RefKind::Branch);
    }

    #[test]
    fn test_pull_request_ref_is_not_a_tag() {
        let event = ReleaseEvent::from_full_ref("refs/pull/12/merge");
        assert!(!event.is_tag());
        assert_eq!(event.reference, "refs/pull/12/merge");
    }

    #[test]
    fn test_full_ref_round_trip() {
        assert_eq!(ReleaseEvent::tag("v2.0.0").full_ref(), "refs/tags/v2.0.0");
        assert_eq!(ReleaseEvent::branch("dev").full_ref(), "refs/heads/dev");
    }

    #[test]
    fn test_display_truncates_sha() {
        let event = ReleaseEvent::tag("v1.0.0").with_sha("abcdef1234567890");
        assert_eq!(event.to_string(), "tag v1.0.0 (abcdef1)");
    }

    #[test]
    fn test_ref_kind_serde() {
        let json = serde_json::to_string(&RefKind::Tag).unwrap();
        assert_eq!(json, "\"tag\"");
    }
}
