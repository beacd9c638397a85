//! Read-only commands that explain what a run would do.
//!
//! - `tagpub check-trigger --ref <ref>` reports whether a ref starts a release
//! - `tagpub scope [environment]` prints the resolved permission scope

use super::parse_ref;
use crate::errors::Result;
use serde::Serialize;
use std::path::Path;
use tagpub_release::{ReleaseConfig, trigger};

#[derive(Debug, Serialize)]
struct TriggerDecision<'a> {
    reference: String,
    pattern: &'a str,
    triggered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
}

/// Execute the `check-trigger` command.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded or the ref is not
/// fully qualified.
pub fn execute_check_trigger(config_path: &Path, reference: &str, json: bool) -> Result<String> {
    let config = ReleaseConfig::load(config_path)?;
    let policy = config.trigger_policy()?;
    let event = parse_ref(reference)?;

    let admitted = trigger::admit(&event, &policy);
    let decision = TriggerDecision {
        reference: event.full_ref(),
        pattern: policy.as_str(),
        triggered: admitted.is_some(),
        version: admitted.map(|r| r.version().to_string()),
    };

    tracing::debug!(
        reference = %decision.reference,
        triggered = decision.triggered,
        "Evaluated trigger policy"
    );

    if json {
        return Ok(serde_json::to_string_pretty(&decision)?);
    }

    Ok(match decision.version {
        Some(version) => format!(
            "{} triggers a release of version {version} (pattern {})",
            decision.reference, decision.pattern
        ),
        None => format!(
            "{} does not trigger a release (pattern {})",
            decision.reference, decision.pattern
        ),
    })
}

/// Execute the `scope` command.
///
/// Prints the scope as JSON; defaults to the configured environment.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded or the environment
/// is not declared.
pub fn execute_scope(config_path: &Path, environment: Option<&str>) -> Result<String> {
    let config = ReleaseConfig::load(config_path)?;
    let name = environment.unwrap_or(&config.environment);
    let scope = config.environment_gate()?.resolve(name)?;
    Ok(serde_json::to_string_pretty(&scope)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CONFIG: &str = r#"
environment = "pypi"

[trigger]
pattern = "v*"

[[environments]]
name = "pypi"
permissions = ["read_contents", "mint_identity_token"]

[[environments]]
name = "docs"
permissions = ["read_contents"]

[registry]
name = "pypi"
audience = "pypi"
federation_url = "https://pypi.org/_/oidc/mint-token"
upload_url = "https://upload.pypi.org/legacy/"
project_url = "https://pypi.org/project"
namespace = "my-package"

[source]
repository = "https://github.com/org/repo.git"

[toolchain]
tool = "python3"
version = "3.12"

[build]
command = ["python3", "-m", "build"]
"#;

    fn write_config() -> (TempDir, std::path::PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tagpub.toml");
        std::fs::write(&path, CONFIG).unwrap();
        (dir, path)
    }

    #[test]
    fn test_check_trigger_tag() {
        let (_dir, path) = write_config();
        let out = execute_check_trigger(&path, "refs/tags/v1.2.3", false).unwrap();
        assert!(out.contains("triggers a release of version 1.2.3"));
    }

    #[test]
    fn test_check_trigger_branch_named_like_tag() {
        let (_dir, path) = write_config();
        let out = execute_check_trigger(&path, "refs/heads/v1.2.3", true).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["triggered"], false);
        assert!(value.get("version").is_none());
    }

    #[test]
    fn test_scope_defaults_to_configured_environment() {
        let (_dir, path) = write_config();
        let out = execute_scope(&path, None).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["name"], "pypi");
        assert_eq!(
            value["granted_permissions"],
            serde_json::json!(["read_contents", "mint_identity_token"])
        );
    }

    #[test]
    fn test_scope_unknown_environment() {
        let (_dir, path) = write_config();
        let err = execute_scope(&path, Some("prod")).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
