//! Environment gate.
//!
//! Resolves the named deployment environment to the permission scope a run is
//! granted. Scopes only ever carry two capabilities: reading the source and
//! asking the platform for an identity token. Registry credentials are not a
//! capability an environment can declare; they are only obtainable through
//! the identity broker.

use crate::error::{Error, Result};
use crate::trigger::TriggeredRelease;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;

/// A capability an environment can grant to a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Read the repository contents.
    ReadContents,
    /// Request an identity token from the platform.
    MintIdentityToken,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadContents => write!(f, "read_contents"),
            Self::MintIdentityToken => write!(f, "mint_identity_token"),
        }
    }
}

/// Operator-declared environment binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentConfig {
    /// Environment name (e.g. "pypi").
    pub name: String,
    /// Capabilities granted to runs bound to this environment.
    #[serde(default)]
    pub permissions: BTreeSet<Permission>,
}

impl EnvironmentConfig {
    /// Creates an environment binding.
    #[must_use]
    pub fn new(name: impl Into<String>, permissions: impl IntoIterator<Item = Permission>) -> Self {
        Self {
            name: name.into(),
            permissions: permissions.into_iter().collect(),
        }
    }
}

/// Permission scope resolved for one run. Immutable once resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentScope {
    name: String,
    granted_permissions: BTreeSet<Permission>,
}

impl EnvironmentScope {
    /// Environment name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Granted capabilities.
    #[must_use]
    pub const fn granted_permissions(&self) -> &BTreeSet<Permission> {
        &self.granted_permissions
    }

    /// Returns true if the scope grants the given capability.
    #[must_use]
    pub fn grants(&self, permission: Permission) -> bool {
        self.granted_permissions.contains(&permission)
    }

    /// Derives the capability to mint an identity token for this run.
    ///
    /// Requires both the scope grant and proof that a tag trigger admitted the
    /// run, so a branch-triggered run can never hold a [`MintCapability`].
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the scope does not grant
    /// `mint_identity_token`.
    pub fn mint_capability(&self, release: &TriggeredRelease) -> Result<MintCapability> {
        if !self.grants(Permission::MintIdentityToken) {
            return Err(Error::configuration(
                format!(
                    "environment '{}' does not grant mint_identity_token",
                    self.name
                ),
                "Add \"mint_identity_token\" to the environment's permissions",
            ));
        }

        Ok(MintCapability {
            environment: self.name.clone(),
            tag: release.tag().to_string(),
        })
    }
}

/// Authorization to request exactly one identity token for one run.
///
/// Not `Clone`: the broker consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct MintCapability {
    environment: String,
    tag: String,
}

impl MintCapability {
    /// Environment the capability was derived from.
    #[must_use]
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Tag the run was triggered by.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }
}

/// Resolves environment names against static bindings.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentGate {
    bindings: Vec<EnvironmentConfig>,
}

impl EnvironmentGate {
    /// Creates a gate over the given bindings.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if two bindings share a name.
    pub fn new(bindings: Vec<EnvironmentConfig>) -> Result<Self> {
        let mut seen = HashSet::new();
        for binding in &bindings {
            if !seen.insert(binding.name.as_str()) {
                return Err(Error::configuration(
                    format!("environment '{}' is declared more than once", binding.name),
                    "Environment names must be unique",
                ));
            }
        }
        Ok(Self { bindings })
    }

    /// Resolves the named environment.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the environment is not declared.
    pub fn resolve(&self, environment_name: &str) -> Result<EnvironmentScope> {
        let binding = self
            .bindings
            .iter()
            .find(|b| b.name == environment_name)
            .ok_or_else(|| {
                Error::configuration(
                    format!("environment '{environment_name}' is not declared"),
                    format!("Declared environments: {}", self.declared_names().join(", ")),
                )
            })?;

        Ok(EnvironmentScope {
            name: binding.name.clone(),
            granted_permissions: binding.permissions.clone(),
        })
    }

    /// Names of all declared environments.
    #[must_use]
    pub fn declared_names(&self) -> Vec<&str> {
        self.bindings.iter().map(|b| b.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ReleaseEvent;
    use crate::trigger::{TriggerPolicy, admit};

    fn pypi_gate() -> EnvironmentGate {
        EnvironmentGate::new(vec![
            EnvironmentConfig::new(
                "pypi",
                [Permission::ReadContents, Permission::MintIdentityToken],
            ),
            EnvironmentConfig::new("docs", [Permission::ReadContents]),
        ])
        .unwrap()
    }

    fn triggered() -> TriggeredRelease {
        let policy = TriggerPolicy::new("v*").unwrap();
        admit(&ReleaseEvent::tag("v1.2.3"), &policy).unwrap()
    }

    #[test]
    fn test_resolves_exactly_declared_permissions() {
        let scope = pypi_gate().resolve("pypi").unwrap();
        let expected: BTreeSet<_> = [Permission::ReadContents, Permission::MintIdentityToken]
            .into_iter()
            .collect();
        assert_eq!(scope.name(), "pypi");
        assert_eq!(scope.granted_permissions(), &expected);
    }

    #[test]
    fn test_undeclared_environment_is_configuration_error() {
        let err = pypi_gate().resolve("prod").unwrap_err();
        assert_eq!(err.label(), "ConfigurationError");
        assert!(err.to_string().contains("prod"));
    }

    #[test]
    fn test_duplicate_environment_rejected() {
        let result = EnvironmentGate::new(vec![
            EnvironmentConfig::new("pypi", [Permission::ReadContents]),
            EnvironmentConfig::new("pypi", [Permission::MintIdentityToken]),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_mint_capability_requires_grant() {
        let scope = pypi_gate().resolve("docs").unwrap();
        assert!(scope.mint_capability(&triggered()).is_err());
    }

    #[test]
    fn test_mint_capability_carries_run_identity() {
        let scope = pypi_gate().resolve("pypi").unwrap();
        let cap = scope.mint_capability(&triggered()).unwrap();
        assert_eq!(cap.environment(), "pypi");
        assert_eq!(cap.tag(), "v1.2.3");
    }

    #[test]
    fn test_unknown_capability_tag_fails_to_parse() {
        let result: std::result::Result<EnvironmentConfig, _> =
            toml::from_str("name = \"pypi\"\npermissions = [\"registry_token\"]\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_permission_tags_parse() {
        let config: EnvironmentConfig = toml::from_str(
            "name = \"pypi\"\npermissions = [\"read_contents\", \"mint_identity_token\"]\n",
        )
        .unwrap();
        assert_eq!(config.permissions.len(), 2);
    }
}
