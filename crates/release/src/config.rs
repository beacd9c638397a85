//! Release configuration types.
//!
//! The configuration is one TOML file loaded once at run start. The loaded
//! [`ReleaseConfig`] is immutable and passed by reference to every component
//! that needs it.

use crate::consistency::ConsistencyConfig;
use crate::error::{Error, Result};
use crate::scope::{EnvironmentConfig, EnvironmentGate};
use crate::toolchain::ToolchainSpec;
use crate::trigger::{TriggerConfig, TriggerPolicy};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "tagpub.toml";

/// Complete release configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReleaseConfig {
    /// Environment runs are bound to.
    pub environment: String,
    /// Tag trigger settings.
    #[serde(default)]
    pub trigger: TriggerConfig,
    /// Declared environments and their permission grants.
    #[serde(default)]
    pub environments: Vec<EnvironmentConfig>,
    /// Registry and federation endpoints.
    pub registry: RegistryConfig,
    /// Where the tagged source is checked out from.
    pub source: SourceConfig,
    /// Toolchain the build requires.
    pub toolchain: ToolchainSpec,
    /// Build command and outputs.
    pub build: BuildConfig,
    /// Optional tag/metadata version consistency check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consistency: Option<ConsistencyConfig>,
}

/// Registry-side settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryConfig {
    /// Short registry name used in logs (e.g. "pypi").
    pub name: String,
    /// Audience requested for the identity token.
    pub audience: String,
    /// Federation endpoint that mints publish credentials.
    pub federation_url: String,
    /// Upload endpoint.
    pub upload_url: String,
    /// Base URL of project pages, used to report the release location.
    pub project_url: String,
    /// Package namespace this configuration may publish.
    pub namespace: String,
}

/// Source checkout settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    /// Clone URL or local path of the repository.
    pub repository: String,
}

/// Build settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    /// Program and arguments, run from the root of the source tree.
    pub command: Vec<String>,
    /// Directory, relative to the tree root, holding the artifacts.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Whether to write a checksums manifest next to the artifacts.
    #[serde(default)]
    pub checksums: bool,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("dist")
}

impl ReleaseConfig {
    /// Parses and validates a configuration document.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the document is malformed or fails
    /// validation.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| {
            Error::configuration(
                format!("invalid configuration: {e}"),
                "See the configuration reference for the expected layout",
            )
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file cannot be read, parsed or
    /// validated.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration_at(
                format!("cannot read {}: {e}", path.display()),
                "Pass --config or create tagpub.toml in the working directory",
                path,
            )
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            Error::Configuration { message, help, .. } => Error::Configuration {
                message,
                help,
                path: Some(path.to_path_buf()),
            },
            other => other,
        })
    }

    /// Checks cross-field invariants.
    ///
    /// # Errors
    ///
    /// Returns a configuration error describing the first violated rule.
    pub fn validate(&self) -> Result<()> {
        self.trigger_policy()?;
        let gate = self.environment_gate()?;
        if !gate.declared_names().contains(&self.environment.as_str()) {
            return Err(Error::configuration(
                format!("environment '{}' is not declared", self.environment),
                format!("Declared environments: {}", gate.declared_names().join(", ")),
            ));
        }

        require_secure_endpoint("registry.federation_url", &self.registry.federation_url)?;
        require_secure_endpoint("registry.upload_url", &self.registry.upload_url)?;

        if self.registry.namespace.trim().is_empty() || self.registry.namespace.contains('*') {
            return Err(Error::configuration(
                "registry.namespace must name exactly one package",
                "Set registry.namespace to the package's registry name",
            ));
        }
        if self.registry.audience.trim().is_empty() {
            return Err(Error::configuration(
                "registry.audience is empty",
                "Set registry.audience to the audience the registry expects (e.g. \"pypi\")",
            ));
        }
        if self.build.command.first().is_none_or(|p| p.trim().is_empty()) {
            return Err(Error::configuration(
                "build.command is empty",
                "Set build.command, e.g. [\"python3\", \"-m\", \"build\"]",
            ));
        }
        if self.build.output_dir.is_absolute() {
            return Err(Error::configuration(
                "build.output_dir must be relative to the source tree",
                "Use a relative path such as \"dist\"",
            ));
        }
        Ok(())
    }

    /// Compiled trigger policy.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the pattern is invalid.
    pub fn trigger_policy(&self) -> Result<TriggerPolicy> {
        TriggerPolicy::try_from(&self.trigger)
    }

    /// Environment gate over the declared environments.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if environment names repeat.
    pub fn environment_gate(&self) -> Result<EnvironmentGate> {
        EnvironmentGate::new(self.environments.clone())
    }
}

/// Rejects endpoints that are not integrity-protected.
///
/// `https://` is always accepted; `http://` only for loopback hosts. URLs
/// carrying a username or password are rejected outright.
///
/// # Errors
///
/// Returns a configuration error for any other endpoint.
pub fn require_secure_endpoint(field: &str, url: &str) -> Result<()> {
    let insecure = |reason: &str| {
        Error::configuration(
            format!("{field} {reason}: {url}"),
            "Credentials are only exchanged over integrity-protected channels",
        )
    };

    let parsed = Url::parse(url).map_err(|e| insecure(&format!("is not a valid URL ({e})")))?;
    if !parsed.username().is_empty() || parsed.password().is_some() {
        return Err(insecure("must not embed credentials"));
    }

    match parsed.scheme() {
        "https" => Ok(()),
        "http" if is_loopback(&parsed) => Ok(()),
        _ => Err(insecure("must use https")),
    }
}

fn is_loopback(url: &Url) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };
    host.eq_ignore_ascii_case("localhost")
        || host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<IpAddr>()
            .is_ok_and(|ip| ip.is_loopback())
}
