//! Tag/metadata version consistency.
//!
//! Optional pre-build check that the version derived from the tag equals the
//! version declared in the source tree's own package metadata, e.g.
//! `[project].version` in `pyproject.toml`.

use crate::error::{Error, Result};
use crate::source::SourceTree;
use crate::trigger::TriggeredRelease;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use toml::Value;

/// Where the declared version lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConsistencyConfig {
    /// TOML metadata file, relative to the tree root.
    pub file: PathBuf,
    /// Dotted key of the version string (e.g. "project.version").
    pub key: String,
}

/// Reads the declared version from the tree.
///
/// # Errors
///
/// Returns a build failure if the file cannot be read or parsed, or the key
/// does not resolve to a string.
pub fn declared_version(tree: &SourceTree, config: &ConsistencyConfig) -> Result<String> {
    let path = tree.root().join(&config.file);
    let content = std::fs::read_to_string(&path).map_err(|e| {
        Error::build_failure(format!("cannot read {}: {e}", config.file.display()))
    })?;
    let doc: Value = toml::from_str(&content).map_err(|e| {
        Error::build_failure(format!("cannot parse {}: {e}", config.file.display()))
    })?;

    config
        .key
        .split('.')
        .try_fold(&doc, |node, segment| node.get(segment))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            Error::build_failure(format!(
                "no string at '{}' in {}",
                config.key,
                config.file.display()
            ))
        })
}

/// Verifies the tag version against the declared version.
///
/// # Errors
///
/// Returns `VersionMismatch` if they differ, or a build failure if the
/// declared version cannot be read.
pub fn verify(
    release: &TriggeredRelease,
    tree: &SourceTree,
    config: &ConsistencyConfig,
) -> Result<()> {
    let declared = declared_version(tree, config)?;
    if declared == release.version() {
        return Ok(());
    }
    Err(Error::VersionMismatch {
        tag_version: release.version().to_string(),
        declared,
        file: config.file.clone(),
    })
}
