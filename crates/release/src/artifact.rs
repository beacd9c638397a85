//! Build outputs handed from the builder to the publisher.
//!
//! This module handles:
//! - Collecting build outputs into an ordered, read-only [`ArtifactSet`]
//! - SHA256 checksum generation
//! - Checksums manifest file creation

use crate::error::{Error, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

/// Name of the checksums manifest written next to the artifacts.
pub const CHECKSUMS_FILE: &str = "SHA256SUMS";

/// A single distributable file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    /// File name as it will appear in the registry.
    pub file_name: String,
    /// Location on disk.
    pub path: PathBuf,
    /// Size in bytes.
    pub size: u64,
    /// SHA256 checksum hex string.
    pub sha256: String,
}

impl Artifact {
    /// Reads metadata and checksum for a file.
    ///
    /// # Errors
    ///
    /// Returns a build failure if the file cannot be read.
    pub fn from_path(path: &Path) -> Result<Self> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                Error::build_failure(format!("artifact has no usable name: {}", path.display()))
            })?
            .to_string();
        let size = std::fs::metadata(path)
            .map_err(|e| {
                Error::build_failure(format!("cannot stat artifact {}: {e}", path.display()))
            })?
            .len();
        let sha256 = compute_sha256(path)?;

        Ok(Self {
            file_name,
            path: path.to_path_buf(),
            size,
            sha256,
        })
    }
}

/// Ordered, immutable set of build outputs.
///
/// Ordering is by file name so two builds of the same tree list their
/// artifacts identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArtifactSet {
    artifacts: Vec<Artifact>,
}

impl ArtifactSet {
    /// Builds a set from artifacts, sorting them by file name.
    ///
    /// # Errors
    ///
    /// Returns a build failure if two artifacts share a file name.
    pub fn new(mut artifacts: Vec<Artifact>) -> Result<Self> {
        artifacts.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        if let Some(pair) = artifacts
            .windows(2)
            .find(|w| w[0].file_name == w[1].file_name)
        {
            return Err(Error::build_failure(format!(
                "duplicate artifact name: {}",
                pair[0].file_name
            )));
        }
        Ok(Self { artifacts })
    }

    /// Collects every regular file directly inside `dir`.
    ///
    /// Hidden files and a previously written checksums manifest are skipped.
    ///
    /// # Errors
    ///
    /// Returns a build failure if the directory is missing, unreadable or
    /// contains no artifacts.
    pub fn collect(dir: &Path) -> Result<Self> {
        let entries = std::fs::read_dir(dir).map_err(|e| {
            Error::build_failure(format!(
                "build output directory {} is unreadable: {e}",
                dir.display()
            ))
        })?;

        let mut artifacts = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                Error::build_failure(format!("failed to list {}: {e}", dir.display()))
            })?;
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') || name == CHECKSUMS_FILE || !path.is_file() {
                continue;
            }
            artifacts.push(Artifact::from_path(&path)?);
        }

        if artifacts.is_empty() {
            return Err(Error::build_failure(format!(
                "build produced no artifacts in {}",
                dir.display()
            )));
        }

        Self::new(artifacts)
    }

    /// Artifacts in publish order.
    #[must_use]
    pub fn as_slice(&self) -> &[Artifact] {
        &self.artifacts
    }

    /// Iterates artifacts in publish order.
    pub fn iter(&self) -> std::slice::Iter<'_, Artifact> {
        self.artifacts.iter()
    }

    /// Number of artifacts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    /// Returns true if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Builds the checksums manifest for this set.
    #[must_use]
    pub fn checksums(&self) -> ChecksumsManifest {
        let mut manifest = ChecksumsManifest::new();
        for artifact in &self.artifacts {
            manifest.add(&artifact.file_name, &artifact.sha256);
        }
        manifest
    }
}

impl<'a> IntoIterator for &'a ArtifactSet {
    type Item = &'a Artifact;
    type IntoIter = std::slice::Iter<'a, Artifact>;

    fn into_iter(self) -> Self::IntoIter {
        self.artifacts.iter()
    }
}

/// Computes the SHA256 checksum of a file.
///
/// # Errors
///
/// Returns a build failure if the file cannot be opened or read.
pub fn compute_sha256(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|e| {
        Error::build_failure(format!(
            "failed to open {} for checksum: {e}",
            path.display()
        ))
    })?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = reader.read(&mut buffer).map_err(|e| {
            Error::build_failure(format!(
                "failed to read {} for checksum: {e}",
                path.display()
            ))
        })?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    let hash = hasher.finalize();
    Ok(format!("{hash:x}"))
}

/// Checksums manifest in `sha256sum` format.
#[derive(Debug, Default)]
pub struct ChecksumsManifest {
    entries: Vec<(String, String)>,
}

impl ChecksumsManifest {
    /// Creates an empty manifest.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry.
    pub fn add(&mut self, file_name: &str, sha256: &str) {
        self.entries
            .push((file_name.to_string(), sha256.to_string()));
    }

    /// Renders the manifest, one `<sha256>  <file>` line per entry.
    #[must_use]
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|(name, hash)| format!("{hash}  {name}\n"))
            .collect()
    }

    /// Writes the manifest to `path`.
    ///
    /// # Errors
    ///
    /// Returns a build failure if the file cannot be written.
    pub fn write(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.render()).map_err(|e| {
            Error::build_failure(format!(
                "failed to write checksums to {}: {e}",
                path.display()
            ))
        })
    }
}
