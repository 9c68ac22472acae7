//! File manifests
//!
//! A manifest is the list of files a migration moves. Paths are relative to
//! the source endpoint so the same manifest describes both sides.

use crate::error::{DataflowError, IoResultExt, Result};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path};
use walkdir::WalkDir;

/// A single file in a manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Path relative to the source endpoint
    #[serde(alias = "filename", alias = "name")]
    pub path: String,
    /// Size in bytes
    #[serde(alias = "size")]
    pub size_bytes: u64,
}

impl ManifestEntry {
    /// Create a new entry
    pub fn new(path: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            path: path.into(),
            size_bytes,
        }
    }

    /// The entry's path, checked to stay below whatever root it is joined to
    ///
    /// Absolute paths, drive prefixes and `..` components are refused.
    pub fn relative_path(&self) -> Result<&Path> {
        let path = Path::new(&self.path);
        let mut named = false;
        for component in path.components() {
            match component {
                Component::Normal(_) => named = true,
                Component::CurDir => {}
                _ => {
                    return Err(DataflowError::ManifestError(format!(
                        "manifest path '{}' leaves the endpoint root",
                        self.path
                    )))
                }
            }
        }
        if !named {
            return Err(DataflowError::ManifestError(format!(
                "manifest path '{}' names no file",
                self.path
            )));
        }
        Ok(path)
    }

    /// Lowercased extension of the final path component
    pub fn extension(&self) -> Option<String> {
        let name = self.path.rsplit(['/', '\\']).next().unwrap_or(&self.path);
        name.rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .filter(|ext| !ext.is_empty())
    }
}

/// Ordered list of files to migrate
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    /// Entries in transfer order
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Create a manifest from entries
    pub fn new(entries: Vec<ManifestEntry>) -> Self {
        Self { entries }
    }

    /// Build a manifest from every regular file below `root`
    pub fn from_dir(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(DataflowError::ManifestError(format!(
                "{} is not a directory",
                root.display()
            )));
        }

        let mut entries = Vec::new();
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                DataflowError::io(path, e.into())
            })?;

            if !entry.file_type().is_file() {
                continue;
            }

            let size = entry.metadata().map_err(|e| {
                DataflowError::io(entry.path(), e.into())
            })?.len();

            let relative = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");

            entries.push(ManifestEntry::new(relative, size));
        }

        Ok(Self { entries })
    }

    /// Load a manifest from a JSON array of `{path, size_bytes}` objects
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_path(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Reject the manifest if any entry points outside the endpoint roots
    pub fn validate(&self) -> Result<()> {
        for entry in &self.entries {
            entry.relative_path()?;
        }
        Ok(())
    }

    /// Total size of all entries, saturating at `u64::MAX`
    pub fn total_bytes(&self) -> u64 {
        self.entries
            .iter()
            .fold(0, |total, e| total.saturating_add(e.size_bytes))
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over entries
    pub fn iter(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.entries.iter()
    }
}

impl FromIterator<ManifestEntry> for Manifest {
    fn from_iter<I: IntoIterator<Item = ManifestEntry>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
