//! Content-addressed manifest model: hash -> relative paths, plus empty dirs.
//!
//! Paths stay `/`-separated in memory regardless of platform; conversion to
//! native separators happens only at filesystem boundaries via `to_native`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::path::PathBuf;
use thiserror::Error;

/// Structural violations rejected when loading a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("manifest decompression failed: {0}")]
    Decompress(#[source] std::io::Error),
    #[error("absolute path in manifest: {0:?}")]
    AbsolutePath(String),
    #[error("path escapes the root: {0:?}")]
    ParentTraversal(String),
    #[error("malformed path: {0:?}")]
    MalformedPath(String),
    #[error("duplicate path: {0:?}")]
    DuplicatePath(String),
    #[error("hash {0} has no paths")]
    EmptyHashGroup(String),
}

/// Snapshot of a version: content hash to the relative paths carrying that
/// content, plus directories that exist without containing any file.
///
/// Two or more paths under one hash are intentional duplicates; the content
/// is transferred once and fanned out during materialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub files: BTreeMap<String, Vec<String>>,
    #[serde(default, rename = "empty")]
    pub empty_dirs: BTreeSet<String>,
}

impl Manifest {
    /// Parse a manifest document, decompressing the `.xz` stream first when
    /// `lzma_compressed` is set, and validate it.
    pub fn parse(bytes: &[u8], lzma_compressed: bool) -> Result<Self, ManifestError> {
        let manifest: Manifest = if lzma_compressed {
            let mut decoded = Vec::new();
            xz2::read::XzDecoder::new(bytes)
                .read_to_end(&mut decoded)
                .map_err(ManifestError::Decompress)?;
            serde_json::from_slice(&decoded)?
        } else {
            serde_json::from_slice(bytes)?
        };
        manifest.validate()?;
        Ok(manifest)
    }

    /// Check the structural invariants: every hash group non-empty, every
    /// path clean, and no path occurring twice (across hash groups and the
    /// empty-dir set alike).
    pub fn validate(&self) -> Result<(), ManifestError> {
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        for (hash, paths) in &self.files {
            if paths.is_empty() {
                return Err(ManifestError::EmptyHashGroup(hash.clone()));
            }
            for path in paths {
                check_path(path)?;
                if !seen.insert(path) {
                    return Err(ManifestError::DuplicatePath(path.clone()));
                }
            }
        }
        for dir in &self.empty_dirs {
            check_path(dir)?;
            if !seen.insert(dir) {
                return Err(ManifestError::DuplicatePath(dir.clone()));
            }
        }
        Ok(())
    }

    /// Total number of file paths (not distinct hashes).
    pub fn file_count(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }

    pub fn contains_hash(&self, hash: &str) -> bool {
        self.files.contains_key(hash)
    }

    /// First path registered for a hash, if any. This is the path used when
    /// a single representative of the content is needed (reuse, download).
    pub fn first_path(&self, hash: &str) -> Option<&str> {
        self.files.get(hash).and_then(|p| p.first()).map(String::as_str)
    }
}

/// Convert a manifest-relative `/`-separated path to a native `PathBuf`.
pub fn to_native(rel: &str) -> PathBuf {
    rel.split('/').collect()
}

fn check_path(path: &str) -> Result<(), ManifestError> {
    if path.is_empty() {
        return Err(ManifestError::MalformedPath(path.to_string()));
    }
    if path.starts_with('/') {
        return Err(ManifestError::AbsolutePath(path.to_string()));
    }
    if path.contains('\\') {
        return Err(ManifestError::MalformedPath(path.to_string()));
    }
    for segment in path.split('/') {
        match segment {
            "" | "." => return Err(ManifestError::MalformedPath(path.to_string())),
            ".." => return Err(ManifestError::ParentTraversal(path.to_string())),
            _ => {}
        }
    }
    Ok(())
}
