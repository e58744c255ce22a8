//! Catalog client: version metadata from the remote server, plus streaming
//! manifest fetch with progress reporting.
//!
//! The catalog serves `meta.json` describing every published version; each
//! version entry points at a manifest document and, for update targets, at
//! a root URL that per-file relative paths resolve against.

use crate::http;
use crate::manifest::{Manifest, ManifestError};
use crate::report::Reporter;
use crate::retry::{run_with_retry, FetchError, RetryPolicy};
use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;
use url::Url;

/// Default chunk size for manifest streaming progress (bytes per step).
pub const DEFAULT_FETCH_CHUNK: usize = 2048;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("could not retrieve catalog data: {0}")]
    Network(#[source] FetchError),
    #[error("catalog server returned HTTP {0}")]
    Http(u32),
    #[error("catalog metadata is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error("invalid catalog URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("root URL cannot carry path segments: {0}")]
    BadRootUrl(String),
    #[error("unknown version: {0}")]
    UnknownVersion(String),
    #[error("version {0} is not an update target (no root URL)")]
    NotAnUpdateTarget(String),
    #[error("catalog fetch stopped")]
    Stopped,
}

/// Per-version entry of the catalog metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexEntry {
    /// Manifest document location, relative to the catalog endpoint.
    pub path: String,
    /// True when the manifest body is an `.xz` stream.
    #[serde(rename = "lzma")]
    pub lzma_compressed: bool,
    /// Human-readable description shown by front-ends.
    pub info: String,
    /// Base URL for per-file fetches; present iff the version is an update
    /// target.
    #[serde(default)]
    pub root: Option<String>,
    /// Glob patterns (relative to the managed root) worth saving before
    /// updating away from this version.
    #[serde(default)]
    pub backup: Vec<String>,
}

/// Anchor configuration: a designated file whose content hash identifies
/// the installed version.
#[derive(Debug, Clone, Deserialize)]
pub struct Anchor {
    pub file: String,
    pub autodetect: BTreeMap<String, String>,
}

/// Catalog metadata document (`meta.json`).
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogMeta {
    pub indexes: BTreeMap<String, IndexEntry>,
    pub latest: String,
    #[serde(default)]
    pub anchor: Option<Anchor>,
}

/// Client over one catalog endpoint. Metadata is fetched once at `load` and
/// read-only afterwards.
#[derive(Debug)]
pub struct CatalogClient {
    endpoint: Url,
    meta: CatalogMeta,
    retry: RetryPolicy,
    fetch_chunk_size: usize,
}

impl CatalogClient {
    /// GET `<endpoint>/meta.json` and parse it.
    pub fn load(endpoint: &str) -> Result<Self, CatalogError> {
        let endpoint = Url::parse(endpoint)?;
        let url = endpoint.join("meta.json")?;
        let body = http::get(url.as_str()).map_err(map_fetch)?;
        let meta: CatalogMeta = serde_json::from_slice(&body)?;
        tracing::debug!(versions = meta.indexes.len(), latest = %meta.latest, "catalog loaded");
        Ok(Self {
            endpoint,
            meta,
            retry: RetryPolicy::default(),
            fetch_chunk_size: DEFAULT_FETCH_CHUNK,
        })
    }

    pub fn with_fetch_chunk_size(mut self, chunk_size: usize) -> Self {
        self.fetch_chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn meta(&self) -> &CatalogMeta {
        &self.meta
    }

    /// Names of all published versions.
    pub fn versions(&self) -> impl Iterator<Item = &str> {
        self.meta.indexes.keys().map(String::as_str)
    }

    /// Versions that can be updated to (those exposing a root URL).
    pub fn update_targets(&self) -> Vec<&str> {
        self.meta
            .indexes
            .iter()
            .filter(|(_, entry)| entry.root.is_some())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Version-name hint for default selection.
    pub fn latest(&self) -> &str {
        &self.meta.latest
    }

    /// Description string for a version.
    pub fn info(&self, name: &str) -> Result<&str, CatalogError> {
        Ok(&self.entry(name)?.info)
    }

    pub fn anchor(&self) -> Option<&Anchor> {
        self.meta.anchor.as_ref()
    }

    /// Map an anchor-file hash to the version it identifies.
    pub fn resolve_anchor(&self, hash: &str) -> Option<&str> {
        self.meta
            .anchor
            .as_ref()
            .and_then(|anchor| anchor.autodetect.get(hash))
            .map(String::as_str)
    }

    /// Backup glob patterns advertised for a version.
    pub fn backup_paths(&self, name: &str) -> Result<&[String], CatalogError> {
        Ok(&self.entry(name)?.backup)
    }

    /// Base URL that per-file relative paths of `name` resolve against.
    pub fn root_url_for(&self, name: &str) -> Result<Url, CatalogError> {
        let entry = self.entry(name)?;
        let root = entry
            .root
            .as_deref()
            .ok_or_else(|| CatalogError::NotAnUpdateTarget(name.to_string()))?;
        Ok(Url::parse(root)?)
    }

    /// Stream, decompress, parse and validate the manifest of `name`.
    ///
    /// One reporter step per received chunk (Content-Length drives the task
    /// length; unknown when the server omits it). Transient failures are
    /// retried with backoff; HTTP 4xx is not.
    pub fn fetch_manifest(&self, name: &str, reporter: &Reporter) -> Result<Manifest, CatalogError> {
        let entry = self.entry(name)?;
        let url = self.endpoint.join(&entry.path)?;
        let title = format!("Fetching index {name}");
        let cancel = reporter.stop_token();
        let body = run_with_retry(&self.retry, &cancel, || {
            http::get_streaming(url.as_str(), self.fetch_chunk_size, &title, reporter)
        })
        .map_err(map_fetch)?;
        Ok(Manifest::parse(&body, entry.lzma_compressed)?)
    }

    fn entry(&self, name: &str) -> Result<&IndexEntry, CatalogError> {
        self.meta
            .indexes
            .get(name)
            .ok_or_else(|| CatalogError::UnknownVersion(name.to_string()))
    }
}

/// Resolve a manifest-relative path against a version's root URL,
/// percent-encoding each component while preserving `/` separators.
pub fn file_url(root: &Url, rel_path: &str) -> Result<Url, CatalogError> {
    let mut url = root.clone();
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|()| CatalogError::BadRootUrl(root.to_string()))?;
        segments.pop_if_empty();
        segments.extend(rel_path.split('/'));
    }
    Ok(url)
}

fn map_fetch(e: FetchError) -> CatalogError {
    match e {
        FetchError::Http(code) => CatalogError::Http(code),
        FetchError::Aborted => CatalogError::Stopped,
        other => CatalogError::Network(other),
    }
}
