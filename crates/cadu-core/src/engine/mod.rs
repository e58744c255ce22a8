//! Three-phase differential update: prepare (reuse), download, reconstruct.
//!
//! Prepare moves every still-wanted file out of the live tree into the
//! staging area, addressed by content hash. Download fills the hashes that
//! could not be reused. Reconstruct sweeps the obsolete tree, materializes
//! every target path out of staging, recreates empty directories and
//! removes the (drained) staging area. Interrupting anywhere leaves the
//! staging area behind; re-running with the same arguments resumes from it.

mod backup;
mod staging;
#[cfg(test)]
mod tests;

pub use backup::backup_files;
pub use staging::{StagingArea, STAGING_DIR};

use crate::catalog;
use crate::checksum;
use crate::manifest::{to_native, Manifest};
use crate::pipeline::{self, FetchRequest, PipelineError, PipelineOptions};
use crate::report::{ReportError, Reporter};
use crate::retry::{FetchError, RetryPolicy};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("download of {path} failed: {source}")]
    Download {
        path: String,
        #[source]
        source: FetchError,
    },
    #[error("cannot build file URL for {0:?}")]
    FileUrl(String),
    #[error("invalid backup pattern {pattern:?}: {source}")]
    BackupPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
    #[error("staging area is locked by another updater")]
    StagingBusy,
    #[error("download worker panicked")]
    WorkerPanic,
    #[error("step reporting contract violated")]
    ReportContract,
    #[error("update stopped")]
    Stopped,
}

impl From<ReportError> for UpdateError {
    fn from(e: ReportError) -> Self {
        match e {
            ReportError::Stopped => UpdateError::Stopped,
            ReportError::ReportMissing => UpdateError::ReportContract,
        }
    }
}

impl From<PipelineError> for UpdateError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::Fetch { path, source } => UpdateError::Download { path, source },
            PipelineError::Stopped => UpdateError::Stopped,
            PipelineError::WorkerPanic => UpdateError::WorkerPanic,
        }
    }
}

fn io_error(path: &Path, source: std::io::Error) -> UpdateError {
    UpdateError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Parallel download workers.
    pub workers: usize,
    /// Bound on buffered download completions.
    pub prefetch: usize,
    pub retry: RetryPolicy,
    /// Also hash-verify files moved out of the live tree in the prepare
    /// phase. Staged candidates outside the current manifest are always
    /// verified.
    pub verify_reused: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            workers: pipeline::DEFAULT_WORKERS,
            prefetch: pipeline::DEFAULT_PREFETCH,
            retry: RetryPolicy::default(),
            verify_reused: false,
        }
    }
}

/// One update run: transition `root` from `current` to `target`, fetching
/// missing content below `file_base`.
#[derive(Debug)]
pub struct UpdateJob {
    pub root: PathBuf,
    pub current: Manifest,
    pub target: Manifest,
    pub file_base: Url,
    pub options: EngineOptions,
}

impl UpdateJob {
    pub fn new(root: PathBuf, current: Manifest, target: Manifest, file_base: Url) -> Self {
        Self {
            root,
            current,
            target,
            file_base,
            options: EngineOptions::default(),
        }
    }

    /// Drive all three phases. On any failure the reporter is stopped and
    /// the error propagates; the on-disk state (staging area included) is
    /// left for a resumed run.
    pub fn run(&self, reporter: &Reporter) -> Result<(), UpdateError> {
        let result = self.run_phases(reporter);
        if let Err(e) = &result {
            if !reporter.is_stopped() {
                tracing::error!(error = %e, root = %self.root.display(), "update failed");
            }
            reporter.stop();
        }
        result
    }

    fn run_phases(&self, reporter: &Reporter) -> Result<(), UpdateError> {
        if reporter.is_stopped() {
            return Err(UpdateError::Stopped);
        }
        let staging = StagingArea::acquire(&self.root)?;
        let to_download = self.prepare(&staging, reporter)?;
        self.download(&staging, to_download, reporter)?;
        self.sweep(&staging, reporter)?;
        self.materialize(&staging, reporter)?;
        self.create_empty_dirs(reporter)?;
        staging.finish()?;
        reporter.stop();
        Ok(())
    }

    /// Phase P: move every reusable live file into staging, addressed by
    /// hash, and collect the hashes that must be downloaded. Already-staged
    /// entries are kept (resumption); staged candidates not explained by
    /// the current manifest are trusted only after a hash check.
    fn prepare(
        &self,
        staging: &StagingArea,
        reporter: &Reporter,
    ) -> Result<Vec<String>, UpdateError> {
        let mut to_download = Vec::new();
        let hashes: Vec<String> = self.target.files.keys().cloned().collect();
        for item in reporter.task_iter("Preparing contents...", hashes, Some("file"))? {
            let (hash, step) = item?;
            let staged = staging.entry(&hash);
            if self.current.contains_hash(&hash) {
                let mut staged_now = staged.is_file();
                if !staged_now {
                    // The current manifest knows a live path for this hash;
                    // moving (not copying) it means the later sweep can be
                    // destructive without losing wanted content.
                    let rel = self.current.first_path(&hash).unwrap_or_default();
                    let live = self.root.join(to_native(rel));
                    match fs::rename(&live, &staged) {
                        Ok(()) => staged_now = true,
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                            tracing::debug!(path = rel, "live file missing, will download");
                            to_download.push(hash.clone());
                        }
                        Err(e) => return Err(io_error(&live, e)),
                    }
                }
                if staged_now
                    && self.options.verify_reused
                    && !self.verify_staged(&staged, &hash)?
                {
                    to_download.push(hash.clone());
                }
            } else if staged.is_file() {
                // Left over from an interrupted run; only a matching hash
                // makes it trustworthy.
                if !self.verify_staged(&staged, &hash)? {
                    to_download.push(hash.clone());
                }
            } else {
                to_download.push(hash.clone());
            }
            step.report(Some(hash))?;
        }
        tracing::info!(missing = to_download.len(), "prepare finished");
        Ok(to_download)
    }

    /// Recompute the hash of a staged file; a mismatch removes it.
    fn verify_staged(&self, staged: &Path, hash: &str) -> Result<bool, UpdateError> {
        let actual = checksum::sha1_path(staged).map_err(|e| io_error(staged, e))?;
        if actual == hash {
            return Ok(true);
        }
        tracing::warn!(expected = hash, found = %actual, "staged file failed verification");
        fs::remove_file(staged).map_err(|e| io_error(staged, e))?;
        Ok(false)
    }

    /// Phase D: fetch every missing hash into staging through the bounded
    /// pipeline, one reporter step per completion (arrival order).
    fn download(
        &self,
        staging: &StagingArea,
        to_download: Vec<String>,
        reporter: &Reporter,
    ) -> Result<(), UpdateError> {
        reporter.task(
            "Downloading new data...",
            Some("file"),
            Some(to_download.len() as u64),
        )?;
        let mut requests = Vec::with_capacity(to_download.len());
        for hash in to_download {
            let Some(rel) = self.target.first_path(&hash) else {
                continue;
            };
            let url = catalog::file_url(&self.file_base, rel)
                .map_err(|_| UpdateError::FileUrl(rel.to_string()))?;
            requests.push(FetchRequest {
                hash,
                url: url.into(),
                path: rel.to_string(),
            });
        }
        let options = PipelineOptions {
            workers: self.options.workers,
            prefetch: self.options.prefetch,
            retry: self.options.retry,
        };
        pipeline::run(
            requests,
            staging.path(),
            &options,
            reporter.stop_token(),
            |completion| reporter.step(Some(completion.request.path.clone())),
        )?;
        Ok(())
    }

    /// Phase R1: delete everything outside the staging area, bottom-up.
    /// Read-only bits are cleared first; non-empty directories are left for
    /// later passes of the walk (only the root keeps the staging dir).
    fn sweep(&self, staging: &StagingArea, reporter: &Reporter) -> Result<(), UpdateError> {
        reporter.task("Removing obsolete files...", Some("file"), None)?;
        for entry in WalkDir::new(&self.root).contents_first(true) {
            let entry = entry.map_err(|e| self.walk_error(e))?;
            let path = entry.path();
            if path == self.root || path.starts_with(staging.path()) {
                continue;
            }
            if entry.file_type().is_dir() {
                if reporter.is_stopped() {
                    return Err(UpdateError::Stopped);
                }
                match fs::remove_dir(path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::DirectoryNotEmpty => {}
                    Err(e) => return Err(io_error(path, e)),
                }
            } else {
                clear_readonly(path)?;
                fs::remove_file(path).map_err(|e| io_error(path, e))?;
                let rel = path.strip_prefix(&self.root).unwrap_or(path);
                reporter.step(Some(rel.to_string_lossy().into_owned()))?;
            }
        }
        Ok(())
    }

    /// Phase R2: materialize every target path from staging. Duplicates are
    /// copied; the last path is moved, so staging drains as the tree fills.
    fn materialize(
        &self,
        staging: &StagingArea,
        reporter: &Reporter,
    ) -> Result<(), UpdateError> {
        let entries: Vec<(String, Vec<String>)> = self
            .target
            .files
            .iter()
            .map(|(hash, paths)| (hash.clone(), paths.clone()))
            .collect();
        for item in reporter.task_iter("Creating file structure...", entries, Some("file"))? {
            let ((hash, paths), step) = item?;
            let source = staging.entry(&hash);
            let Some((last, firsts)) = paths.split_last() else {
                continue;
            };
            for rel in firsts {
                let dest = self.root.join(to_native(rel));
                ensure_parent(&dest)?;
                fs::copy(&source, &dest).map_err(|e| io_error(&dest, e))?;
            }
            let dest = self.root.join(to_native(last));
            ensure_parent(&dest)?;
            fs::rename(&source, &dest).map_err(|e| io_error(&dest, e))?;
            step.report(Some(last.clone()))?;
        }
        Ok(())
    }

    /// Phase R3: recreate directories that exist without containing files.
    fn create_empty_dirs(&self, reporter: &Reporter) -> Result<(), UpdateError> {
        if reporter.is_stopped() {
            return Err(UpdateError::Stopped);
        }
        for rel in &self.target.empty_dirs {
            let dir = self.root.join(to_native(rel));
            fs::create_dir_all(&dir).map_err(|e| io_error(&dir, e))?;
        }
        Ok(())
    }

    fn walk_error(&self, e: walkdir::Error) -> UpdateError {
        let path = e.path().unwrap_or(&self.root).to_path_buf();
        UpdateError::Io {
            path,
            source: e.into(),
        }
    }
}

fn ensure_parent(dest: &Path) -> Result<(), UpdateError> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
    }
    Ok(())
}

/// Read-only files (common on trees synced from read-only media) would make
/// `remove_file` fail on some platforms; drop the bit first.
fn clear_readonly(path: &Path) -> Result<(), UpdateError> {
    let metadata = fs::metadata(path).map_err(|e| io_error(path, e))?;
    let mut perms = metadata.permissions();
    if perms.readonly() {
        #[allow(clippy::permissions_set_readonly_false)]
        perms.set_readonly(false);
        fs::set_permissions(path, perms).map_err(|e| io_error(path, e))?;
    }
    Ok(())
}
