//! Crash-resumable staging area: a flat directory of content hashes under
//! the managed root, plus an advisory lock so two updaters cannot share it.

use super::{io_error, UpdateError};
use fs2::FileExt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// Directory name of the staging area under the managed root.
pub const STAGING_DIR: &str = ".tmp";

/// Lock file inside the staging area. Never a content hash, so every other
/// code path treats it as an unrelated entry.
const LOCK_FILE: &str = ".lock";

/// Exclusive handle on `<root>/.tmp`. Created (or re-used, for resumption)
/// at update start; the advisory lock is held until `finish` or drop.
#[derive(Debug)]
pub struct StagingArea {
    dir: PathBuf,
    lock: File,
}

impl StagingArea {
    /// Create or re-use the staging directory and take its lock. Fails with
    /// `StagingBusy` when another updater holds it.
    pub fn acquire(root: &Path) -> Result<Self, UpdateError> {
        let dir = root.join(STAGING_DIR);
        fs::create_dir_all(&dir).map_err(|e| io_error(&dir, e))?;
        let lock_path = dir.join(LOCK_FILE);
        let lock = File::options()
            .create(true)
            .write(true)
            .open(&lock_path)
            .map_err(|e| io_error(&lock_path, e))?;
        lock.try_lock_exclusive().map_err(|e| {
            if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() {
                UpdateError::StagingBusy
            } else {
                io_error(&lock_path, e)
            }
        })?;
        Ok(Self { dir, lock })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Path of the staged file for a content hash.
    pub fn entry(&self, hash: &str) -> PathBuf {
        self.dir.join(hash)
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.entry(hash).is_file()
    }

    /// Remove the staging area. All hashes must have been drained by
    /// materialization; only the lock file may remain.
    pub fn finish(self) -> Result<(), UpdateError> {
        let StagingArea { dir, lock } = self;
        let lock_path = dir.join(LOCK_FILE);
        let _ = FileExt::unlock(&lock);
        drop(lock);
        fs::remove_file(&lock_path).map_err(|e| io_error(&lock_path, e))?;
        fs::remove_dir(&dir).map_err(|e| io_error(&dir, e))?;
        Ok(())
    }
}
