//! Pre-update backup: copy glob-matched files out of the managed tree.

use super::{io_error, UpdateError};
use crate::report::Reporter;
use std::fs;
use std::path::{Path, PathBuf};

/// Copy every regular file under `root` matching one of `patterns` into
/// `dest`, preserving relative paths. Patterns come from the catalog entry
/// of the version being updated away from. Returns the number of files
/// saved; with no matches nothing is created and no task is opened.
pub fn backup_files(
    root: &Path,
    patterns: &[String],
    dest: &Path,
    reporter: &Reporter,
) -> Result<usize, UpdateError> {
    let mut files: Vec<(PathBuf, PathBuf)> = Vec::new();
    for pattern in patterns {
        let full = root.join(pattern);
        let matches = glob::glob(&full.to_string_lossy()).map_err(|source| {
            UpdateError::BackupPattern {
                pattern: pattern.clone(),
                source,
            }
        })?;
        // Unreadable matches are skipped, like a shell glob would.
        for path in matches.flatten() {
            if !path.is_file() {
                continue;
            }
            if let Ok(rel) = path.strip_prefix(root) {
                files.push((path.clone(), rel.to_path_buf()));
            }
        }
    }
    if files.is_empty() {
        return Ok(0);
    }

    let count = files.len();
    tracing::info!(count, dest = %dest.display(), "backing up files");
    for item in reporter.task_iter("Backing up files...", files, Some("file"))? {
        let ((path, rel), step) = item?;
        step.report(Some(rel.to_string_lossy().into_owned()))?;
        let target = dest.join(&rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }
        fs::copy(&path, &target).map_err(|e| io_error(&target, e))?;
        tracing::debug!(saved = %rel.display());
    }
    Ok(count)
}
