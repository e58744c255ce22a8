//! The index command: build a manifest from a tree.

use anyhow::{Context, Result};
use cadu_core::indexer;
use std::path::Path;

pub fn run_index(path: &Path, out: &Path) -> Result<()> {
    anyhow::ensure!(path.is_dir(), "path not found: {}", path.display());
    let manifest = indexer::index_tree(path)
        .with_context(|| format!("indexing {}", path.display()))?;
    indexer::write_manifest(&manifest, out)?;
    println!(
        "Indexed {} files ({} distinct, {} empty dirs) into {}",
        manifest.file_count(),
        manifest.files.len(),
        manifest.empty_dirs.len(),
        out.display()
    );
    Ok(())
}
