//! Build a manifest from an on-disk tree: the inverse of the update engine.
//!
//! Indexing a tree and then updating an empty root to the resulting
//! manifest reproduces the tree; the walk is sorted so duplicate-content
//! path lists come out in a stable order.

use crate::checksum;
use crate::manifest::Manifest;
use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::Path;
use walkdir::WalkDir;

/// Walk `root` and produce its manifest: every regular file hashed and
/// recorded under its digest, every entry-less directory recorded as empty.
pub fn index_tree(root: &Path) -> Result<Manifest> {
    let mut manifest = Manifest::default();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.context("walking tree")?;
        let path = entry.path();
        if path == root {
            continue;
        }
        let rel = relative_slash_path(root, path)?;
        if entry.file_type().is_dir() {
            let mut children = fs::read_dir(path)
                .with_context(|| format!("reading dir {}", path.display()))?;
            if children.next().is_none() {
                manifest.empty_dirs.insert(rel);
            }
        } else if entry.file_type().is_file() {
            let digest = checksum::sha1_path(path)
                .with_context(|| format!("hashing {}", path.display()))?;
            manifest.files.entry(digest).or_default().push(rel);
        }
    }
    Ok(manifest)
}

/// Serialize a manifest the way the catalog serves it: JSON, xz-compressed
/// when the output path ends in `.xz`.
pub fn write_manifest(manifest: &Manifest, out: &Path) -> Result<()> {
    let json = serde_json::to_vec(manifest).context("serializing manifest")?;
    let bytes = if out.extension().is_some_and(|ext| ext == "xz") {
        let mut encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
        encoder.write_all(&json).context("compressing manifest")?;
        encoder.finish().context("compressing manifest")?
    } else {
        json
    };
    fs::write(out, bytes).with_context(|| format!("writing {}", out.display()))?;
    Ok(())
}

fn relative_slash_path(root: &Path, path: &Path) -> Result<String> {
    let rel = path
        .strip_prefix(root)
        .with_context(|| format!("{} is outside the indexed root", path.display()))?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}
