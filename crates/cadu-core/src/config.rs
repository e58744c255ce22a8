use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Global configuration loaded from `~/.config/cadu/config.toml`.
///
/// `index_endpoint` is the only setting without a usable default; the
/// network-facing commands refuse to run while it is empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaduConfig {
    /// Base URL of the manifest catalog server (serves `meta.json`).
    pub index_endpoint: String,
    /// Maximum concurrent download workers during the download phase.
    pub max_workers: usize,
    /// Maximum unconsumed download completions buffered at any moment.
    pub prefetch: usize,
    /// Chunk size used for manifest streaming progress (bytes per step).
    pub fetch_chunk_size: usize,
}

impl Default for CaduConfig {
    fn default() -> Self {
        Self {
            index_endpoint: String::new(),
            max_workers: 8,
            prefetch: 32,
            fetch_chunk_size: 2048,
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("cadu")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<CaduConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = CaduConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: CaduConfig = toml::from_str(&data)?;
    Ok(cfg)
}
