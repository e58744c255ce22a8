//! Individual CLI command implementations.

mod check;
mod index;
mod update;
mod versions;

pub use check::run_check;
pub use index::run_index;
pub use update::run_update;
pub use versions::run_versions;

use anyhow::Result;
use cadu_core::catalog::CatalogClient;
use cadu_core::config::CaduConfig;

/// Connect to the configured catalog endpoint, with a friendly error when
/// the config was never filled in.
pub(super) fn connect(cfg: &CaduConfig) -> Result<CatalogClient> {
    anyhow::ensure!(
        !cfg.index_endpoint.is_empty(),
        "index_endpoint is not configured; set it in {}",
        cadu_core::config::config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| "the cadu config file".to_string())
    );
    let client = CatalogClient::load(&cfg.index_endpoint)?
        .with_fetch_chunk_size(cfg.fetch_chunk_size);
    Ok(client)
}
