//! Logging setup for the host binary.
//!
//! Log lines go to a file in the XDG state directory when one can be
//! opened, and to stderr otherwise; the decision is made here so callers
//! install the subscriber with a single call.

use std::fs::{self, File};
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Where log lines end up.
enum Sink {
    File(PathBuf, File),
    /// Carries the reason the state directory was unusable.
    Stderr(anyhow::Error),
}

fn resolve_sink() -> Sink {
    match open_state_log() {
        Ok((path, file)) => Sink::File(path, file),
        Err(reason) => Sink::Stderr(reason),
    }
}

fn open_state_log() -> anyhow::Result<(PathBuf, File)> {
    let dir = xdg::BaseDirectories::with_prefix("cadu")?
        .get_state_home()
        .join("cadu");
    fs::create_dir_all(&dir)?;
    let path = dir.join("cadu.log");
    let file = fs::OpenOptions::new().create(true).append(true).open(&path)?;
    Ok((path, file))
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,cadu_core=debug,cadu_cli=debug"))
}

/// Install the global subscriber, honoring `RUST_LOG` for filtering.
/// Never fails: with no usable log file the subscriber writes to stderr
/// and says why.
pub fn init_logging() {
    match resolve_sink() {
        Sink::File(path, file) => {
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .init();
            tracing::info!("logging to {}", path.display());
        }
        Sink::Stderr(reason) => {
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_writer(io::stderr)
                .with_ansi(false)
                .init();
            tracing::warn!("log file unavailable ({reason:#}), logging to stderr");
        }
    }
}
