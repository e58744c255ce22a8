//! CLI for the CADU differential updater.

mod commands;
#[cfg(test)]
mod tests;

use anyhow::Result;
use cadu_core::config;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::{run_check, run_index, run_update, run_versions};

/// Top-level CLI for the CADU differential updater.
#[derive(Debug, Parser)]
#[command(name = "cadu")]
#[command(about = "CADU: content-addressed differential updater", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Update a managed tree from one catalog version to another.
    Update {
        /// Root path of the managed tree.
        root: PathBuf,

        /// Current and target version names.
        #[arg(long, num_args = 2, value_names = ["CURRENT", "TARGET"])]
        update: Option<Vec<String>>,

        /// Print the autodetected current version and the server's latest,
        /// then exit.
        #[arg(long)]
        check: bool,

        /// Save server-advertised backup paths into a timestamped folder
        /// under this directory before updating.
        #[arg(long, value_name = "DIR")]
        backup_dir: Option<PathBuf>,
    },

    /// List the versions published by the catalog server.
    Versions,

    /// Index a tree and write its manifest (xz-compressed when OUT ends in .xz).
    Index {
        /// Tree to index.
        path: PathBuf,
        /// Output manifest file.
        out: PathBuf,
    },
}

impl CliCommand {
    pub fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Update {
                root,
                update,
                check,
                backup_dir,
            } => {
                if check {
                    run_check(&cfg, &root)
                } else if let Some(versions) = update {
                    run_update(&cfg, &root, &versions[0], &versions[1], backup_dir.as_deref())
                } else {
                    anyhow::bail!("pass --update <CURRENT> <TARGET>, or --check")
                }
            }
            CliCommand::Versions => run_versions(&cfg),
            CliCommand::Index { path, out } => run_index(&path, &out),
        }
    }
}
