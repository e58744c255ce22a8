use cadu_core::logging;

mod cli;

use crate::cli::CliCommand;

fn main() {
    // Logging first; the subscriber picks its own sink (state-dir file or
    // stderr fallback).
    logging::init_logging();

    // Parse CLI and dispatch.
    if let Err(err) = CliCommand::run_from_args() {
        eprintln!("cadu error: {:#}", err);
        std::process::exit(1);
    }
}
