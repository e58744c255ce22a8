//! The check command: anchor-based autodetection of the installed version.

use anyhow::{Context, Result};
use cadu_core::checksum;
use cadu_core::config::CaduConfig;
use cadu_core::manifest::to_native;
use std::io::ErrorKind;
use std::path::Path;

pub fn run_check(cfg: &CaduConfig, root: &Path) -> Result<()> {
    let client = super::connect(cfg)?;

    match client.anchor() {
        Some(anchor) => {
            let path = root.join(to_native(&anchor.file));
            match checksum::sha1_path(&path) {
                Ok(digest) => match client.resolve_anchor(&digest) {
                    Some(version) => println!("current: {version}"),
                    None => println!("current: unknown (anchor hash not recognized)"),
                },
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    println!("current: unknown (anchor file missing)")
                }
                Err(e) => {
                    return Err(e).context(format!("could not hash {}", path.display()));
                }
            }
        }
        None => println!("current: unknown (no anchor configured)"),
    }
    println!("latest: {}", client.latest());
    Ok(())
}
