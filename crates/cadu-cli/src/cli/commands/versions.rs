//! The versions command: list what the catalog publishes.

use anyhow::Result;
use cadu_core::config::CaduConfig;

pub fn run_versions(cfg: &CaduConfig) -> Result<()> {
    let client = super::connect(cfg)?;
    let targets = client.update_targets();
    for name in client.versions() {
        let mut flags = Vec::new();
        if targets.contains(&name) {
            flags.push("update target");
        }
        if name == client.latest() {
            flags.push("latest");
        }
        let info = client.info(name).unwrap_or("");
        if flags.is_empty() {
            println!("{name:<24} {info}");
        } else {
            println!("{name:<24} {info} [{}]", flags.join(", "));
        }
    }
    Ok(())
}
