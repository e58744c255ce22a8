//! The update command: wire catalog, engine and a terminal observer.

use anyhow::{Context, Result};
use cadu_core::config::CaduConfig;
use cadu_core::engine::{self, UpdateJob};
use cadu_core::report::{self, Progress};
use chrono::Local;
use indicatif::{HumanDuration, ProgressBar, ProgressStyle};
use std::path::Path;
use std::thread;
use std::time::Duration;

pub fn run_update(
    cfg: &CaduConfig,
    root: &Path,
    current_name: &str,
    target_name: &str,
    backup_dir: Option<&Path>,
) -> Result<()> {
    anyhow::ensure!(root.is_dir(), "root path not found: {}", root.display());
    let client = super::connect(cfg)?;
    // Resolved before any disk mutation: a version without a root URL can
    // never be updated to.
    let file_base = client.root_url_for(target_name)?;
    tracing::info!(current = current_name, target = target_name, "starting update");

    let (reporter, progress) = report::channel(report::DEFAULT_CAPACITY);
    let observer = thread::spawn(move || observe(progress));

    let result = (|| -> Result<()> {
        if let Some(dir) = backup_dir {
            let patterns = client.backup_paths(current_name)?;
            if !patterns.is_empty() {
                let dest = dir.join(Local::now().format("%Y-%m-%d_%H-%M-%S").to_string());
                let patterns = patterns.to_vec();
                engine::backup_files(root, &patterns, &dest, &reporter)
                    .context("backup failed")?;
            }
        }

        let current = client
            .fetch_manifest(current_name, &reporter)
            .with_context(|| format!("could not retrieve index {current_name}"))?;
        let target = client
            .fetch_manifest(target_name, &reporter)
            .with_context(|| format!("could not retrieve index {target_name}"))?;

        let mut job = UpdateJob::new(root.to_path_buf(), current, target, file_base);
        job.options.workers = cfg.max_workers.max(1);
        job.options.prefetch = cfg.prefetch.max(1);
        job.run(&reporter)?;
        Ok(())
    })();

    // Failures before the engine takes over (backup, manifest fetch) leave
    // the reporter running; close it so the observer can finish.
    reporter.stop();
    drop(reporter);
    let elapsed = observer
        .join()
        .unwrap_or_else(|_| Duration::default());

    result?;
    println!("Update completed in {}", HumanDuration(elapsed));
    Ok(())
}

/// Terminal observer: one progress bar per task, fed from the step stream.
fn observe(progress: Progress) -> Duration {
    for task in progress.tasks() {
        let bar = match task.length {
            Some(length) => {
                let bar = ProgressBar::new(length);
                bar.set_style(
                    ProgressStyle::with_template(
                        "{prefix:<28} {bar:32} {pos}/{len} {wide_msg}",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
                );
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                bar.enable_steady_tick(Duration::from_millis(120));
                bar
            }
        };
        bar.set_prefix(task.title.clone());
        for payload in progress.steps() {
            bar.inc(1);
            if let Some(item) = payload {
                bar.set_message(item);
            }
        }
        bar.finish_and_clear();
        println!("{} done", task.title);
    }
    progress.elapsed()
}
