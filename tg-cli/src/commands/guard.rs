//! Guard (watch mode) command implementation

use anyhow::{Context, Result};
use colored::*;
use std::sync::Arc;
use tg_guard::{FsWatcher, Guard};
use tg_testing::{ConsoleReporter, StopSignal, TestPipeline};

use crate::config::TgConfig;
use crate::utils::print_info;

/// Watch the configured paths and re-run the suite on change until stopped.
///
/// An unreadable test root is fatal before anything is watched. Individual
/// run failures do not end the session; a clean stop reports success.
pub async fn guard_command(
    config: &TgConfig,
    pattern: Option<&str>,
    verbose: bool,
    stop: StopSignal,
) -> Result<bool> {
    let pipeline = TestPipeline::new(
        config.pipeline_config(pattern)?,
        Arc::new(ConsoleReporter::new(verbose)),
    )?;
    pipeline
        .check()
        .with_context(|| format!("Cannot scan {}", config.discovery.root.display()))?;

    let (watcher, events) = FsWatcher::start(&config.guard.watch)
        .context("Failed to start watching for changes")?;

    let watched: Vec<String> = watcher
        .watched()
        .iter()
        .map(|p| p.display().to_string())
        .collect();
    println!("{} {}", "Watching".cyan(), watched.join(", "));
    print_info("Press Ctrl-C to stop");

    let guard = Guard::new(
        config.guard_config(),
        config.trigger_policy(),
        Arc::new(pipeline),
        events,
        stop,
    );
    let stats = guard.run().await;
    drop(watcher);

    println!(
        "{} {} runs ({} with failures), {} file events ({} ignored)",
        "Guard stopped:".bold(),
        stats.runs_completed,
        stats.runs_failed,
        stats.events_seen,
        stats.events_ignored
    );
    Ok(true)
}
