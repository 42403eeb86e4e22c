//! Run command implementation

use anyhow::Result;
use colored::*;
use std::sync::Arc;
use tg_testing::{ConsoleReporter, RunSummary, StopSignal, TestPipeline};

use crate::config::TgConfig;
use crate::utils::print_warning;

/// Run the suite once. Returns whether every test ran and passed; a run
/// stopped before all tests started counts as failed.
pub async fn run_command(
    config: &TgConfig,
    pattern: Option<&str>,
    verbose: bool,
    stop: StopSignal,
) -> Result<bool> {
    let pipeline = TestPipeline::new(
        config.pipeline_config(pattern)?,
        Arc::new(ConsoleReporter::new(verbose)),
    )?;

    println!("{} {}", "Running tests in".cyan(), config.discovery.root.display());
    let summary = pipeline.execute(&stop).await?;
    print_run_notes(&summary);

    Ok(summary.is_success() && summary.not_started == 0)
}

/// Warnings and report locations for a finished run
fn print_run_notes(summary: &RunSummary) {
    for warning in &summary.warnings {
        print_warning(&format!("skipped {}: {}", warning.path.display(), warning.message));
    }

    if summary.suite.is_empty() {
        println!("{}", "No tests found!".yellow());
    }

    for report in &summary.reports {
        match &report.result {
            Ok(()) => println!("{} {} report: {}", "→".dimmed(), report.format, report.path.display()),
            Err(e) => print_warning(&format!("{} report not written: {}", report.format, e)),
        }
    }

    if summary.not_started > 0 {
        print_warning(&format!("{} tests were not started", summary.not_started));
    }
}
