//! Test reporting module
//!
//! Reporters receive progress callbacks while a suite runs and print the
//! human-readable summary at the end. File reports live in `report_writer`.

use std::sync::Mutex;
use std::time::Duration;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use crate::test_discovery::TestUnit;
use crate::test_result::{TestResult, TestSuite};

/// Number of trailing output lines shown for a failed unit.
const FAILURE_EXCERPT_LINES: usize = 20;

/// Test reporter trait
pub trait TestReporter: Send + Sync {
    /// Called once the set of units to run is known
    fn on_run_start(&self, suite_name: &str, count: usize);

    /// Called when a unit starts
    fn on_test_start(&self, unit: &TestUnit);

    /// Called when a unit finishes
    fn on_test_finish(&self, unit: &TestUnit, result: &TestResult);

    /// Called when the suite has been aggregated; `wall` is the elapsed real time
    fn on_suite_finish(&self, suite: &TestSuite, wall: Duration);
}

/// Reporter that prints nothing
#[derive(Debug, Default)]
pub struct NullReporter;

impl TestReporter for NullReporter {
    fn on_run_start(&self, _suite_name: &str, _count: usize) {}

    fn on_test_start(&self, _unit: &TestUnit) {}

    fn on_test_finish(&self, _unit: &TestUnit, _result: &TestResult) {}

    fn on_suite_finish(&self, _suite: &TestSuite, _wall: Duration) {}
}

/// Console test reporter
pub struct ConsoleReporter {
    verbose: bool,
    progress_bar: Mutex<Option<ProgressBar>>,
}

impl ConsoleReporter {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            progress_bar: Mutex::new(None),
        }
    }

    fn progress(&self) -> Option<ProgressBar> {
        self.progress_bar
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Print above the progress bar when one is active.
    fn print_line(&self, line: String) {
        match self.progress() {
            Some(pb) => pb.println(line),
            None => println!("{}", line),
        }
    }

    fn print_test_result(&self, unit: &TestUnit, result: &TestResult) {
        let status = if result.passed() {
            format!("{} ({})", "PASS".green(), format_seconds(result.duration()))
        } else if result.timed_out() {
            format!("{} ({})", "TIMEOUT".red(), format_seconds(result.duration()))
        } else {
            format!(
                "{} ({}): {}",
                "FAIL".red(),
                format_seconds(result.duration()),
                result.failure().unwrap_or("failed")
            )
        };

        self.print_line(format!("{} ... {}", unit.name, status));

        if self.verbose && !result.output().is_empty() {
            for line in result.output().lines() {
                self.print_line(format!("  {}", line.dimmed()));
            }
        }
    }
}

impl TestReporter for ConsoleReporter {
    fn on_run_start(&self, suite_name: &str, count: usize) {
        println!("\n{} {} ({} tests)\n", "Running".bold(), suite_name, count);

        if !self.verbose && count > 5 {
            let progress_bar = ProgressBar::new(count as u64);
            let style = ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-");
            progress_bar.set_style(style);
            *self
                .progress_bar
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(progress_bar);
        }
    }

    fn on_test_start(&self, unit: &TestUnit) {
        if self.verbose {
            println!("Running {} ...", unit.name);
        }

        if let Some(pb) = self.progress() {
            pb.set_message(unit.name.clone());
        }
    }

    fn on_test_finish(&self, unit: &TestUnit, result: &TestResult) {
        if self.verbose || !result.passed() {
            self.print_test_result(unit, result);
        }

        if let Some(pb) = self.progress() {
            pb.inc(1);
        }
    }

    fn on_suite_finish(&self, suite: &TestSuite, wall: Duration) {
        if let Some(pb) = self
            .progress_bar
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            pb.finish_and_clear();
        }

        print!("{}", render_summary(suite, wall, !self.verbose));
    }
}

/// Human-readable end-of-run summary.
///
/// Failure excerpts are included when `with_excerpts` is set; verbose mode
/// has already printed full output per test.
pub fn render_summary(suite: &TestSuite, wall: Duration, with_excerpts: bool) -> String {
    let mut out = String::new();

    if suite.failed_count() > 0 {
        out.push_str(&format!("\n{}\n", "Failures:".red().bold()));
        for result in suite.failures() {
            out.push_str(&format!(
                "\n  {} {}: {}\n",
                "-".red(),
                result.name(),
                result.failure().unwrap_or("failed")
            ));
            if with_excerpts {
                let lines: Vec<&str> = result.output().lines().collect();
                let start = lines.len().saturating_sub(FAILURE_EXCERPT_LINES);
                for line in &lines[start..] {
                    out.push_str(&format!("    {}\n", line));
                }
            }
        }
    }

    out.push_str(&format!("\n{}\n\n", "Test Summary".bold().underline()));
    if suite.passed_count() > 0 {
        out.push_str(&format!("  {} passed\n", suite.passed_count().to_string().green()));
    }
    if suite.failed_count() > 0 {
        out.push_str(&format!("  {} failed\n", suite.failed_count().to_string().red()));
    }
    out.push_str(&format!(
        "\nTotal: {} tests, {} in tests, {} wall clock\n",
        suite.len(),
        format_seconds(suite.total_duration()),
        format_seconds(wall.as_secs_f64())
    ));

    if suite.is_success() {
        out.push_str(&format!("\n{}\n", "All tests passed!".green().bold()));
    } else {
        out.push_str(&format!("\n{}\n", "Some tests failed.".red().bold()));
    }
    out
}

fn format_seconds(seconds: f64) -> String {
    if seconds >= 60.0 {
        let whole = seconds as u64;
        format!("{}m {}s", whole / 60, whole % 60)
    } else if seconds >= 1.0 {
        format!("{:.2}s", seconds)
    } else {
        format!("{:.0}ms", seconds * 1000.0)
    }
}
