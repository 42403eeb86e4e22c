//! tg - out-of-process test orchestrator
//!
//! Discovers test programs by naming convention, runs each one through a
//! configurable compile-and-run command, and writes JUnit-XML and TAP
//! reports. `tg guard` re-runs the suite whenever watched files change.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use tg_testing::{ReportFormat, StopHandle};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod utils;

use commands::*;
use config::{Overrides, TgConfig};

/// Every test passed (or a watch session ended cleanly)
const EXIT_SUCCESS: i32 = 0;
/// At least one test failed
const EXIT_FAILURE: i32 = 1;
/// Configuration-level fatal error; no report was produced
const EXIT_FATAL: i32 = 2;
/// Second Ctrl-C
const EXIT_INTERRUPTED: i32 = 130;

/// tg - discover, run and report out-of-process tests
#[derive(Parser)]
#[command(name = "tg")]
#[command(about = "Out-of-process test orchestrator with JUnit-XML and TAP reports")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging and per-test output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path (defaults to ./tg.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the test suite once and write reports
    Run {
        #[command(flatten)]
        run: RunArgs,
    },

    /// List discovered tests in run order
    List {
        /// Only list tests whose path contains this substring
        pattern: Option<String>,
        /// Directory to scan for tests
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Watch for changes and re-run the suite
    Guard {
        #[command(flatten)]
        run: RunArgs,
        /// Paths to watch (repeatable)
        #[arg(short, long)]
        watch: Vec<PathBuf>,
        /// Quiet period before a run starts, in milliseconds
        #[arg(long)]
        debounce_ms: Option<u64>,
        /// Run once immediately at startup
        #[arg(long)]
        run_on_start: bool,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Only run tests whose path contains this substring
    pattern: Option<String>,
    /// Directory to scan for tests
    #[arg(long)]
    root: Option<PathBuf>,
    /// Command template run for each test; must contain {path}
    #[arg(long = "command")]
    test_command: Option<String>,
    /// Per-test timeout in seconds
    #[arg(short, long)]
    timeout: Option<u64>,
    /// Number of tests run concurrently
    #[arg(short, long)]
    jobs: Option<usize>,
    /// Stop starting tests after the first failure
    #[arg(long)]
    fail_fast: bool,
    /// Report output directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
    /// Suite name used in reports and report file names
    #[arg(long)]
    suite_name: Option<String>,
    /// Report formats (junit, tap, json)
    #[arg(short, long, value_delimiter = ',')]
    format: Vec<ReportFormat>,
}

impl RunArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            root: self.root.clone(),
            command: self.test_command.clone(),
            timeout_secs: self.timeout,
            jobs: self.jobs,
            fail_fast: self.fail_fast,
            output_dir: self.output_dir.clone(),
            suite_name: self.suite_name.clone(),
            formats: self.format.clone(),
            ..Overrides::default()
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose) {
        eprintln!("{} {}", "Warning:".yellow().bold(), e);
    }

    let result = execute(cli).await;
    match &result {
        Ok(true) => info!("Command completed successfully"),
        Ok(false) => {}
        Err(e) => {
            error!("Command failed: {:#}", e);
            utils::print_error(&format!("{:#}", e));
        }
    }
    std::process::exit(exit_code(&result));
}

/// Process exit code for a command outcome
fn exit_code(result: &Result<bool>) -> i32 {
    match result {
        Ok(true) => EXIT_SUCCESS,
        Ok(false) => EXIT_FAILURE,
        Err(_) => EXIT_FATAL,
    }
}

/// Run the selected command. `Ok(false)` means tests failed.
async fn execute(cli: Cli) -> Result<bool> {
    let mut config = TgConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run { run } => {
            config.apply(&run.overrides());
            let stop = interrupt_signal();
            run_command(&config, run.pattern.as_deref(), cli.verbose, stop).await
        }
        Commands::List { pattern, root } => {
            config.apply(&Overrides {
                root,
                ..Overrides::default()
            });
            list_command(&config, pattern.as_deref())
        }
        Commands::Guard {
            run,
            watch,
            debounce_ms,
            run_on_start,
        } => {
            let mut overrides = run.overrides();
            overrides.watch = watch;
            overrides.debounce_ms = debounce_ms;
            overrides.run_on_start = run_on_start;
            config.apply(&overrides);
            let stop = interrupt_signal();
            guard_command(&config, run.pattern.as_deref(), cli.verbose, stop).await
        }
    }
}

/// First Ctrl-C requests a graceful stop, the second one exits.
fn interrupt_signal() -> tg_testing::StopSignal {
    let (handle, signal) = StopHandle::new();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        eprintln!(
            "{}",
            "Interrupted: finishing the current test (Ctrl-C again to abort)".yellow()
        );
        handle.stop();
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(EXIT_INTERRUPTED);
        }
    });
    signal
}

fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}
