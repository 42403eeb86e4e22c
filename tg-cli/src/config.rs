//! Configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tg_guard::{GuardConfig, TriggerPolicy};
use tg_testing::{
    validate_pattern, CommandTemplate, ConfigError, DiscoveryConfig, PipelineConfig, ReportConfig,
    ReportFormat, RunnerConfig,
};

/// Project-local configuration file, looked up in the working directory
pub const PROJECT_CONFIG_FILE: &str = "tg.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TgConfig {
    /// Where and how tests are found
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// How each test is compiled and run
    #[serde(default)]
    pub runner: RunnerSection,

    /// Report files
    #[serde(default)]
    pub report: ReportSection,

    /// Watch mode
    #[serde(default)]
    pub guard: GuardSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerSection {
    /// Command template; `{path}` is replaced with the test file
    #[serde(default = "default_command")]
    pub command: String,

    /// Per-test timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Tests executed concurrently
    #[serde(default = "default_jobs")]
    pub jobs: usize,

    /// Stop after the first failing test
    #[serde(default)]
    pub fail_fast: bool,

    /// Working directory for test commands
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSection {
    /// Directory report files are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Suite name, also the report file stem
    #[serde(default = "default_suite_name")]
    pub suite_name: String,

    /// Report formats to write
    #[serde(default = "default_formats")]
    pub formats: Vec<ReportFormat>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardSection {
    /// Paths whose changes trigger a run
    #[serde(default = "default_watch")]
    pub watch: Vec<PathBuf>,

    /// Only changes to files with these extensions trigger a run; empty accepts any
    #[serde(default)]
    pub extensions: Vec<String>,

    /// Quiet period before a run starts, in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Pause after a run before the next one, in milliseconds
    #[serde(default)]
    pub cooldown_ms: u64,

    /// Run once at startup
    #[serde(default)]
    pub run_on_start: bool,
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            command: default_command(),
            timeout_secs: default_timeout_secs(),
            jobs: default_jobs(),
            fail_fast: false,
            working_dir: None,
        }
    }
}

impl Default for ReportSection {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            suite_name: default_suite_name(),
            formats: default_formats(),
        }
    }
}

impl Default for GuardSection {
    fn default() -> Self {
        Self {
            watch: default_watch(),
            extensions: Vec::new(),
            debounce_ms: default_debounce_ms(),
            cooldown_ms: 0,
            run_on_start: false,
        }
    }
}

/// Values given on the command line. `None` keeps the file value.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub root: Option<PathBuf>,
    pub command: Option<String>,
    pub timeout_secs: Option<u64>,
    pub jobs: Option<usize>,
    pub fail_fast: bool,
    pub output_dir: Option<PathBuf>,
    pub suite_name: Option<String>,
    pub formats: Vec<ReportFormat>,
    pub watch: Vec<PathBuf>,
    pub debounce_ms: Option<u64>,
    pub run_on_start: bool,
}

impl TgConfig {
    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, `./tg.toml` is used, then
    /// the user config directory; if neither exists the defaults apply.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let config_path = match config_path {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Config file not found: {}", path.display());
                }
                path.to_owned()
            }
            None => match Self::default_config_paths().into_iter().find(|p| p.exists()) {
                Some(path) => path,
                None => return Ok(Self::default()),
            },
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: TgConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        tracing::debug!("Loaded configuration from {}", config_path.display());
        Ok(config)
    }

    /// Candidate configuration files, in lookup order
    fn default_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(PROJECT_CONFIG_FILE)];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("tg").join("config.toml"));
        }
        paths
    }

    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(root) = &overrides.root {
            self.discovery.root = root.clone();
        }
        if let Some(command) = &overrides.command {
            self.runner.command = command.clone();
        }
        if let Some(timeout) = overrides.timeout_secs {
            self.runner.timeout_secs = timeout;
        }
        if let Some(jobs) = overrides.jobs {
            self.runner.jobs = jobs;
        }
        if overrides.fail_fast {
            self.runner.fail_fast = true;
        }
        if let Some(output_dir) = &overrides.output_dir {
            self.report.output_dir = output_dir.clone();
        }
        if let Some(suite_name) = &overrides.suite_name {
            self.report.suite_name = suite_name.clone();
        }
        if !overrides.formats.is_empty() {
            self.report.formats = overrides.formats.clone();
        }
        if !overrides.watch.is_empty() {
            self.guard.watch = overrides.watch.clone();
        }
        if let Some(debounce) = overrides.debounce_ms {
            self.guard.debounce_ms = debounce;
        }
        if overrides.run_on_start {
            self.guard.run_on_start = true;
        }
    }

    pub fn runner_config(&self) -> Result<RunnerConfig, ConfigError> {
        let mut config = RunnerConfig::new(CommandTemplate::parse(self.runner.command.clone())?);
        config.timeout = Duration::from_secs(self.runner.timeout_secs);
        config.jobs = self.runner.jobs;
        config.fail_fast = self.runner.fail_fast;
        config.working_dir = self.runner.working_dir.clone();
        config.validate()?;
        Ok(config)
    }

    pub fn report_config(&self) -> ReportConfig {
        ReportConfig {
            output_dir: self.report.output_dir.clone(),
            formats: self.report.formats.clone(),
        }
    }

    /// Everything a single run needs, validated.
    pub fn pipeline_config(&self, pattern: Option<&str>) -> Result<PipelineConfig, ConfigError> {
        if let Some(pattern) = pattern {
            validate_pattern(pattern)?;
        }
        if self.report.formats.is_empty() {
            return Err(ConfigError::invalid("report.formats", "at least one format is required"));
        }
        Ok(PipelineConfig {
            suite_name: self.report.suite_name.clone(),
            discovery: self.discovery.clone(),
            pattern: pattern.filter(|p| !p.is_empty()).map(String::from),
            runner: self.runner_config()?,
            report: self.report_config(),
        })
    }

    pub fn guard_config(&self) -> GuardConfig {
        GuardConfig {
            debounce: Duration::from_millis(self.guard.debounce_ms),
            cooldown: Duration::from_millis(self.guard.cooldown_ms),
            run_on_start: self.guard.run_on_start,
        }
    }

    /// Trigger scope for watch mode. Report output never retriggers.
    pub fn trigger_policy(&self) -> TriggerPolicy {
        TriggerPolicy::new(self.guard.watch.clone())
            .with_extensions(self.guard.extensions.clone())
            .ignore(&self.report.output_dir)
    }
}

// Default value functions
fn default_command() -> String {
    "cc -o {tmpdir}/{stem} {path} && {tmpdir}/{stem}".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_jobs() -> usize {
    1
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("test-reports")
}

fn default_suite_name() -> String {
    "tests".to_string()
}

fn default_formats() -> Vec<ReportFormat> {
    vec![ReportFormat::Junit, ReportFormat::Tap]
}

fn default_watch() -> Vec<PathBuf> {
    vec![PathBuf::from("src"), PathBuf::from("tests")]
}

fn default_debounce_ms() -> u64 {
    300
}
