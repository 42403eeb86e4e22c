//! Discovery -> Filter -> Runner -> Aggregator -> Reporters
//!
//! One invocation of [`TestPipeline::execute`] is one complete test run.

use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use crate::error::ConfigError;
use crate::report_writer::{write_reports, ReportConfig, ReportOutcome};
use crate::stop::StopSignal;
use crate::test_discovery::{DiscoveryConfig, DiscoveryError, DiscoveryWarning, TestDiscovery};
use crate::test_filter::{filter_units, validate_pattern};
use crate::test_report::TestReporter;
use crate::test_result::{aggregate, TestSuite};
use crate::test_runner::{RunnerConfig, TestRunner};

/// Everything one pipeline run needs, passed in explicitly
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub suite_name: String,
    pub discovery: DiscoveryConfig,
    pub pattern: Option<String>,
    pub runner: RunnerConfig,
    pub report: ReportConfig,
}

/// Errors that prevent producing any report
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}

/// Result of one complete run
#[derive(Debug)]
pub struct RunSummary {
    pub suite: TestSuite,
    pub reports: Vec<ReportOutcome>,
    pub warnings: Vec<DiscoveryWarning>,
    /// Units that matched but were never started (stop request or fail-fast)
    pub not_started: usize,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.suite.is_success()
    }
}

/// The full test pipeline
pub struct TestPipeline {
    config: PipelineConfig,
    discovery: TestDiscovery,
    runner: TestRunner,
    reporter: Arc<dyn TestReporter>,
}

impl TestPipeline {
    /// Validate the configuration and build the pipeline.
    pub fn new(config: PipelineConfig, reporter: Arc<dyn TestReporter>) -> Result<Self, PipelineError> {
        if let Some(pattern) = &config.pattern {
            validate_pattern(pattern)?;
        }
        if config.suite_name.trim().is_empty() {
            return Err(ConfigError::invalid("report.suite_name", "must not be empty").into());
        }
        let runner = TestRunner::new(config.runner.clone())?;
        let discovery = TestDiscovery::new(config.discovery.clone());

        Ok(Self {
            config,
            discovery,
            runner,
            reporter,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Confirm the discovery root can be scanned without running anything.
    pub fn check(&self) -> Result<(), PipelineError> {
        self.discovery.discover()?;
        Ok(())
    }

    /// Run the pipeline once.
    ///
    /// Unit failures never make this return an error; only problems that
    /// prevent producing a report do.
    pub async fn execute(&self, stop: &StopSignal) -> Result<RunSummary, PipelineError> {
        let wall_start = Instant::now();

        let discovered = self.discovery.discover()?;
        let units = filter_units(&discovered.units, self.config.pattern.as_deref());
        info!(
            discovered = discovered.units.len(),
            selected = units.len(),
            "Discovered tests in {}",
            self.config.discovery.root.display()
        );

        self.reporter.on_run_start(&self.config.suite_name, units.len());
        let results = self.runner.run_all(&units, self.reporter.as_ref(), stop).await;
        let not_started = units.len() - results.len();
        if not_started > 0 {
            warn!("{} tests were not started", not_started);
        }

        let suite = aggregate(self.config.suite_name.clone(), results);
        let reports = write_reports(&suite, &self.config.report);
        self.reporter.on_suite_finish(&suite, wall_start.elapsed());

        info!(
            passed = suite.passed_count(),
            failed = suite.failed_count(),
            "Run finished in {:.2}s",
            wall_start.elapsed().as_secs_f64()
        );

        Ok(RunSummary {
            suite,
            reports,
            warnings: discovered.warnings,
            not_started,
        })
    }
}
