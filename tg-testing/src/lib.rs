//! Test orchestration for compiled-language projects
//!
//! Test programs are discovered on disk, executed as independent processes,
//! folded into a suite and rendered as JUnit-XML, TAP or JSON reports.

pub mod error;
pub mod pipeline;
pub mod report_writer;
pub mod stop;
pub mod test_discovery;
pub mod test_filter;
pub mod test_report;
pub mod test_result;
pub mod test_runner;

pub use error::ConfigError;
pub use pipeline::{PipelineConfig, PipelineError, RunSummary, TestPipeline};
pub use report_writer::{
    render_json, render_junit, render_tap, write_reports, ReportConfig, ReportError, ReportFormat,
    ReportOutcome,
};
pub use stop::{StopHandle, StopSignal};
pub use test_discovery::{
    DiscoveryConfig, DiscoveryError, DiscoveryOutcome, DiscoveryWarning, TestDiscovery, TestUnit,
};
pub use test_filter::{filter_units, validate_pattern};
pub use test_report::{ConsoleReporter, NullReporter, TestReporter};
pub use test_result::{aggregate, TestResult, TestSuite};
pub use test_runner::{CommandTemplate, RunnerConfig, TestRunner, TIMEOUT_MARKER};
