//! Machine-readable report generators
//!
//! Every renderer is a pure function of the suite: rendering the same suite
//! twice yields byte-identical output, so reports can be diffed in CI.
//! Nothing time- or host-dependent is written.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use crate::test_result::TestSuite;

/// Supported report formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Junit,
    Tap,
    Json,
}

impl ReportFormat {
    /// File name for a suite rendered in this format.
    pub fn file_name(self, suite_name: &str) -> String {
        match self {
            ReportFormat::Junit => format!("{}_junit.xml", suite_name),
            ReportFormat::Tap => format!("{}.tap", suite_name),
            ReportFormat::Json => format!("{}.json", suite_name),
        }
    }

    pub fn render(self, suite: &TestSuite) -> Result<String, ReportError> {
        match self {
            ReportFormat::Junit => Ok(render_junit(suite)),
            ReportFormat::Tap => Ok(render_tap(suite)),
            ReportFormat::Json => render_json(suite),
        }
    }
}

impl std::fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ReportFormat::Junit => "junit",
            ReportFormat::Tap => "tap",
            ReportFormat::Json => "json",
        })
    }
}

impl std::str::FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "junit" | "xml" => Ok(ReportFormat::Junit),
            "tap" => Ok(ReportFormat::Tap),
            "json" => Ok(ReportFormat::Json),
            other => Err(format!("unknown report format '{}'", other)),
        }
    }
}

/// Report output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Directory the report files are written to
    pub output_dir: PathBuf,

    /// Formats to write
    pub formats: Vec<ReportFormat>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("test-reports"),
            formats: vec![ReportFormat::Junit, ReportFormat::Tap],
        }
    }
}

/// Report errors. Each one affects only the report it was raised for.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("I/O error for {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result of writing one report
#[derive(Debug)]
pub struct ReportOutcome {
    pub format: ReportFormat,
    pub path: PathBuf,
    pub result: Result<(), ReportError>,
}

impl ReportOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Write every configured report.
///
/// A failure writing one report is logged and returned; the remaining
/// formats are still attempted.
pub fn write_reports(suite: &TestSuite, config: &ReportConfig) -> Vec<ReportOutcome> {
    let dir_result = fs::create_dir_all(&config.output_dir);

    config
        .formats
        .iter()
        .map(|&format| {
            let path = config.output_dir.join(format.file_name(suite.name()));
            let result = match &dir_result {
                Err(err) => Err(ReportError::Io {
                    path: config.output_dir.clone(),
                    source: std::io::Error::new(err.kind(), err.to_string()),
                }),
                Ok(()) => write_one(suite, format, &path),
            };
            match &result {
                Ok(()) => info!("Wrote {} report to {}", format, path.display()),
                Err(err) => warn!("Failed to write {} report: {}", format, err),
            }
            ReportOutcome { format, path, result }
        })
        .collect()
}

fn write_one(suite: &TestSuite, format: ReportFormat, path: &Path) -> Result<(), ReportError> {
    let content = format.render(suite)?;
    fs::write(path, content).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Render a suite as a JUnit-XML document.
pub fn render_junit(suite: &TestSuite) -> String {
    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    let _ = writeln!(
        xml,
        "<testsuite name=\"{}\" tests=\"{}\" failures=\"{}\" errors=\"0\" skipped=\"0\" time=\"{:.3}\">",
        escape_xml(suite.name()),
        suite.len(),
        suite.failed_count(),
        suite.total_duration(),
    );

    for result in suite.results() {
        let _ = write!(
            xml,
            "  <testcase name=\"{}\" classname=\"{}\" file=\"{}\" time=\"{:.3}\"",
            escape_xml(result.name()),
            escape_xml(suite.name()),
            escape_xml(&result.path().to_string_lossy()),
            result.duration(),
        );

        if result.passed() {
            xml.push_str("/>\n");
            continue;
        }

        xml.push_str(">\n");
        let _ = writeln!(
            xml,
            "    <failure message=\"{}\" type=\"{}\">{}</failure>",
            escape_xml(result.failure().unwrap_or("failed")),
            if result.timed_out() { "timeout" } else { "failure" },
            escape_xml(result.output()),
        );
        xml.push_str("  </testcase>\n");
    }

    xml.push_str("</testsuite>\n");
    xml
}

/// Render a suite in TAP version 13 format.
pub fn render_tap(suite: &TestSuite) -> String {
    let mut tap = String::new();
    tap.push_str("TAP version 13\n");
    let _ = writeln!(tap, "1..{}", suite.len());

    for (index, result) in suite.results().iter().enumerate() {
        let status = if result.passed() { "ok" } else { "not ok" };
        let _ = writeln!(tap, "{} {} {}", status, index + 1, tap_description(result.name()));
    }

    tap
}

#[derive(Serialize)]
struct JsonReport<'a> {
    name: &'a str,
    success: bool,
    total: usize,
    passed: usize,
    failed: usize,
    total_duration: f64,
    results: Vec<JsonResult<'a>>,
}

#[derive(Serialize)]
struct JsonResult<'a> {
    name: &'a str,
    path: String,
    status: &'static str,
    duration: f64,
    exit_code: Option<i32>,
    failure: Option<&'a str>,
    output: &'a str,
}

/// Render a suite as pretty-printed JSON.
pub fn render_json(suite: &TestSuite) -> Result<String, ReportError> {
    let report = JsonReport {
        name: suite.name(),
        success: suite.is_success(),
        total: suite.len(),
        passed: suite.passed_count(),
        failed: suite.failed_count(),
        total_duration: suite.total_duration(),
        results: suite
            .results()
            .iter()
            .map(|r| JsonResult {
                name: r.name(),
                path: r.path().to_string_lossy().into_owned(),
                status: match (r.passed(), r.timed_out()) {
                    (true, _) => "pass",
                    (false, true) => "timeout",
                    (false, false) => "fail",
                },
                duration: r.duration(),
                exit_code: r.exit_code(),
                failure: r.failure(),
                output: r.output(),
            })
            .collect(),
    };

    let mut json = serde_json::to_string_pretty(&report)?;
    json.push('\n');
    Ok(json)
}

/// Escape XML-reserved characters and drop characters XML 1.0 cannot carry.
fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\t' | '\n' | '\r' => out.push(c),
            c if (c as u32) < 0x20 || c == '\u{FFFE}' || c == '\u{FFFF}' => out.push('\u{FFFD}'),
            c => out.push(c),
        }
    }
    out
}

/// TAP descriptions end at a newline and `#` starts a directive.
fn tap_description(name: &str) -> String {
    name.replace(['\n', '\r'], " ").replace('#', "\\#")
}
