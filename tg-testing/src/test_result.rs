//! Per-unit results and the suite they are folded into

use std::path::{Path, PathBuf};
use serde::Serialize;
use crate::test_discovery::TestUnit;

/// Outcome of one execution attempt of a unit.
///
/// Built once by the runner and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestResult {
    name: String,
    path: PathBuf,
    passed: bool,
    /// Seconds, never negative
    duration: f64,
    output: String,
    failure: Option<String>,
    exit_code: Option<i32>,
    timed_out: bool,
}

impl TestResult {
    /// A unit whose process exited with status 0.
    pub fn pass(unit: &TestUnit, duration: f64, output: String) -> Self {
        Self {
            name: unit.name.clone(),
            path: unit.path.clone(),
            passed: true,
            duration: sanitize_duration(duration),
            output,
            failure: None,
            exit_code: Some(0),
            timed_out: false,
        }
    }

    /// A unit that did not pass. `failure` is the one-line reason shown
    /// in reports; the captured `output` carries the details.
    pub fn fail(
        unit: &TestUnit,
        duration: f64,
        output: String,
        failure: impl Into<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self {
            name: unit.name.clone(),
            path: unit.path.clone(),
            passed: false,
            duration: sanitize_duration(duration),
            output,
            failure: Some(failure.into()),
            exit_code,
            timed_out: false,
        }
    }

    /// A unit that was killed after exceeding its timeout.
    pub fn timeout(unit: &TestUnit, duration: f64, output: String, failure: impl Into<String>) -> Self {
        Self {
            timed_out: true,
            ..Self::fail(unit, duration, output, failure, None)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn passed(&self) -> bool {
        self.passed
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn timed_out(&self) -> bool {
        self.timed_out
    }
}

fn sanitize_duration(duration: f64) -> f64 {
    if duration.is_finite() && duration > 0.0 {
        duration
    } else {
        0.0
    }
}

/// Aggregated results of running a set of units.
///
/// Results are kept in the order they were handed to [`aggregate`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestSuite {
    name: String,
    results: Vec<TestResult>,
    total_duration: f64,
}

impl TestSuite {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn results(&self) -> &[TestResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Sum of child durations in seconds (not wall-clock time).
    pub fn total_duration(&self) -> f64 {
        self.total_duration
    }

    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.passed()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.results.len() - self.passed_count()
    }

    /// A suite passes iff every result passed. An empty suite passes.
    pub fn is_success(&self) -> bool {
        self.results.iter().all(TestResult::passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &TestResult> {
        self.results.iter().filter(|r| !r.passed())
    }
}

/// Fold individual results into a suite.
///
/// No retry or weighting happens here: a failed unit stays failed.
pub fn aggregate(name: impl Into<String>, results: Vec<TestResult>) -> TestSuite {
    let total_duration = results.iter().map(TestResult::duration).sum();
    TestSuite {
        name: name.into(),
        results,
        total_duration,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use std::time::UNIX_EPOCH;

    fn unit(name: &str) -> TestUnit {
        TestUnit::new(
            format!("tests/{}.c", name),
            Path::new("tests"),
            DateTime::<Utc>::from(UNIX_EPOCH),
        )
    }

    #[test]
    fn test_aggregate_counts_and_duration() {
        let results = vec![
            TestResult::pass(&unit("test_a"), 0.5, "ok\n".to_string()),
            TestResult::fail(&unit("test_b"), 0.3, "boom\n".to_string(), "exit code 1", Some(1)),
        ];
        let suite = aggregate("suite", results);

        assert_eq!(suite.len(), 2);
        assert_eq!(suite.passed_count(), 1);
        assert_eq!(suite.failed_count(), 1);
        assert!(!suite.is_success());
        assert!((suite.total_duration() - 0.8).abs() < 1e-9);
        assert_eq!(suite.failures().next().unwrap().name(), "test_b");
    }

    #[test]
    fn test_aggregate_preserves_length_and_sum() {
        for n in [0usize, 1, 7] {
            let results: Vec<_> = (0..n)
                .map(|i| TestResult::pass(&unit(&format!("test_{}", i)), i as f64 * 0.25, String::new()))
                .collect();
            let expected: f64 = results.iter().map(TestResult::duration).sum();
            let suite = aggregate("s", results);
            assert_eq!(suite.len(), n);
            assert!((suite.total_duration() - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn test_empty_suite_passes() {
        let suite = aggregate("empty", Vec::new());
        assert!(suite.is_success());
        assert!(suite.is_empty());
        assert_eq!(suite.total_duration(), 0.0);
    }

    #[test]
    fn test_duration_is_never_negative() {
        assert_eq!(TestResult::pass(&unit("test_a"), -1.0, String::new()).duration(), 0.0);
        assert_eq!(TestResult::pass(&unit("test_a"), f64::NAN, String::new()).duration(), 0.0);
    }

    #[test]
    fn test_timeout_result_is_failure() {
        let result = TestResult::timeout(&unit("test_hang"), 2.0, String::new(), "timed out");
        assert!(!result.passed());
        assert!(result.timed_out());
        assert_eq!(result.exit_code(), None);
        assert_eq!(result.failure(), Some("timed out"));
    }
}
