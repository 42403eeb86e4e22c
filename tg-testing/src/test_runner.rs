//! Out-of-process test runner
//!
//! Every unit is executed through a shell command built from a
//! [`CommandTemplate`]. Standard output and standard error are merged into a
//! single text blob, the wall-clock duration is measured around spawn/wait,
//! and a unit that exceeds its timeout is killed and recorded as failed.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, warn};
use crate::error::ConfigError;
use crate::stop::StopSignal;
use crate::test_discovery::TestUnit;
use crate::test_report::TestReporter;
use crate::test_result::TestResult;

/// Marker appended to the captured output of a unit that was killed.
pub const TIMEOUT_MARKER: &str = "[tg] TIMEOUT";

/// How long to keep draining output after the process itself is gone.
const OUTPUT_GRACE: Duration = Duration::from_millis(500);

/// Placeholders understood by [`CommandTemplate`].
const PLACEHOLDERS: &[&str] = &["path", "name", "stem", "dir", "tmpdir"];

/// Per-unit invocation command, e.g. `cc {path} -o {tmpdir}/t && {tmpdir}/t`.
///
/// Placeholders:
/// - `{path}`: the unit's source path
/// - `{name}`: the unit's display name
/// - `{stem}`: file name without extension
/// - `{dir}`: directory containing the unit
/// - `{tmpdir}`: scratch directory owned by the runner, removed afterwards
///
/// Substituted values are shell-quoted. Anything else in braces (such as
/// `${HOME}`) is passed through to the shell untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    template: String,
}

impl CommandTemplate {
    pub fn parse(template: impl Into<String>) -> Result<Self, ConfigError> {
        let template = template.into();
        if template.trim().is_empty() {
            return Err(ConfigError::InvalidCommand {
                template,
                message: "command is empty".to_string(),
            });
        }
        if !template.contains("{path}") {
            return Err(ConfigError::InvalidCommand {
                template,
                message: "command must reference the unit with {path}".to_string(),
            });
        }
        Ok(Self { template })
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Build the concrete command line for one unit.
    pub fn render(&self, unit: &TestUnit, tmpdir: &Path) -> String {
        let mut out = String::with_capacity(self.template.len() + 64);
        let mut rest = self.template.as_str();

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            match after.find('}') {
                Some(close) if PLACEHOLDERS.contains(&&after[..close]) => {
                    out.push_str(&shell_quote(&placeholder_value(&after[..close], unit, tmpdir)));
                    rest = &after[close + 1..];
                }
                _ => {
                    out.push('{');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }
}

impl std::fmt::Display for CommandTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.template)
    }
}

fn placeholder_value(key: &str, unit: &TestUnit, tmpdir: &Path) -> String {
    match key {
        "path" => unit.path.to_string_lossy().into_owned(),
        "name" => unit.name.clone(),
        "stem" => unit
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
        "dir" => unit
            .path
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| ".".to_string()),
        "tmpdir" => tmpdir.to_string_lossy().into_owned(),
        _ => String::new(),
    }
}

#[cfg(unix)]
fn shell_quote(value: &str) -> String {
    let safe = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./+:=,@%".contains(c));
    if safe {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', "'\\''"))
    }
}

/// `cmd /C` quoting. Every value is wrapped so `&`, `|`, `<`, `>` and `^`
/// stay literal; embedded quotes are doubled. `%VAR%` is still expanded by
/// `cmd`, so Windows support is best-effort.
#[cfg(windows)]
fn shell_quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Test runner configuration
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Compile-and-run command for a unit
    pub command: CommandTemplate,

    /// Per-unit timeout
    pub timeout: Duration,

    /// Number of units executed concurrently; 1 runs sequentially
    pub jobs: usize,

    /// Stop starting new units after the first failure
    pub fail_fast: bool,

    /// Working directory for spawned commands
    pub working_dir: Option<PathBuf>,
}

impl RunnerConfig {
    pub fn new(command: CommandTemplate) -> Self {
        Self {
            command,
            timeout: Duration::from_secs(60),
            jobs: 1,
            fail_fast: false,
            working_dir: None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jobs == 0 {
            return Err(ConfigError::invalid("runner.jobs", "must be at least 1"));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::invalid("runner.timeout", "must be greater than zero"));
        }
        Ok(())
    }
}

/// Test runner
pub struct TestRunner {
    config: Arc<RunnerConfig>,
}

impl TestRunner {
    pub fn new(config: RunnerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run a single unit. Never fails: problems become a failed result.
    pub async fn run_unit(&self, unit: &TestUnit) -> TestResult {
        execute_unit(&self.config, unit).await
    }

    /// Run units in order and return one result per executed unit.
    ///
    /// With `jobs > 1` units run concurrently, but the returned results are
    /// always in input order. Units not started because of a stop request or
    /// `fail_fast` produce no result at all.
    pub async fn run_all(
        &self,
        units: &[TestUnit],
        reporter: &dyn TestReporter,
        stop: &StopSignal,
    ) -> Vec<TestResult> {
        if self.config.jobs > 1 && units.len() > 1 {
            self.run_parallel(units, reporter, stop).await
        } else {
            self.run_sequential(units, reporter, stop).await
        }
    }

    async fn run_sequential(
        &self,
        units: &[TestUnit],
        reporter: &dyn TestReporter,
        stop: &StopSignal,
    ) -> Vec<TestResult> {
        let mut results = Vec::with_capacity(units.len());
        let mut saw_failure = false;

        for unit in units {
            if self.should_stop(stop, saw_failure) {
                break;
            }
            reporter.on_test_start(unit);
            let result = execute_unit(&self.config, unit).await;
            saw_failure |= !result.passed();
            reporter.on_test_finish(unit, &result);
            results.push(result);
        }

        results
    }

    async fn run_parallel(
        &self,
        units: &[TestUnit],
        reporter: &dyn TestReporter,
        stop: &StopSignal,
    ) -> Vec<TestResult> {
        let mut set = JoinSet::new();
        let mut collected: Vec<(usize, TestResult)> = Vec::with_capacity(units.len());
        let mut next = 0;
        let mut saw_failure = false;

        loop {
            while set.len() < self.config.jobs
                && next < units.len()
                && !self.should_stop(stop, saw_failure)
            {
                let index = next;
                let unit = units[index].clone();
                let config = Arc::clone(&self.config);
                reporter.on_test_start(&unit);
                set.spawn(async move {
                    let result = execute_unit(&config, &unit).await;
                    (index, result)
                });
                next += 1;
            }

            match set.join_next().await {
                Some(Ok((index, result))) => {
                    saw_failure |= !result.passed();
                    reporter.on_test_finish(&units[index], &result);
                    collected.push((index, result));
                }
                Some(Err(err)) => error!("Test task failed to complete: {}", err),
                None => break,
            }
        }

        // Completion order is nondeterministic; reports must not be.
        collected.sort_by_key(|(index, _)| *index);
        collected.into_iter().map(|(_, result)| result).collect()
    }

    fn should_stop(&self, stop: &StopSignal, saw_failure: bool) -> bool {
        if stop.is_stopped() {
            debug!("Stop requested; not starting further tests");
            return true;
        }
        if self.config.fail_fast && saw_failure {
            debug!("Failure seen with fail-fast enabled; not starting further tests");
            return true;
        }
        false
    }
}

async fn execute_unit(config: &RunnerConfig, unit: &TestUnit) -> TestResult {
    let scratch = match tempfile::Builder::new().prefix("tg-").tempdir() {
        Ok(dir) => dir,
        Err(err) => {
            return TestResult::fail(
                unit,
                0.0,
                String::new(),
                format!("failed to create scratch directory: {}", err),
                None,
            )
        }
    };

    let command_line = config.command.render(unit, scratch.path());
    debug!(unit = %unit.name, command = %command_line, "Spawning test");

    let mut command = shell_command(&command_line);
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);
    if let Some(dir) = &config.working_dir {
        command.current_dir(dir);
    }

    let start = Instant::now();
    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) => {
            warn!("Failed to spawn {}: {}", unit.name, err);
            return TestResult::fail(
                unit,
                start.elapsed().as_secs_f64(),
                String::new(),
                format!("failed to spawn command: {}", err),
                None,
            );
        }
    };

    let pid = child.id();
    let captured = Arc::new(Mutex::new(Vec::new()));
    let reader = spawn_reader(&mut child, Arc::clone(&captured));

    let waited = tokio::time::timeout(config.timeout, child.wait()).await;
    // Reap the whole process group on every path so no helper outlives the unit.
    terminate(&mut child, pid).await;
    let duration = start.elapsed().as_secs_f64();

    if let Some(mut reader) = reader {
        if tokio::time::timeout(OUTPUT_GRACE, &mut reader).await.is_err() {
            reader.abort();
        }
    }
    let mut output =
        String::from_utf8_lossy(&captured.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
            .into_owned();
    drop(scratch);

    match waited {
        Ok(Ok(status)) if status.success() => TestResult::pass(unit, duration, output),
        Ok(Ok(status)) => {
            let failure = describe_status(status);
            debug!(unit = %unit.name, "{}", failure);
            TestResult::fail(unit, duration, output, failure, status.code())
        }
        Ok(Err(err)) => TestResult::fail(
            unit,
            duration,
            output,
            format!("failed waiting for process: {}", err),
            None,
        ),
        Err(_) => {
            warn!("{} exceeded timeout of {:?}; killed", unit.name, config.timeout);
            if !output.is_empty() && !output.ends_with('\n') {
                output.push('\n');
            }
            output.push_str(&format!(
                "{}: exceeded {:.1}s, process killed\n",
                TIMEOUT_MARKER,
                config.timeout.as_secs_f64()
            ));
            let failure = format!("timed out after {:.1}s", config.timeout.as_secs_f64());
            TestResult::timeout(unit, duration, output, failure)
        }
    }
}

#[cfg(unix)]
fn shell_command(command_line: &str) -> Command {
    let mut command = Command::new("sh");
    command.arg("-c").arg(format!("exec 2>&1\n{}", command_line));
    command
}

#[cfg(windows)]
fn shell_command(command_line: &str) -> Command {
    let mut command = Command::new("cmd");
    command.arg("/C").arg(format!("({}) 2>&1", command_line));
    command
}

fn spawn_reader(child: &mut Child, sink: Arc<Mutex<Vec<u8>>>) -> Option<JoinHandle<()>> {
    let mut stdout = child.stdout.take()?;
    Some(tokio::spawn(async move {
        let mut chunk = [0u8; 8192];
        loop {
            match stdout.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let mut captured = sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                    captured.extend_from_slice(&chunk[..n]);
                }
            }
        }
    }))
}

async fn terminate(child: &mut Child, pid: Option<u32>) {
    #[cfg(unix)]
    {
        if let Some(pid) = pid {
            // SAFETY: signalling the process group created with process_group(0).
            unsafe {
                libc::kill(-(pid as i32), libc::SIGKILL);
            }
        }
    }
    #[cfg(not(unix))]
    let _ = pid;
    if let Err(err) = child.kill().await {
        debug!("Kill after exit returned: {}", err);
    }
}

fn describe_status(status: ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("exit code {}", code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("terminated by signal {}", signal);
        }
    }
    "terminated abnormally".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use std::time::UNIX_EPOCH;

    fn unit(path: &str) -> TestUnit {
        TestUnit::new(path, Path::new("tests"), DateTime::<Utc>::from(UNIX_EPOCH))
    }

    #[test]
    fn test_template_requires_path() {
        assert!(CommandTemplate::parse("").is_err());
        assert!(CommandTemplate::parse("make test").is_err());
        assert!(CommandTemplate::parse("cc {path}").is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_template_render() {
        let template =
            CommandTemplate::parse("cc {path} -o {tmpdir}/{stem} && {tmpdir}/{stem} # {name} {dir} ${HOME} {x}")
                .unwrap();
        let rendered = template.render(&unit("tests/net/test_socket.c"), Path::new("/tmp/tg-1"));
        assert_eq!(
            rendered,
            "cc tests/net/test_socket.c -o /tmp/tg-1/test_socket && /tmp/tg-1/test_socket \
             # net/test_socket tests/net ${HOME} {x}"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_template_quotes_values() {
        let template = CommandTemplate::parse("run {path}").unwrap();
        let rendered = template.render(&unit("tests/it's here.c"), Path::new("/tmp"));
        assert_eq!(rendered, "run 'tests/it'\\''s here.c'");
    }

    #[cfg(windows)]
    #[test]
    fn test_template_quotes_values() {
        assert_eq!(shell_quote("a&b|c"), "\"a&b|c\"");
        assert_eq!(shell_quote("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(shell_quote(""), "\"\"");
    }

    #[test]
    fn test_runner_config_validation() {
        let command = CommandTemplate::parse("sh {path}").unwrap();
        let mut config = RunnerConfig::new(command);
        assert!(config.validate().is_ok());

        config.jobs = 0;
        assert!(TestRunner::new(config.clone()).is_err());

        config.jobs = 2;
        config.timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_describe_status() {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            assert_eq!(describe_status(ExitStatus::from_raw(3 << 8)), "exit code 3");
            assert_eq!(describe_status(ExitStatus::from_raw(9)), "terminated by signal 9");
        }
    }
}
