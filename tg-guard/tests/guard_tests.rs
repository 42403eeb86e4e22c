//! Guard loop behaviour against synthetic file events on a paused clock

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use async_trait::async_trait;
use tg_guard::{FileEvent, Guard, GuardConfig, GuardStats, RunPipeline, Trigger, TriggerPolicy};
use tg_testing::{StopHandle, StopSignal};
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};

/// Records every run; each run takes `run_time` of (virtual) time.
struct CountingPipeline {
    runs: AtomicUsize,
    triggers: Mutex<Vec<Trigger>>,
    outcomes: Mutex<VecDeque<anyhow::Result<bool>>>,
    run_time: Duration,
}

impl CountingPipeline {
    fn new(run_time: Duration) -> Arc<Self> {
        Self::with_outcomes(run_time, Vec::new())
    }

    fn with_outcomes(run_time: Duration, outcomes: Vec<anyhow::Result<bool>>) -> Arc<Self> {
        Arc::new(Self {
            runs: AtomicUsize::new(0),
            triggers: Mutex::new(Vec::new()),
            outcomes: Mutex::new(outcomes.into()),
            run_time,
        })
    }

    fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    fn triggers(&self) -> Vec<Trigger> {
        self.triggers.lock().unwrap().clone()
    }
}

#[async_trait]
impl RunPipeline for CountingPipeline {
    async fn run(&self, trigger: Trigger, _stop: StopSignal) -> anyhow::Result<bool> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.triggers.lock().unwrap().push(trigger);
        sleep(self.run_time).await;
        let outcome = self.outcomes.lock().unwrap().pop_front();
        outcome.unwrap_or(Ok(true))
    }
}

struct Harness {
    events: UnboundedSender<FileEvent>,
    stop: StopHandle,
    task: JoinHandle<GuardStats>,
}

impl Harness {
    fn start(config: GuardConfig, pipeline: Arc<CountingPipeline>) -> Self {
        let (tx, rx) = unbounded_channel();
        let (stop, signal) = StopHandle::new();
        let policy = TriggerPolicy::new(vec![PathBuf::from("/project/src"), PathBuf::from("/project/tests")])
            .ignore("/project/tests/reports");
        let guard = Guard::new(config, policy, pipeline, rx, signal);
        Self {
            events: tx,
            stop,
            task: tokio::spawn(guard.run()),
        }
    }

    fn touch(&self, path: &str) {
        self.events.send(FileEvent::new(path)).unwrap();
    }

    /// Close the event source and wait for the loop to drain.
    async fn finish(self) -> GuardStats {
        drop(self.events);
        self.task.await.unwrap()
    }
}

fn config(debounce_ms: u64) -> GuardConfig {
    GuardConfig {
        debounce: Duration::from_millis(debounce_ms),
        ..GuardConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn burst_of_events_triggers_a_single_run() {
    let pipeline = CountingPipeline::new(Duration::from_millis(100));
    let harness = Harness::start(config(200), pipeline.clone());

    for i in 0..5 {
        harness.touch(&format!("/project/src/file_{}.c", i));
        sleep(Duration::from_millis(50)).await;
    }
    let stats = harness.finish().await;

    assert_eq!(pipeline.runs(), 1);
    assert_eq!(stats.runs_started, 1);
    assert_eq!(stats.runs_completed, 1);
    assert_eq!(stats.events_seen, 5);
    assert_eq!(pipeline.triggers()[0].paths.len(), 5);
    assert!(!pipeline.triggers()[0].initial);
}

#[tokio::test(start_paused = true)]
async fn changes_during_a_run_cause_exactly_one_more_run() {
    let pipeline = CountingPipeline::new(Duration::from_secs(1));
    let harness = Harness::start(config(200), pipeline.clone());

    harness.touch("/project/src/lib.c");
    sleep(Duration::from_millis(300)).await;
    assert_eq!(pipeline.runs(), 1);

    harness.touch("/project/src/a.c");
    sleep(Duration::from_millis(100)).await;
    harness.touch("/project/tests/test_a.c");
    sleep(Duration::from_millis(100)).await;
    harness.touch("/project/src/a.c");
    let stats = harness.finish().await;

    assert_eq!(pipeline.runs(), 2);
    assert_eq!(stats.runs_completed, 2);
    assert_eq!(
        pipeline.triggers()[1].paths,
        vec![PathBuf::from("/project/src/a.c"), PathBuf::from("/project/tests/test_a.c")]
    );
}

#[tokio::test(start_paused = true)]
async fn separate_bursts_trigger_separate_runs() {
    let pipeline = CountingPipeline::new(Duration::from_millis(100));
    let harness = Harness::start(config(200), pipeline.clone());

    harness.touch("/project/src/a.c");
    sleep(Duration::from_secs(1)).await;
    assert_eq!(pipeline.runs(), 1);

    harness.touch("/project/src/b.c");
    sleep(Duration::from_secs(1)).await;
    let stats = harness.finish().await;

    assert_eq!(pipeline.runs(), 2);
    assert_eq!(stats.runs_failed, 0);
}

#[tokio::test(start_paused = true)]
async fn irrelevant_changes_are_ignored() {
    let pipeline = CountingPipeline::new(Duration::from_millis(100));
    let harness = Harness::start(config(200), pipeline.clone());

    harness.touch("/elsewhere/main.c");
    harness.touch("/project/src/.main.c.swp");
    harness.touch("/project/tests/reports/tests_junit.xml");
    sleep(Duration::from_secs(1)).await;
    let stats = harness.finish().await;

    assert_eq!(pipeline.runs(), 0);
    assert_eq!(stats.events_seen, 3);
    assert_eq!(stats.events_ignored, 3);
}

#[tokio::test(start_paused = true)]
async fn cooldown_delays_the_follow_up_run() {
    let pipeline = CountingPipeline::new(Duration::from_millis(100));
    let mut guard_config = config(100);
    guard_config.cooldown = Duration::from_secs(2);
    let harness = Harness::start(guard_config, pipeline.clone());

    let start = Instant::now();
    harness.touch("/project/src/a.c");
    sleep(Duration::from_millis(250)).await;
    // First run has finished; this change lands in the cooldown.
    harness.touch("/project/src/b.c");
    sleep(Duration::from_millis(500)).await;
    assert_eq!(pipeline.runs(), 1);

    let stats = harness.finish().await;
    assert_eq!(stats.runs_completed, 2);
    // debounce + run + cooldown + debounce + run
    assert!(start.elapsed() >= Duration::from_millis(2400));
}

#[tokio::test(start_paused = true)]
async fn failed_and_aborted_runs_are_counted_and_the_loop_continues() {
    let pipeline = CountingPipeline::with_outcomes(
        Duration::from_millis(50),
        vec![Err(anyhow::anyhow!("discovery root vanished")), Ok(false)],
    );
    let harness = Harness::start(config(100), pipeline.clone());

    harness.touch("/project/src/a.c");
    sleep(Duration::from_secs(1)).await;
    harness.touch("/project/src/a.c");
    sleep(Duration::from_secs(1)).await;
    harness.touch("/project/src/a.c");
    let stats = harness.finish().await;

    assert_eq!(stats.runs_completed, 3);
    assert_eq!(stats.runs_failed, 2);
}

#[tokio::test(start_paused = true)]
async fn shutdown_while_idle_returns_promptly() {
    let pipeline = CountingPipeline::new(Duration::from_millis(100));
    let harness = Harness::start(config(200), pipeline.clone());

    sleep(Duration::from_millis(50)).await;
    harness.stop.stop();
    let stats = harness.task.await.unwrap();

    assert_eq!(stats, GuardStats::default());
    assert_eq!(pipeline.runs(), 0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_during_a_run_waits_for_it() {
    let pipeline = CountingPipeline::new(Duration::from_secs(1));
    let harness = Harness::start(config(200), pipeline.clone());

    let start = Instant::now();
    harness.touch("/project/src/a.c");
    sleep(Duration::from_millis(500)).await;
    harness.stop.stop();
    // Pending changes are not run after a shutdown request.
    harness.touch("/project/src/b.c");
    let stats = harness.task.await.unwrap();

    assert_eq!(stats.runs_started, 1);
    assert_eq!(stats.runs_completed, 1);
    assert_eq!(pipeline.runs(), 1);
    assert!(start.elapsed() >= Duration::from_millis(1200));
}

#[tokio::test(start_paused = true)]
async fn run_on_start_runs_once_without_changes() {
    let pipeline = CountingPipeline::new(Duration::from_millis(100));
    let mut guard_config = config(200);
    guard_config.run_on_start = true;
    let harness = Harness::start(guard_config, pipeline.clone());

    let stats = harness.finish().await;
    assert_eq!(stats.runs_completed, 1);
    let triggers = pipeline.triggers();
    assert_eq!(triggers.len(), 1);
    assert!(triggers[0].initial);
    assert!(triggers[0].paths.is_empty());
}

#[cfg(unix)]
mod with_test_pipeline {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use tg_testing::{
        CommandTemplate, DiscoveryConfig, NullReporter, PipelineConfig, ReportConfig, ReportFormat,
        RunnerConfig, TestPipeline,
    };

    #[tokio::test]
    async fn guard_drives_the_real_pipeline() {
        let temp_dir = TempDir::new().unwrap();
        let tests = temp_dir.path().join("tests");
        fs::create_dir_all(&tests).unwrap();
        fs::write(tests.join("test_ok.sh"), "exit 0\n").unwrap();
        fs::write(tests.join("test_bad.sh"), "exit 1\n").unwrap();
        let reports = temp_dir.path().join("reports");

        let pipeline = TestPipeline::new(
            PipelineConfig {
                suite_name: "guarded".to_string(),
                discovery: DiscoveryConfig {
                    root: tests.clone(),
                    ..DiscoveryConfig::default()
                },
                pattern: None,
                runner: RunnerConfig::new(CommandTemplate::parse("sh {path}").unwrap()),
                report: ReportConfig {
                    output_dir: reports.clone(),
                    formats: vec![ReportFormat::Tap],
                },
            },
            Arc::new(NullReporter),
        )
        .unwrap();

        let (tx, rx) = unbounded_channel::<FileEvent>();
        drop(tx);
        let guard = Guard::new(
            GuardConfig {
                run_on_start: true,
                ..GuardConfig::default()
            },
            TriggerPolicy::new(vec![tests]),
            Arc::new(pipeline),
            rx,
            StopSignal::never(),
        );

        let stats = guard.run().await;
        assert_eq!(stats.runs_completed, 1);
        assert_eq!(stats.runs_failed, 1);
        assert!(reports.join("guarded.tap").exists());
    }
}
