//! Guard control loop
//!
//! One task owns the [`WatchState`]. Each iteration waits on whichever of
//! shutdown, run completion, the next file event, the debounce deadline or
//! the cooldown deadline applies to the current phase, then applies the
//! transition. The pipeline itself runs on a spawned task so file events
//! keep being consumed while tests execute.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use tg_testing::{StopSignal, TestPipeline};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinError;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, trace, warn};

use crate::state::{RunHandle, WatchPhase, WatchState};
use crate::trigger::TriggerPolicy;
use crate::watcher::FileEvent;

/// Why a run was started
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    /// Changed paths collected since the previous run, sorted and deduplicated
    pub paths: Vec<PathBuf>,
    /// True for the run requested at startup
    pub initial: bool,
}

/// Something the guard can run. Returns whether every test passed.
#[async_trait]
pub trait RunPipeline: Send + Sync + 'static {
    async fn run(&self, trigger: Trigger, stop: StopSignal) -> anyhow::Result<bool>;
}

#[async_trait]
impl RunPipeline for TestPipeline {
    async fn run(&self, _trigger: Trigger, stop: StopSignal) -> anyhow::Result<bool> {
        let summary = self.execute(&stop).await?;
        Ok(summary.is_success())
    }
}

#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Quiet period after the last relevant event before a run starts
    pub debounce: Duration,
    /// Minimum pause between the end of a run and the next one
    pub cooldown: Duration,
    /// Run once immediately, before any change is seen
    pub run_on_start: bool,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(300),
            cooldown: Duration::ZERO,
            run_on_start: false,
        }
    }
}

/// Counters reported when the guard exits
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuardStats {
    pub runs_started: usize,
    pub runs_completed: usize,
    /// Completed runs with failing tests, errors or a panic
    pub runs_failed: usize,
    pub events_seen: usize,
    pub events_ignored: usize,
}

enum Step {
    Event(Option<FileEvent>),
    DebounceElapsed,
    RunFinished(Result<anyhow::Result<bool>, JoinError>),
    CooldownElapsed,
    Shutdown,
}

pub struct Guard<P: RunPipeline> {
    config: GuardConfig,
    policy: TriggerPolicy,
    pipeline: Arc<P>,
    events: UnboundedReceiver<FileEvent>,
    events_open: bool,
    shutdown: StopSignal,
    state: WatchState,
    stats: GuardStats,
}

impl<P: RunPipeline> Guard<P> {
    pub fn new(
        config: GuardConfig,
        policy: TriggerPolicy,
        pipeline: Arc<P>,
        events: UnboundedReceiver<FileEvent>,
        shutdown: StopSignal,
    ) -> Self {
        Self {
            config,
            policy,
            pipeline,
            events,
            events_open: true,
            shutdown,
            state: WatchState::new(),
            stats: GuardStats::default(),
        }
    }

    /// Drive the loop until shutdown is requested, or until the event
    /// source closes and no work is left.
    ///
    /// On shutdown an in-flight run is awaited; it sees the same stop
    /// signal, so it finishes its current test and starts no more.
    pub async fn run(mut self) -> GuardStats {
        if self.config.run_on_start {
            self.start_run(true);
        }

        loop {
            if self.state.phase() == WatchPhase::Idle && !self.events_open {
                debug!("Event source closed and nothing pending; leaving guard loop");
                break;
            }

            match self.next_step().await {
                Step::Event(Some(event)) => self.on_event(event),
                Step::Event(None) => {
                    debug!("Event source closed");
                    self.events_open = false;
                }
                Step::DebounceElapsed => self.start_run(false),
                Step::RunFinished(result) => {
                    self.record_outcome(result);
                    self.state.on_run_finished(Instant::now(), self.config.cooldown);
                }
                Step::CooldownElapsed => {
                    if self.state.on_cooldown_elapsed(Instant::now()) {
                        debug!("Changes arrived during the last run; scheduling another");
                    }
                }
                Step::Shutdown => {
                    if let Some(handle) = self.state.take_in_flight() {
                        info!("Waiting for the current run to finish");
                        let result = handle.await;
                        self.record_outcome(result);
                    }
                    break;
                }
            }
        }

        info!(
            runs = self.stats.runs_completed,
            failed = self.stats.runs_failed,
            "Guard stopped"
        );
        self.stats
    }

    async fn next_step(&mut self) -> Step {
        let running = self.state.phase() == WatchPhase::Running;
        let debounce_at = self.state.debounce_deadline(self.config.debounce);
        let cooldown_at = self.state.cooldown_deadline();
        let events_open = self.events_open;

        tokio::select! {
            biased;

            _ = self.shutdown.stopped() => Step::Shutdown,
            result = join_in_flight(self.state.in_flight_mut()), if running => Step::RunFinished(result),
            event = self.events.recv(), if events_open => Step::Event(event),
            _ = sleep_until(debounce_at.unwrap_or_else(Instant::now)), if debounce_at.is_some() => {
                Step::DebounceElapsed
            }
            _ = sleep_until(cooldown_at.unwrap_or_else(Instant::now)), if cooldown_at.is_some() => {
                Step::CooldownElapsed
            }
        }
    }

    fn on_event(&mut self, event: FileEvent) {
        self.stats.events_seen += 1;
        if self.policy.is_relevant(&event.path) {
            debug!("Change detected: {}", event.path.display());
            self.state.on_file_event(event.path, Instant::now());
        } else {
            trace!("Ignoring change: {}", event.path.display());
            self.stats.events_ignored += 1;
        }
    }

    fn start_run(&mut self, initial: bool) {
        let trigger = Trigger {
            paths: self.state.take_changed(),
            initial,
        };
        self.stats.runs_started += 1;
        if initial {
            info!("Starting initial run");
        } else {
            info!(changed = trigger.paths.len(), "Starting run");
        }

        let pipeline = Arc::clone(&self.pipeline);
        let stop = self.shutdown.clone();
        let handle = tokio::spawn(async move { pipeline.run(trigger, stop).await });
        self.state.begin_run(handle);
    }

    fn record_outcome(&mut self, result: Result<anyhow::Result<bool>, JoinError>) {
        self.stats.runs_completed += 1;
        match result {
            Ok(Ok(true)) => info!("Run passed"),
            Ok(Ok(false)) => {
                self.stats.runs_failed += 1;
                warn!("Run finished with failures");
            }
            Ok(Err(err)) => {
                self.stats.runs_failed += 1;
                error!("Run aborted: {:#}", err);
            }
            Err(err) => {
                self.stats.runs_failed += 1;
                error!("Run task failed: {}", err);
            }
        }
    }
}

async fn join_in_flight(handle: Option<&mut RunHandle>) -> Result<anyhow::Result<bool>, JoinError> {
    match handle {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}
