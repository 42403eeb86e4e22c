//! Watch-loop lifecycle
//!
//! ```text
//! Idle --event--> Debouncing --quiet for debounce--> Running
//!  ^                  |  ^ event resets timer           |
//!  |                  +--+                        run completes
//!  |                                                     v
//!  +----------- no pending change --------------- CooldownAfterRun
//!                                  pending change --> Debouncing
//! ```
//!
//! Events that arrive while `Running` or during the cooldown collapse into a
//! single pending flag, so a trailing change is never dropped and at most one
//! extra run is queued.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Outcome of one pipeline run as reported by its task
pub type RunHandle = JoinHandle<anyhow::Result<bool>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchPhase {
    Idle,
    Debouncing,
    Running,
    CooldownAfterRun,
}

/// Mutable state of the guard loop. Owned by the loop alone.
#[derive(Debug)]
pub struct WatchState {
    phase: WatchPhase,
    last_trigger: Option<Instant>,
    cooldown_until: Option<Instant>,
    pending_rerun: bool,
    changed: BTreeSet<PathBuf>,
    in_flight: Option<RunHandle>,
}

impl Default for WatchState {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchState {
    pub fn new() -> Self {
        Self {
            phase: WatchPhase::Idle,
            last_trigger: None,
            cooldown_until: None,
            pending_rerun: false,
            changed: BTreeSet::new(),
            in_flight: None,
        }
    }

    pub fn phase(&self) -> WatchPhase {
        self.phase
    }

    pub fn last_trigger(&self) -> Option<Instant> {
        self.last_trigger
    }

    pub fn pending_rerun(&self) -> bool {
        self.pending_rerun
    }

    /// Changed paths collected since the last run started.
    pub fn changed(&self) -> impl Iterator<Item = &PathBuf> {
        self.changed.iter()
    }

    /// Record a relevant file change.
    pub fn on_file_event(&mut self, path: PathBuf, now: Instant) {
        self.changed.insert(path);
        match self.phase {
            WatchPhase::Idle => {
                self.phase = WatchPhase::Debouncing;
                self.last_trigger = Some(now);
            }
            WatchPhase::Debouncing => self.last_trigger = Some(now),
            WatchPhase::Running | WatchPhase::CooldownAfterRun => self.pending_rerun = true,
        }
    }

    /// When the debounce window closes, if currently debouncing.
    pub fn debounce_deadline(&self, debounce: Duration) -> Option<Instant> {
        match (self.phase, self.last_trigger) {
            (WatchPhase::Debouncing, Some(at)) => Some(at + debounce),
            _ => None,
        }
    }

    pub fn cooldown_deadline(&self) -> Option<Instant> {
        match self.phase {
            WatchPhase::CooldownAfterRun => self.cooldown_until,
            _ => None,
        }
    }

    /// Hand out the paths that triggered the upcoming run.
    pub fn take_changed(&mut self) -> Vec<PathBuf> {
        std::mem::take(&mut self.changed).into_iter().collect()
    }

    pub fn begin_run(&mut self, handle: RunHandle) {
        self.phase = WatchPhase::Running;
        self.pending_rerun = false;
        self.in_flight = Some(handle);
    }

    pub fn in_flight_mut(&mut self) -> Option<&mut RunHandle> {
        self.in_flight.as_mut()
    }

    pub fn take_in_flight(&mut self) -> Option<RunHandle> {
        self.in_flight.take()
    }

    pub fn on_run_finished(&mut self, now: Instant, cooldown: Duration) {
        self.in_flight = None;
        self.phase = WatchPhase::CooldownAfterRun;
        self.cooldown_until = Some(now + cooldown);
    }

    /// Leave the cooldown. Returns true if a pending change starts a new
    /// debounce window.
    pub fn on_cooldown_elapsed(&mut self, now: Instant) -> bool {
        self.cooldown_until = None;
        if self.pending_rerun {
            self.pending_rerun = false;
            self.phase = WatchPhase::Debouncing;
            self.last_trigger = Some(now);
            true
        } else {
            self.phase = WatchPhase::Idle;
            self.last_trigger = None;
            false
        }
    }
}
