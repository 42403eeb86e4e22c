//! Continuous test runs driven by file-system changes
//!
//! A background watcher feeds file events into a queue; the [`Guard`]
//! control loop drains it, debounces bursts of edits and drives the test
//! pipeline through the states in [`WatchPhase`].

pub mod guard;
pub mod state;
pub mod trigger;
pub mod watcher;

pub use guard::{Guard, GuardConfig, GuardStats, RunPipeline, Trigger};
pub use state::{WatchPhase, WatchState};
pub use trigger::TriggerPolicy;
pub use watcher::{FileEvent, FsWatcher, GuardError};
