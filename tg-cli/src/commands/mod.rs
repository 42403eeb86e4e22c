//! Command implementations for tg

pub mod guard;
pub mod list;
pub mod run;

// Re-export command functions
pub use guard::guard_command;
pub use list::list_command;
pub use run::run_command;
