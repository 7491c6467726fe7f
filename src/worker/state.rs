//! # Worker lifecycle state.
//!
//! ```text
//! Inactive ──start()──► Started ──relay attached──► Ready
//!                          │                          │
//!                          ├──kill()──► Killed ◄──────┤
//!                          └──exit──► Stopped | Errored
//! ```

use std::fmt;

/// Lifecycle state of a worker process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerState {
    /// Created, process not launched yet.
    #[default]
    Inactive,
    /// Process launched, waiting for its relay.
    Started,
    /// Relay attached; usable by the pool.
    Ready,
    /// Process exited successfully.
    Stopped,
    /// Process was killed.
    Killed,
    /// Process exited with a failure status.
    Errored,
}

impl WorkerState {
    /// Short stable name for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Inactive => "inactive",
            WorkerState::Started => "started",
            WorkerState::Ready => "ready",
            WorkerState::Stopped => "stopped",
            WorkerState::Killed => "killed",
            WorkerState::Errored => "errored",
        }
    }

    /// True once the process has terminated for any reason.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkerState::Stopped | WorkerState::Killed | WorkerState::Errored
        )
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
