//! # Worker abstraction.
//!
//! The spawn orchestrator depends only on the [`Worker`] capability set:
//! start, kill, wait, pid, attach a relay and set the state.
//! [`ProcessWorker`] is the `tokio::process` implementation used by
//! `SocketFactory::spawn_worker`.

mod process;
mod state;

use std::process::ExitStatus;

use async_trait::async_trait;

use crate::error::WorkerError;

pub use process::ProcessWorker;
pub use state::WorkerState;

/// Capabilities the spawn orchestrator needs from a worker.
///
/// # Example
/// ```no_run
/// use std::process::ExitStatus;
/// use async_trait::async_trait;
/// use relayvisor::{Worker, WorkerError, WorkerState};
///
/// struct Remote { pid: Option<u32>, state: WorkerState, relay: Option<String> }
///
/// #[async_trait]
/// impl Worker for Remote {
///     type Relay = String;
///     fn pid(&self) -> Option<u32> { self.pid }
///     async fn start(&mut self) -> Result<(), WorkerError> { Ok(()) }
///     async fn kill(&mut self) -> Result<(), WorkerError> { Ok(()) }
///     async fn wait(&mut self) -> Result<ExitStatus, WorkerError> { unimplemented!() }
///     fn attach_relay(&mut self, relay: String) { self.relay = Some(relay); }
///     fn state(&self) -> WorkerState { self.state }
///     fn set_state(&mut self, state: WorkerState) { self.state = state; }
/// }
/// ```
#[async_trait]
pub trait Worker: Send + 'static {
    /// Relay type this worker takes ownership of.
    type Relay: Send + 'static;

    /// OS process identifier; `None` until started.
    fn pid(&self) -> Option<u32>;

    /// Launches the process.
    async fn start(&mut self) -> Result<(), WorkerError>;

    /// Forcefully terminates the process.
    async fn kill(&mut self) -> Result<(), WorkerError>;

    /// Waits for the process to exit and reaps it.
    async fn wait(&mut self) -> Result<ExitStatus, WorkerError>;

    /// Hands the matched relay to the worker (exclusive owner from now on).
    fn attach_relay(&mut self, relay: Self::Relay);

    /// Current lifecycle state.
    fn state(&self) -> WorkerState;

    /// Moves the worker to `state`.
    fn set_state(&mut self, state: WorkerState);
}
