//! Error types used by the relayvisor factory and its workers.
//!
//! This module defines three error enums:
//!
//! - [`FactoryError`]: terminal errors of the accept loop, reported once on the
//!   factory error channel.
//! - [`SpawnError`]: errors returned to a caller of `spawn_*`.
//! - [`WorkerError`]: errors raised by a [`Worker`](crate::Worker) collaborator.
//!
//! All of them provide `as_label` for logs/metrics.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// # Terminal errors of the accept loop.
///
/// The accept loop never retries past one of these; the factory owner decides
/// whether to build a new factory.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum FactoryError {
    /// The listening socket failed to accept a connection.
    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),

    /// A connection did not yield a process identifier.
    #[error("handshake failed: {reason}")]
    Handshake {
        /// Why the handshake could not be decoded.
        reason: String,
    },

    /// The factory was closed.
    #[error("listener closed")]
    ListenerClosed,
}

impl FactoryError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use relayvisor::FactoryError;
    ///
    /// assert_eq!(FactoryError::ListenerClosed.as_label(), "factory_listener_closed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            FactoryError::Accept(_) => "factory_accept_failed",
            FactoryError::Handshake { .. } => "factory_handshake_failed",
            FactoryError::ListenerClosed => "factory_listener_closed",
        }
    }

    pub(crate) fn handshake(reason: impl Into<String>) -> Self {
        FactoryError::Handshake {
            reason: reason.into(),
        }
    }
}

/// # Errors raised by worker collaborators.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum WorkerError {
    /// `start` was called on a worker that already owns a process.
    #[error("worker already started")]
    AlreadyStarted,

    /// The operation needs a started process.
    #[error("worker not started")]
    NotStarted,

    /// The process could not be launched.
    #[error("failed to launch process: {0}")]
    Launch(#[source] io::Error),

    /// Sending the kill signal failed.
    #[error("failed to kill process {pid}: {source}")]
    Kill {
        /// Target process.
        pid: u32,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// Reaping the process failed.
    #[error("failed to wait for process {pid}: {source}")]
    Wait {
        /// Target process.
        pid: u32,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
}

impl WorkerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            WorkerError::AlreadyStarted => "worker_already_started",
            WorkerError::NotStarted => "worker_not_started",
            WorkerError::Launch(_) => "worker_launch_failed",
            WorkerError::Kill { .. } => "worker_kill_failed",
            WorkerError::Wait { .. } => "worker_wait_failed",
        }
    }
}

/// # Errors returned by the spawn entry points.
///
/// Whenever a spawn fails after its process was started, the process has been
/// killed and reaped before the error reaches the caller. Failures of that
/// cleanup are kept next to the original cause in [`SpawnError::Cleanup`].
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SpawnError {
    /// The worker process failed to launch.
    #[error("worker failed to start: {0}")]
    Start(#[source] WorkerError),

    /// The started worker reported no process identifier.
    #[error("worker started without a process id")]
    MissingPid,

    /// No relay connected for `pid` within `timeout`.
    #[error("relay timeout after {timeout:?} (pid {pid})")]
    RelayTimeout {
        /// Process that never connected.
        pid: u32,
        /// Rendezvous timeout that elapsed.
        timeout: Duration,
    },

    /// The process exited before it connected.
    #[error("process {pid} died before connecting")]
    ProcessDied {
        /// Process that disappeared.
        pid: u32,
    },

    /// The caller's cancellation token fired first.
    #[error("spawn canceled")]
    Canceled,

    /// The caller's deadline elapsed first.
    #[error("spawn deadline {deadline:?} exceeded")]
    DeadlineExceeded {
        /// Deadline supplied by the caller.
        deadline: Duration,
    },

    /// The background spawn task panicked.
    #[error("spawn task failed: {0}")]
    Join(String),

    /// The original failure plus the errors hit while killing/reaping the process.
    #[error("{cause}; cleanup failed: {}", join_errors(.cleanup))]
    Cleanup {
        /// Failure that triggered the cleanup.
        cause: Box<SpawnError>,
        /// Kill/wait failures, in order.
        cleanup: Vec<WorkerError>,
    },
}

impl SpawnError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// Aggregated errors are labelled by their original cause.
    ///
    /// # Example
    /// ```
    /// use relayvisor::SpawnError;
    ///
    /// let err = SpawnError::ProcessDied { pid: 42 };
    /// assert_eq!(err.as_label(), "spawn_process_died");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            SpawnError::Start(_) => "spawn_start_failed",
            SpawnError::MissingPid => "spawn_missing_pid",
            SpawnError::RelayTimeout { .. } => "spawn_relay_timeout",
            SpawnError::ProcessDied { .. } => "spawn_process_died",
            SpawnError::Canceled => "spawn_canceled",
            SpawnError::DeadlineExceeded { .. } => "spawn_deadline_exceeded",
            SpawnError::Join(_) => "spawn_join_failed",
            SpawnError::Cleanup { cause, .. } => cause.as_label(),
        }
    }

    /// Returns the original failure, looking through [`SpawnError::Cleanup`].
    pub fn cause(&self) -> &SpawnError {
        match self {
            SpawnError::Cleanup { cause, .. } => cause.cause(),
            other => other,
        }
    }

    /// Kill/wait failures recorded during cleanup (empty if cleanup succeeded).
    pub fn cleanup_errors(&self) -> &[WorkerError] {
        match self {
            SpawnError::Cleanup { cleanup, .. } => cleanup,
            _ => &[],
        }
    }

    /// True for the caller-side outcomes (`Canceled`, `DeadlineExceeded`).
    pub fn is_canceled(&self) -> bool {
        matches!(
            self.cause(),
            SpawnError::Canceled | SpawnError::DeadlineExceeded { .. }
        )
    }

    /// Attaches cleanup failures; returns `cause` unchanged when there are none.
    pub(crate) fn with_cleanup(cause: SpawnError, mut cleanup: Vec<WorkerError>) -> Self {
        if cleanup.is_empty() {
            return cause;
        }
        match cause {
            SpawnError::Cleanup {
                cause,
                cleanup: mut prior,
            } => {
                prior.append(&mut cleanup);
                SpawnError::Cleanup {
                    cause,
                    cleanup: prior,
                }
            }
            cause => SpawnError::Cleanup {
                cause: Box::new(cause),
                cleanup,
            },
        }
    }

    /// Splits an error into its cleanup failures, dropping the cause.
    pub(crate) fn into_cleanup(self) -> Vec<WorkerError> {
        match self {
            SpawnError::Cleanup { cleanup, .. } => cleanup,
            _ => Vec::new(),
        }
    }
}

fn join_errors(errors: &[WorkerError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
