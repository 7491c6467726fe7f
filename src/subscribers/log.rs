//! # LogWriter: events to `tracing`
//!
//! A minimal subscriber that forwards incoming [`Event`]s to `tracing`.
//!
//! ## Example output (with a fmt subscriber)
//! ```text
//! INFO relayvisor: worker started pid=4242
//! INFO relayvisor: relay accepted pid=4242
//! INFO relayvisor: worker ready pid=4242
//! WARN relayvisor: relay timeout pid=4243 timeout_ms=60000
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let reason = e.reason.as_deref().unwrap_or("");
        match e.kind {
            EventKind::WorkerStarted => tracing::info!(pid = ?e.pid, "worker started"),
            EventKind::RelayAccepted => tracing::info!(pid = ?e.pid, "relay accepted"),
            EventKind::WorkerReady => tracing::info!(pid = ?e.pid, "worker ready"),
            EventKind::WorkerLog => tracing::info!(pid = ?e.pid, line = reason, "worker stderr"),
            EventKind::WorkerStopped => {
                tracing::info!(pid = ?e.pid, status = reason, "worker stopped")
            }
            EventKind::WorkerKilled => tracing::info!(pid = ?e.pid, "worker killed"),
            EventKind::RelayTimeout => {
                tracing::warn!(pid = ?e.pid, timeout_ms = ?e.timeout_ms, "relay timeout")
            }
            EventKind::ProcessDied => tracing::warn!(pid = ?e.pid, "process died before connecting"),
            EventKind::SpawnCanceled => tracing::warn!(pid = ?e.pid, reason, "spawn canceled"),
            EventKind::HandshakeFailed => tracing::warn!(reason, "handshake failed"),
            EventKind::AcceptLoopStopped => tracing::error!(reason, "accept loop stopped"),
            EventKind::SubscriberOverflow => {
                tracing::warn!(subscriber = ?e.source, reason, "subscriber overflow")
            }
            EventKind::SubscriberPanicked => {
                tracing::error!(subscriber = ?e.source, reason, "subscriber panicked")
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
