//! # Runtime events emitted by the factory, the accept loop and workers.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Accept events**: what happened to inbound connections
//! - **Spawn events**: a worker moving towards `Ready` or failing to get there
//! - **Worker events**: process output and termination
//! - **Subscriber events**: delivery problems inside the fan-out
//!
//! The [`Event`] struct carries additional metadata such as timestamps, pid,
//! reasons and timeouts.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use relayvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::RelayTimeout)
//!     .with_pid(4242)
//!     .with_timeout(Duration::from_secs(5));
//!
//! assert_eq!(ev.kind, EventKind::RelayTimeout);
//! assert_eq!(ev.pid, Some(4242));
//! assert_eq!(ev.timeout_ms, Some(5000));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `source`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `source`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,

    // === Accept events ===
    /// A connection completed the handshake; its relay is waiting in the registry.
    ///
    /// Sets:
    /// - `pid`: process identifier read from the handshake
    RelayAccepted,

    /// A connection failed the handshake.
    ///
    /// Sets:
    /// - `reason`: decode/io failure
    HandshakeFailed,

    /// The accept loop terminated; no further relays will be matched.
    ///
    /// Sets:
    /// - `reason`: terminal error
    AcceptLoopStopped,

    // === Spawn events ===
    /// Worker process started; the rendezvous wait begins.
    ///
    /// Sets:
    /// - `pid`: process identifier
    WorkerStarted,

    /// Relay attached; worker is ready for use.
    ///
    /// Sets:
    /// - `pid`: process identifier
    WorkerReady,

    /// No relay connected within the rendezvous timeout.
    ///
    /// Sets:
    /// - `pid`: process identifier
    /// - `timeout_ms`: rendezvous timeout (ms)
    RelayTimeout,

    /// The liveness probe found the process gone before it connected.
    ///
    /// Sets:
    /// - `pid`: process identifier
    ProcessDied,

    /// The spawn was abandoned by its caller (cancellation or deadline).
    ///
    /// Sets:
    /// - `pid`: process identifier, if the process had started
    /// - `reason`: caller-side error
    SpawnCanceled,

    // === Worker events ===
    /// A line written by the worker process to stderr.
    ///
    /// Sets:
    /// - `pid`: process identifier
    /// - `reason`: the line, without trailing newline
    WorkerLog,

    /// The worker process was killed.
    ///
    /// Sets:
    /// - `pid`: process identifier
    WorkerKilled,

    /// The worker process exited and was reaped.
    ///
    /// Sets:
    /// - `pid`: process identifier
    /// - `reason`: exit status
    WorkerStopped,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Worker process identifier, if applicable.
    pub pid: Option<u32>,
    /// Timeout in milliseconds (compact).
    pub timeout_ms: Option<u32>,
    /// Human-readable reason (errors, log lines, overflow details).
    pub reason: Option<Arc<str>>,
    /// Emitting component, for subscriber events.
    pub source: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            pid: None,
            timeout_ms: None,
            reason: None,
            source: None,
        }
    }

    /// Attaches a process identifier.
    #[inline]
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches the emitting component name.
    #[inline]
    pub fn with_source(mut self, source: impl Into<Arc<str>>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Attaches a timeout duration (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.timeout_ms = Some(ms);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_source(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_source(subscriber)
            .with_reason(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_is_monotonic() {
        let a = Event::new(EventKind::WorkerStarted);
        let b = Event::new(EventKind::WorkerReady);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn timeout_saturates_at_u32() {
        let ev = Event::new(EventKind::RelayTimeout).with_timeout(Duration::from_secs(u64::MAX));
        assert_eq!(ev.timeout_ms, Some(u32::MAX));
    }
}
