//! # Factory configuration.
//!
//! Provides [`FactoryConfig`] centralized settings for a
//! [`SocketFactory`](crate::SocketFactory).
//!
//! ## Sentinel values
//! - `handshake_timeout = 0s` → no timeout (a stalled connection blocks the accept loop)
//! - `error_capacity = 0` / `bus_capacity = 0` → clamped to 1

use std::time::Duration;

use crate::policies::HandshakePolicy;

/// Configuration for a socket factory.
///
/// ## Field semantics
/// - `relay_timeout`: how long a spawn waits for its worker to connect
/// - `liveness_tick`: how often the liveness-checking matcher probes the OS
/// - `handshake_timeout`: per-connection handshake bound (`0s` = none)
/// - `handshake_policy`: fail-stop or skip on a malformed handshake
/// - `error_capacity`: capacity of the accept-loop error channel (min 1)
/// - `bus_capacity`: event bus ring buffer size (min 1)
/// - `max_frame_len`: largest frame a relay accepts
///
/// ## Notes
/// All fields are public. Prefer the helper accessors over sentinel checks.
#[derive(Clone, Debug)]
pub struct FactoryConfig {
    /// Maximum time a spawn waits for its worker to connect and hand over its pid.
    ///
    /// Used as-is by `spawn_worker`; `spawn_worker_with_timeout` uses the
    /// smaller of this and the caller deadline.
    pub relay_timeout: Duration,

    /// Interval between OS liveness probes while waiting for a relay.
    pub liveness_tick: Duration,

    /// Upper bound on reading the first frame of a new connection.
    ///
    /// - `Duration::ZERO` = no bound
    /// - `> 0` = a connection that stays silent longer fails its handshake
    pub handshake_timeout: Duration,

    /// Accept loop behaviour after a failed handshake.
    pub handshake_policy: HandshakePolicy,

    /// Capacity of the accept-loop error channel.
    ///
    /// The loop writes exactly one error, so 1 is enough; the default leaves room.
    pub error_capacity: usize,

    /// Capacity of the event bus broadcast channel ring buffer.
    pub bus_capacity: usize,

    /// Largest frame (in bytes) accepted from a relay, handshake included.
    pub max_frame_len: usize,
}

impl FactoryConfig {
    /// Returns the handshake timeout as an `Option`.
    ///
    /// - `None` → wait for the first frame indefinitely
    /// - `Some(d)` → fail the handshake after `d`
    #[inline]
    pub fn handshake_timeout(&self) -> Option<Duration> {
        if self.handshake_timeout == Duration::ZERO {
            None
        } else {
            Some(self.handshake_timeout)
        }
    }

    /// Returns the liveness tick, clamped to at least 1ms.
    #[inline]
    pub fn liveness_tick_clamped(&self) -> Duration {
        self.liveness_tick.max(Duration::from_millis(1))
    }

    /// Returns the error channel capacity clamped to a minimum of 1.
    #[inline]
    pub fn error_capacity_clamped(&self) -> usize {
        self.error_capacity.max(1)
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Rendezvous timeout for a caller that supplied its own `deadline`.
    ///
    /// Never looser than the caller's deadline.
    #[inline]
    pub fn relay_timeout_within(&self, deadline: Duration) -> Duration {
        self.relay_timeout.min(deadline)
    }
}

impl Default for FactoryConfig {
    /// Default configuration:
    ///
    /// - `relay_timeout = 60s`
    /// - `liveness_tick = 100ms`
    /// - `handshake_timeout = 0s` (no timeout)
    /// - `handshake_policy = HandshakePolicy::FailStop`
    /// - `error_capacity = 10`
    /// - `bus_capacity = 1024`
    /// - `max_frame_len = 16 MiB`
    fn default() -> Self {
        Self {
            relay_timeout: Duration::from_secs(60),
            liveness_tick: Duration::from_millis(100),
            handshake_timeout: Duration::ZERO,
            handshake_policy: HandshakePolicy::default(),
            error_capacity: 10,
            bus_capacity: 1024,
            max_frame_len: 16 * 1024 * 1024,
        }
    }
}
