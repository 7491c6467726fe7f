//! # Handshake failure policy for the accept loop.
//!
//! [`HandshakePolicy`] decides what the accept loop does with a connection whose
//! first frame does not decode to a process identifier.
//!
//! - [`HandshakePolicy::FailStop`] the accept loop terminates and reports the
//!   error on the factory error channel (default).
//! - [`HandshakePolicy::Skip`] the connection is dropped and the loop keeps
//!   accepting.
//!
//! ## Choosing the right policy
//! ```text
//! Workers are trusted, a bad frame means misconfiguration:
//!   HandshakePolicy::FailStop   → one bad peer stops all future matching
//!
//! Socket reachable by other clients (health probes, scanners):
//!   HandshakePolicy::Skip       → bad peers are logged and ignored
//! ```

/// What the accept loop does after a failed handshake.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HandshakePolicy {
    /// Terminate the accept loop and report the handshake error.
    #[default]
    FailStop,
    /// Drop the offending connection and keep accepting.
    Skip,
}

impl HandshakePolicy {
    /// Returns `true` if a handshake failure ends the accept loop.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(self, HandshakePolicy::FailStop)
    }
}
