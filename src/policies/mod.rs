//! Accept-loop policies.
//!
//! ## Contents
//! - [`HandshakePolicy`] what happens to the accept loop when a connection
//!   fails the pid handshake (fail-stop / skip).
//!
//! ## Defaults
//! - `HandshakePolicy::FailStop`: a malformed handshake is treated as fatal
//!   misconfiguration and stops the accept loop.

mod handshake;

pub use handshake::HandshakePolicy;
