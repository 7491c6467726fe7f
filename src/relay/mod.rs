//! # Relays: framed connections from worker processes.
//!
//! - [`SocketRelay`] length-prefixed frames over one accepted stream
//! - [`RelayListener`] TCP / Unix listeners the accept loop owns
//! - [`fetch_pid`] / [`announce_pid`] the pid handshake on a fresh connection

mod handshake;
mod listener;
mod socket;

pub use handshake::{PidFrame, announce_pid, fetch_pid};
pub use listener::RelayListener;
pub use socket::{DEFAULT_MAX_FRAME_LEN, SocketRelay};
