//! # Pid handshake.
//!
//! The first frame a worker sends over a fresh connection is a JSON object
//! carrying its operating-system process identifier:
//!
//! ```text
//! ┌──────────────┬──────────────────────┐
//! │ len: u32 BE  │ {"pid": 4242}        │
//! └──────────────┴──────────────────────┘
//! ```
//!
//! The factory side only reads. [`announce_pid`] is the worker side, used by
//! Rust workers and by tests.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};

use super::SocketRelay;
use crate::error::FactoryError;

/// Handshake payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PidFrame {
    /// Process identifier of the connecting worker.
    pub pid: u32,
}

/// Reads the handshake frame and returns the announced pid.
pub async fn fetch_pid<S>(relay: &mut SocketRelay<S>) -> Result<u32, FactoryError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let frame = relay
        .receive()
        .await
        .map_err(|e| FactoryError::handshake(format!("read: {e}")))?;
    let PidFrame { pid } = serde_json::from_slice(&frame)
        .map_err(|e| FactoryError::handshake(format!("decode: {e}")))?;
    if pid == 0 {
        return Err(FactoryError::handshake("pid 0 is not a worker process"));
    }
    Ok(pid)
}

/// Sends the handshake frame announcing `pid`.
pub async fn announce_pid<S>(relay: &mut SocketRelay<S>, pid: u32) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let payload = serde_json::to_vec(&PidFrame { pid })?;
    relay.send(&payload).await
}
