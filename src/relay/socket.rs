//! # Socket relay: framed bidirectional endpoint over one accepted stream.
//!
//! Frames are a 4-byte big-endian payload length followed by the payload.
//! The first frame on every connection is the pid handshake (see
//! [`handshake`](super::handshake)); everything after it belongs to the
//! protocol of the layer that owns the worker.

use std::fmt;
use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Default upper bound for a single frame.
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Bidirectional relay bound to one connection.
///
/// Ownership moves from the accept loop to the registry and finally to the
/// worker it gets attached to.
pub struct SocketRelay<S> {
    stream: S,
    max_frame_len: usize,
}

impl<S> SocketRelay<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wraps an accepted stream.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    /// Sets the largest frame [`receive`](Self::receive) accepts.
    #[must_use]
    pub fn with_max_frame_len(mut self, max: usize) -> Self {
        self.max_frame_len = max;
        self
    }

    /// Writes one frame and flushes it.
    pub async fn send(&mut self, payload: &[u8]) -> io::Result<()> {
        let len = u32::try_from(payload.len()).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "frame exceeds u32 length")
        })?;
        self.stream.write_u32(len).await?;
        self.stream.write_all(payload).await?;
        self.stream.flush().await
    }

    /// Reads one frame.
    ///
    /// Fails with `InvalidData` when the announced length exceeds the limit and
    /// with `UnexpectedEof` when the peer closes mid-frame.
    pub async fn receive(&mut self) -> io::Result<Vec<u8>> {
        let len = self.stream.read_u32().await? as usize;
        if len > self.max_frame_len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("frame of {len} bytes exceeds limit {}", self.max_frame_len),
            ));
        }
        let mut buf = vec![0u8; len];
        self.stream.read_exact(&mut buf).await?;
        Ok(buf)
    }
}

impl<S> SocketRelay<S> {
    /// Borrows the underlying stream.
    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Releases the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S> fmt::Debug for SocketRelay<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketRelay")
            .field("max_frame_len", &self.max_frame_len)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_cross_a_duplex_pipe() {
        let (a, b) = tokio::io::duplex(1024);
        let mut left = SocketRelay::new(a);
        let mut right = SocketRelay::new(b);

        left.send(b"ping").await.unwrap();
        left.send(b"").await.unwrap();
        assert_eq!(right.receive().await.unwrap(), b"ping");
        assert_eq!(right.receive().await.unwrap(), b"");

        right.send(b"pong").await.unwrap();
        assert_eq!(left.receive().await.unwrap(), b"pong");
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected() {
        let (a, b) = tokio::io::duplex(1024);
        let mut left = SocketRelay::new(a);
        let mut right = SocketRelay::new(b).with_max_frame_len(8);

        left.send(b"definitely more than eight").await.unwrap();
        let err = right.receive().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn peer_close_mid_frame_is_eof() {
        let (mut a, b) = tokio::io::duplex(1024);
        let mut right = SocketRelay::new(b);

        a.write_u32(10).await.unwrap();
        a.write_all(b"abc").await.unwrap();
        drop(a);

        let err = right.receive().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
