//! # Listening sockets the accept loop can own.
//!
//! [`RelayListener`] abstracts over TCP and Unix-domain listeners. The factory
//! takes an already-bound listener and owns it until the accept loop stops.

use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};

/// A bound, listening socket.
#[async_trait]
pub trait RelayListener: Send + Sync + 'static {
    /// Stream type of an accepted connection.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync + 'static;

    /// Waits for the next inbound connection.
    async fn accept(&self) -> io::Result<Self::Stream>;

    /// Local address, for logs.
    fn describe(&self) -> String;
}

#[async_trait]
impl RelayListener for TcpListener {
    type Stream = TcpStream;

    async fn accept(&self) -> io::Result<TcpStream> {
        let (stream, peer) = TcpListener::accept(self).await?;
        tracing::trace!(%peer, "tcp connection accepted");
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    fn describe(&self) -> String {
        match self.local_addr() {
            Ok(addr) => format!("tcp://{addr}"),
            Err(_) => "tcp://<unbound>".to_string(),
        }
    }
}

#[cfg(unix)]
#[async_trait]
impl RelayListener for tokio::net::UnixListener {
    type Stream = tokio::net::UnixStream;

    async fn accept(&self) -> io::Result<tokio::net::UnixStream> {
        let (stream, _peer) = tokio::net::UnixListener::accept(self).await?;
        Ok(stream)
    }

    fn describe(&self) -> String {
        match self.local_addr().ok().and_then(|a| a.as_pathname().map(|p| p.display().to_string())) {
            Some(path) => format!("unix://{path}"),
            None => "unix://<unnamed>".to_string(),
        }
    }
}
