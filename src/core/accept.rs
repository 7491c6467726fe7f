//! # Accept loop: turns inbound connections into registered relays.
//!
//! One loop per factory. Each iteration accepts a connection, reads the pid
//! handshake and stores the relay in the registry under that pid.
//!
//! ```text
//! loop {
//!   ├─► select! { shutdown → ListenerClosed, accept() }
//!   │     └─ Err ──► Accept (terminal)
//!   ├─► fetch_pid (optional handshake timeout, shutdown aware)
//!   │     ├─ Ok(pid) ──► registry.store(pid, relay), publish RelayAccepted
//!   │     └─ Err     ──► publish HandshakeFailed
//!   │                     ├─ FailStop ─► return Handshake (terminal)
//!   │                     └─ Skip     ─► drop connection, continue
//! }
//! ```
//!
//! ## Rules
//! - Handshakes are sequential; a stalled client blocks the loop unless a
//!   handshake timeout is configured
//! - The loop returns its terminal error instead of reporting it; the factory
//!   forwards it to the error channel exactly once

use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;

use super::registry::Registry;
use crate::error::FactoryError;
use crate::events::{Bus, Event, EventKind};
use crate::policies::HandshakePolicy;
use crate::relay::{RelayListener, SocketRelay, fetch_pid};

pub(crate) struct AcceptLoop<L: RelayListener> {
    pub(crate) listener: L,
    pub(crate) registry: Arc<Registry<SocketRelay<L::Stream>>>,
    pub(crate) bus: Bus,
    pub(crate) policy: HandshakePolicy,
    pub(crate) handshake_timeout: Option<Duration>,
    pub(crate) max_frame_len: usize,
    pub(crate) shutdown: CancellationToken,
}

impl<L: RelayListener> AcceptLoop<L> {
    /// Runs until a terminal error; the listener is dropped on return.
    pub(crate) async fn run(self) -> FactoryError {
        tracing::debug!(listener = %self.listener.describe(), "accept loop started");
        let err = self.serve().await;
        self.bus.publish(
            Event::new(EventKind::AcceptLoopStopped)
                .with_reason(err.to_string())
                .with_source(self.listener.describe()),
        );
        err
    }

    async fn serve(&self) -> FactoryError {
        loop {
            let stream = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return FactoryError::ListenerClosed,
                res = self.listener.accept() => match res {
                    Ok(stream) => stream,
                    Err(e) => return FactoryError::Accept(e),
                },
            };

            let mut relay = SocketRelay::new(stream).with_max_frame_len(self.max_frame_len);
            let handshake = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return FactoryError::ListenerClosed,
                res = self.handshake(&mut relay) => res,
            };

            match handshake {
                Ok(pid) => {
                    tracing::debug!(pid, "relay accepted");
                    self.registry.store(pid, relay);
                    self.bus
                        .publish(Event::new(EventKind::RelayAccepted).with_pid(pid));
                }
                Err(e) => {
                    self.bus
                        .publish(Event::new(EventKind::HandshakeFailed).with_reason(e.to_string()));
                    if self.policy.is_fatal() {
                        return e;
                    }
                    tracing::warn!(error = %e, "handshake failed, connection dropped");
                }
            }
        }
    }

    async fn handshake(&self, relay: &mut SocketRelay<L::Stream>) -> Result<u32, FactoryError> {
        match self.handshake_timeout {
            Some(limit) => time::timeout(limit, fetch_pid(relay))
                .await
                .unwrap_or_else(|_| {
                    Err(FactoryError::handshake(format!("no handshake within {limit:?}")))
                }),
            None => fetch_pid(relay).await,
        }
    }
}
