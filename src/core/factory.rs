//! # SocketFactory: owns the listener and spawns relay-connected workers.
//!
//! ```text
//! SocketFactory::new(listener, cfg)
//!     ├─► Bus + SubscriberSet (factory subscribers)
//!     ├─► Registry (one per factory)
//!     ├─► tokio::spawn(AcceptLoop::run) ──► terminal FactoryError ──► error channel (once)
//!     └─► subscriber_listener(): Bus.subscribe() ─► SubscriberSet::emit
//!
//! spawn_worker(cmd, listeners)
//!     └─► ProcessWorker ─► Spawner::spawn ─► Ready worker with its relay
//!
//! spawn_worker_with_timeout(ctx, deadline, cmd, listeners)
//!     └─► ProcessWorker ─► Spawner::spawn_within ─► Ready worker | reaped + error
//!
//! close() ─► shutdown.cancel() ─► accept loop returns ListenerClosed, listener dropped
//!
//! shutdown().await ─► close ─► subscriber_listener drains the bus ─► SubscriberSet::shutdown
//! ```
//!
//! ## Rules
//! - The error channel receives exactly one error, then closes
//! - In-flight spawns are not interrupted by `close()`; they match a relay that
//!   was already accepted or time out
//! - Dropping the factory closes it; subscribers may miss events still queued
//! - [`shutdown`](SocketFactory::shutdown) closes it and waits until every
//!   factory subscriber has handled the events published so far

use std::mem;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::accept::AcceptLoop;
use super::builder::FactoryBuilder;
use super::config::FactoryConfig;
use super::registry::Registry;
use super::spawn::Spawner;
use crate::error::{FactoryError, SpawnError};
use crate::events::{Bus, Event};
use crate::relay::{RelayListener, SocketRelay};
use crate::subscribers::{Subscribe, SubscriberSet};
use crate::worker::{ProcessWorker, Worker};

/// Receiving end of the factory error channel.
pub type ErrorReceiver = mpsc::Receiver<FactoryError>;

/// Relay type produced by a factory listening on `L`.
pub type RelayOf<L> = SocketRelay<<L as RelayListener>::Stream>;

/// Spawns worker processes and pairs each one with the connection it opens back.
pub struct SocketFactory<L: RelayListener> {
    cfg: FactoryConfig,
    bus: Bus,
    subs: Arc<SubscriberSet>,
    registry: Arc<Registry<RelayOf<L>>>,
    spawner: Spawner<RelayOf<L>>,
    shutdown: CancellationToken,
    dropped: CancellationToken,
    listener: Option<JoinHandle<()>>,
}

impl<L: RelayListener> SocketFactory<L> {
    /// Creates a factory with `cfg` and starts its accept loop on `listener`.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Example
    /// ```no_run
    /// use relayvisor::{FactoryConfig, SocketFactory};
    /// use tokio::net::TcpListener;
    /// use tokio::process::Command;
    ///
    /// #[tokio::main(flavor = "current_thread")]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let listener = TcpListener::bind("127.0.0.1:7070").await?;
    ///     let (factory, mut errors) = SocketFactory::new(listener, FactoryConfig::default());
    ///
    ///     let mut worker = factory.spawn_worker(Command::new("./worker"), Vec::new()).await?;
    ///     if let Some(relay) = worker.relay_mut() {
    ///         relay.send(b"job").await?;
    ///     }
    ///
    ///     factory.close()?;
    ///     let _closed = errors.recv().await;
    ///     Ok(())
    /// }
    /// ```
    pub fn new(listener: L, cfg: FactoryConfig) -> (Self, ErrorReceiver) {
        FactoryBuilder::new(listener).with_config(cfg).build()
    }

    /// Returns a builder for a factory listening on `listener`.
    pub fn builder(listener: L) -> FactoryBuilder<L> {
        FactoryBuilder::new(listener)
    }

    pub(crate) fn new_internal(
        listener: L,
        cfg: FactoryConfig,
        subscribers: Vec<Arc<dyn Subscribe>>,
    ) -> (Self, ErrorReceiver) {
        let bus = Bus::new(cfg.bus_capacity_clamped());
        let subs = Arc::new(SubscriberSet::new(subscribers, bus.clone()));
        let registry = Arc::new(Registry::new());
        let shutdown = CancellationToken::new();
        let spawner = Spawner::new(Arc::clone(&registry), bus.clone(), cfg.clone());

        let (tx, rx) = mpsc::channel(cfg.error_capacity_clamped());
        let accept = AcceptLoop {
            listener,
            registry: Arc::clone(&registry),
            bus: bus.clone(),
            policy: cfg.handshake_policy,
            handshake_timeout: cfg.handshake_timeout(),
            max_frame_len: cfg.max_frame_len,
            shutdown: shutdown.clone(),
        };
        tokio::spawn(async move {
            let err = accept.run().await;
            match &err {
                FactoryError::ListenerClosed => tracing::debug!("accept loop closed"),
                e => tracing::error!(error = %e, label = e.as_label(), "accept loop stopped"),
            }
            if tx.send(err).await.is_err() {
                tracing::debug!("factory error receiver dropped");
            }
        });

        let mut factory = Self {
            cfg,
            bus,
            subs,
            registry,
            spawner,
            shutdown,
            dropped: CancellationToken::new(),
            listener: None,
        };
        factory.listener = factory.subscriber_listener();
        (factory, rx)
    }

    /// Launches `cmd` and waits for its relay with the deadline-only matcher.
    ///
    /// `listeners` receive this worker's events (state changes, stderr lines).
    pub async fn spawn_worker(
        &self,
        cmd: Command,
        listeners: Vec<Arc<dyn Subscribe>>,
    ) -> Result<ProcessWorker<RelayOf<L>>, SpawnError> {
        let worker = ProcessWorker::new(cmd, self.bus.clone(), listeners);
        self.spawn_with(worker).await
    }

    /// Launches `cmd` and waits for its relay until `ctx` is cancelled or
    /// `deadline` elapses, whichever comes first.
    ///
    /// The wait also fails early when the process exits before connecting.
    /// On any failure the process is killed and reaped before returning.
    pub async fn spawn_worker_with_timeout(
        &self,
        ctx: &CancellationToken,
        deadline: Duration,
        cmd: Command,
        listeners: Vec<Arc<dyn Subscribe>>,
    ) -> Result<ProcessWorker<RelayOf<L>>, SpawnError> {
        let worker = ProcessWorker::new(cmd, self.bus.clone(), listeners);
        self.spawn_with_timeout(ctx, deadline, worker).await
    }

    /// [`spawn_worker`](Self::spawn_worker) for any [`Worker`] implementation.
    pub async fn spawn_with<W>(&self, worker: W) -> Result<W, SpawnError>
    where
        W: Worker<Relay = RelayOf<L>>,
    {
        self.spawner.spawn(worker).await
    }

    /// [`spawn_worker_with_timeout`](Self::spawn_worker_with_timeout) for any
    /// [`Worker`] implementation.
    pub async fn spawn_with_timeout<W>(
        &self,
        ctx: &CancellationToken,
        deadline: Duration,
        worker: W,
    ) -> Result<W, SpawnError>
    where
        W: Worker<Relay = RelayOf<L>>,
    {
        self.spawner.spawn_within(ctx, deadline, worker).await
    }

    /// Closes the factory and waits until the factory subscribers have handled
    /// every event published before this call.
    ///
    /// Events published later (by spawns still in flight) are not delivered.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        self.dropped.cancel();

        if let Some(listener) = self.listener.take() {
            if let Err(e) = listener.await {
                tracing::warn!(error = %e, "subscriber listener failed");
            }
        }
        let empty = Arc::new(SubscriberSet::new(Vec::new(), self.bus.clone()));
        match Arc::try_unwrap(mem::replace(&mut self.subs, empty)) {
            Ok(set) => set.shutdown().await,
            Err(_) => tracing::debug!("subscriber set still shared, not drained"),
        }
    }

    /// Stops the listener; the error channel then yields `ListenerClosed`.
    ///
    /// Returns `ListenerClosed` if the factory was already closed.
    pub fn close(&self) -> Result<(), FactoryError> {
        if self.shutdown.is_cancelled() {
            return Err(FactoryError::ListenerClosed);
        }
        self.shutdown.cancel();
        Ok(())
    }

    /// True once [`close`](Self::close) was called or the factory dropped.
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Number of accepted relays not yet matched to a worker.
    pub fn pending(&self) -> usize {
        self.registry.len()
    }

    /// Subscribes to the factory event stream.
    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Configuration the factory was built with.
    pub fn config(&self) -> &FactoryConfig {
        &self.cfg
    }

    /// Subscribes to the bus and forwards events to the subscriber set.
    ///
    /// Once the factory is dropped or shut down, forwards what is already
    /// queued on the bus and stops.
    fn subscriber_listener(&self) -> Option<JoinHandle<()>> {
        if self.subs.is_empty() {
            return None;
        }
        let mut rx = self.bus.subscribe();
        let set = Arc::clone(&self.subs);
        let dropped = self.dropped.clone();
        let handle = tokio::spawn(async move {
            loop {
                let res = tokio::select! {
                    _ = dropped.cancelled() => {
                        forward_queued(&mut rx, &set);
                        break;
                    }
                    res = rx.recv() => res,
                };
                match res {
                    Ok(ev) => set.emit(&ev),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "factory subscribers lagged behind the bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Some(handle)
    }
}

fn forward_queued(rx: &mut broadcast::Receiver<Event>, set: &SubscriberSet) {
    loop {
        match rx.try_recv() {
            Ok(ev) => set.emit(&ev),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "factory subscribers lagged behind the bus");
            }
            Err(_) => break,
        }
    }
}

impl<L: RelayListener> Drop for SocketFactory<L> {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.dropped.cancel();
    }
}
