//! # relayvisor
//!
//! **Relayvisor** spawns worker processes and pairs each one with the socket
//! connection it opens back to its parent.
//!
//! It is the spawning layer of a process-pool supervisor: the pool asks for a
//! worker, relayvisor launches the process, waits until that exact process has
//! connected and announced its pid, and hands back a ready worker that owns its
//! relay. Failed spawns never leak processes.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!            caller (process pool)
//!                  │ spawn_worker / spawn_worker_with_timeout
//!                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  SocketFactory                                                    │
//! │  - Bus (broadcast events)                                         │
//! │  - SubscriberSet (fans out to factory subscribers)                │
//! │  - Registry (pid → relay, one per factory)                        │
//! │  - Spawner (start → match → attach, kill + reap on failure)       │
//! └──────┬───────────────────────────────────────────────▲────────────┘
//!        │ start()                                       │ take(pid)
//!        ▼                                               │
//!   ┌──────────────┐   connect + {"pid": N}   ┌──────────┴───────────┐
//!   │ worker proc  │ ───────────────────────► │ AcceptLoop           │
//!   │ (pid N)      │                          │ accept → handshake → │
//!   └──────────────┘                          │ store(pid, relay)    │
//!                                             └──────────────────────┘
//! ```
//!
//! ### Spawn sequence
//! ```text
//! worker.start() ──► pid
//!   │
//!   ├─ spawn_worker:               find_relay(pid, relay_timeout)
//!   │                                 └─ registry store / deadline
//!   │
//!   └─ spawn_worker_with_timeout:  background task, raced against ctx + deadline
//!                                  find_relay_with_context(pid, min(relay_timeout, deadline))
//!                                     └─ registry store / deadline / liveness tick / ctx
//!
//! Ok(relay) ──► worker.attach_relay(relay), set_state(Ready)
//! Err(cause) ─► publish event, kill, wait, registry.delete(pid)
//!               └─► SpawnError (cause + cleanup failures)
//! ```
//!
//! ## Features
//! | Area              | Description                                                       | Key types / traits                           |
//! |-------------------|-------------------------------------------------------------------|----------------------------------------------|
//! | **Factory**       | Own the listener, spawn workers, report accept-loop termination.  | [`SocketFactory`], [`FactoryBuilder`]        |
//! | **Workers**       | Process abstraction the spawner drives.                           | [`Worker`], [`ProcessWorker`], [`WorkerState`]|
//! | **Relays**        | Framed connection handed to the worker; pid handshake.            | [`SocketRelay`], [`RelayListener`]           |
//! | **Subscriber API**| Hook into factory and worker events.                              | [`Subscribe`], [`Event`], [`EventKind`]      |
//! | **Policies**      | Accept-loop behaviour on a malformed handshake.                   | [`HandshakePolicy`]                          |
//! | **Errors**        | Typed errors for the accept loop, spawns and workers.             | [`FactoryError`], [`SpawnError`], [`WorkerError`] |
//! | **Configuration** | Centralize factory settings.                                      | [`FactoryConfig`]                            |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio::net::TcpListener;
//! use tokio::process::Command;
//! use tokio_util::sync::CancellationToken;
//! use relayvisor::{FactoryConfig, SocketFactory};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let listener = TcpListener::bind("127.0.0.1:0").await?;
//!     let addr = listener.local_addr()?;
//!
//!     // Build subscribers (optional)
//!     #[cfg(feature = "logging")]
//!     let subs: Vec<Arc<dyn relayvisor::Subscribe>> = vec![Arc::new(relayvisor::LogWriter::default())];
//!     #[cfg(not(feature = "logging"))]
//!     let subs: Vec<Arc<dyn relayvisor::Subscribe>> = Vec::new();
//!
//!     let (factory, mut errors) = SocketFactory::builder(listener)
//!         .with_config(FactoryConfig::default())
//!         .with_subscribers(subs)
//!         .build();
//!
//!     // The worker connects to RELAY_ADDR and sends {"pid": <its pid>} first.
//!     let mut cmd = Command::new("./echo_worker");
//!     cmd.env("RELAY_ADDR", addr.to_string());
//!
//!     let ctx = CancellationToken::new();
//!     let mut worker = factory
//!         .spawn_worker_with_timeout(&ctx, Duration::from_secs(5), cmd, Vec::new())
//!         .await?;
//!
//!     if let Some(relay) = worker.relay_mut() {
//!         relay.send(b"ping").await?;
//!         let _reply = relay.receive().await?;
//!     }
//!
//!     factory.close()?;
//!     if let Some(err) = errors.recv().await {
//!         println!("accept loop stopped: {err}");
//!     }
//!     Ok(())
//! }
//! ```
mod core;
mod error;
mod events;
mod policies;
mod relay;
mod subscribers;
mod worker;

#[cfg(test)]
mod testing;

// ---- Public re-exports ----

pub use crate::core::{ErrorReceiver, FactoryBuilder, FactoryConfig, Registry, RelayOf, SocketFactory};
pub use error::{FactoryError, SpawnError, WorkerError};
pub use events::{Bus, Event, EventKind};
pub use policies::HandshakePolicy;
pub use relay::{DEFAULT_MAX_FRAME_LEN, PidFrame, RelayListener, SocketRelay, announce_pid, fetch_pid};
pub use subscribers::{Subscribe, SubscriberSet};
pub use worker::{ProcessWorker, Worker, WorkerState};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
