//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to runtime events emitted by the accept loop, the spawn
//! orchestrator, workers and subscriber workers.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: accept loop, `Spawner`, `ProcessWorker`,
//!   `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the factory's subscriber listener (fans out to its
//!   `SubscriberSet`) and any receiver from `SocketFactory::events`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
