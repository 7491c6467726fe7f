//! # Event subscribers.
//!
//! This module provides the [`Subscribe`] trait and the [`SubscriberSet`]
//! fan-out used for factory-wide subscribers and per-worker listeners.
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   Accept loop / Spawner / Worker ── publish(Event) ──► Bus ──► SubscriberSet
//!                                                                   │
//!   ProcessWorker ── emit(Event) ──► its own SubscriberSet          │
//!                                          │                        │
//!                                          ▼                        ▼
//!                                    listeners.on_event()    subscribers.on_event()
//! ```
//!
//! ## Implementing custom subscribers
//! ```no_run
//! use relayvisor::{Event, EventKind, Subscribe};
//! use async_trait::async_trait;
//!
//! struct DeathCounter;
//!
//! #[async_trait]
//! impl Subscribe for DeathCounter {
//!     async fn on_event(&self, event: &Event) {
//!         if event.kind == EventKind::ProcessDied {
//!             // increment counter
//!         }
//!     }
//!     fn name(&self) -> &'static str { "death-counter" }
//! }
//! ```

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
