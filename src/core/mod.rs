//! Runtime core: accept loop, rendezvous and spawn orchestration.
//!
//! The public API from this module is [`SocketFactory`] (with its builder and
//! config) and the [`Registry`] it matches relays through.
//!
//! Internal modules:
//! - [`accept`]: accepts connections, reads the pid handshake, stores relays;
//! - [`matcher`]: waits for a pid's relay (deadline only, or with liveness + cancellation);
//! - [`spawn`]: start → match → attach, with kill + reap on every failure;
//! - [`liveness`]: OS process probe;
//! - [`registry`]: pid → relay map with store notifications.

mod accept;
mod builder;
mod config;
mod factory;
mod liveness;
mod matcher;
mod registry;
mod spawn;

pub use builder::FactoryBuilder;
pub use config::FactoryConfig;
pub use factory::{ErrorReceiver, RelayOf, SocketFactory};
pub use registry::Registry;

pub(crate) use liveness::process_exists;
