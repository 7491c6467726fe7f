use std::sync::Arc;

use super::{config::FactoryConfig, factory::ErrorReceiver, factory::SocketFactory};
use crate::{relay::RelayListener, subscribers::Subscribe};

/// Builder for constructing a [`SocketFactory`] with optional features.
pub struct FactoryBuilder<L: RelayListener> {
    listener: L,
    cfg: FactoryConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl<L: RelayListener> FactoryBuilder<L> {
    /// Creates a new builder around an already-bound listener.
    pub fn new(listener: L) -> Self {
        Self {
            listener,
            cfg: FactoryConfig::default(),
            subscribers: Vec::new(),
        }
    }

    /// Replaces the default configuration.
    pub fn with_config(mut self, cfg: FactoryConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive every factory event (accepted relays, spawn
    /// failures, worker lifecycle) through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the factory and starts its accept loop.
    ///
    /// Returns the factory and the receiving end of its error channel, which
    /// yields exactly one [`FactoryError`](crate::FactoryError) when the accept
    /// loop stops. Must be called from within a Tokio runtime.
    pub fn build(self) -> (SocketFactory<L>, ErrorReceiver) {
        SocketFactory::new_internal(self.listener, self.cfg, self.subscribers)
    }
}
