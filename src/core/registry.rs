//! # Relay registry - relays waiting for their worker.
//!
//! The accept loop stores a relay under the pid it read from the handshake;
//! a spawn takes it out again once its worker's pid matches.
//!
//! ## Architecture
//! ```text
//! Accept loop ──store(pid, relay)──► DashMap<pid, relay> ──take(pid)──► Spawner
//!                     │
//!                     └──► Notify::notify_waiters() ──► wakes every pending matcher
//! ```
//!
//! ## Rules
//! - One registry per factory (never process-wide)
//! - At most one pending relay per pid; a second `store` replaces the first
//! - `take` is the consuming lookup: a relay is handed out at most once
//! - Every `store` wakes all matchers registered through [`Registry::stored`]

use dashmap::DashMap;
use tokio::sync::{Notify, futures::Notified};

/// Concurrent map of pid → relay with store notifications.
pub struct Registry<R> {
    relays: DashMap<u32, R>,
    stored: Notify,
}

impl<R> Registry<R> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            relays: DashMap::new(),
            stored: Notify::new(),
        }
    }

    /// Associates `relay` with `pid`, replacing any pending entry, and wakes matchers.
    pub fn store(&self, pid: u32, relay: R) {
        if self.relays.insert(pid, relay).is_some() {
            tracing::warn!(pid, "pending relay replaced by a newer connection");
        }
        self.stored.notify_waiters();
    }

    /// Removes and returns the relay stored under `pid`.
    pub fn take(&self, pid: u32) -> Option<R> {
        self.relays.remove(&pid).map(|(_, relay)| relay)
    }

    /// Removes the entry for `pid`; returns whether one existed.
    pub fn delete(&self, pid: u32) -> bool {
        self.relays.remove(&pid).is_some()
    }

    /// True if a relay is pending under `pid`.
    pub fn contains(&self, pid: u32) -> bool {
        self.relays.contains_key(&pid)
    }

    /// Number of relays waiting for a worker.
    pub fn len(&self) -> usize {
        self.relays.len()
    }

    /// True if no relay is pending.
    pub fn is_empty(&self) -> bool {
        self.relays.is_empty()
    }

    /// Future resolved by the next `store`.
    ///
    /// Call `enable()` on the pinned future **before** checking the map, so a
    /// store landing between the check and the await is not missed.
    pub(crate) fn stored(&self) -> Notified<'_> {
        self.stored.notified()
    }
}

impl<R: Clone> Registry<R> {
    /// Non-consuming lookup.
    pub fn load(&self, pid: u32) -> Option<R> {
        self.relays.get(&pid).map(|entry| entry.value().clone())
    }
}

impl<R> Default for Registry<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn load_returns_the_stored_instance_only_for_its_pid() {
        let registry = Registry::new();
        let relay = Arc::new("relay-p");
        registry.store(10, Arc::clone(&relay));

        let loaded = registry.load(10).expect("stored relay");
        assert!(Arc::ptr_eq(&loaded, &relay));
        assert!(registry.load(11).is_none());
        assert!(registry.take(11).is_none());
    }

    #[test]
    fn take_consumes_the_entry() {
        let registry = Registry::new();
        registry.store(10, "relay");
        assert_eq!(registry.len(), 1);

        assert_eq!(registry.take(10), Some("relay"));
        assert_eq!(registry.take(10), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn store_replaces_and_delete_removes() {
        let registry = Registry::new();
        registry.store(10, "old");
        registry.store(10, "new");
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.load(10), Some("new"));

        assert!(registry.delete(10));
        assert!(!registry.delete(10));
        assert!(!registry.contains(10));
    }

    #[tokio::test]
    async fn store_wakes_an_enabled_waiter() {
        let registry = Arc::new(Registry::new());

        let notified = registry.stored();
        tokio::pin!(notified);
        notified.as_mut().enable();

        let writer = Arc::clone(&registry);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer.store(7, "relay");
        });

        tokio::time::timeout(Duration::from_secs(5), notified)
            .await
            .expect("woken by store");
        assert!(registry.contains(7));
    }

    #[tokio::test]
    async fn concurrent_stores_for_distinct_pids_are_all_visible() {
        let registry = Arc::new(Registry::new());
        let mut joins = Vec::new();
        for pid in 1..=64u32 {
            let r = Arc::clone(&registry);
            joins.push(tokio::spawn(async move { r.store(pid, pid * 10) }));
        }
        for j in joins {
            j.await.unwrap();
        }
        assert_eq!(registry.len(), 64);
        for pid in 1..=64u32 {
            assert_eq!(registry.take(pid), Some(pid * 10));
        }
    }
}
