//! # Rendezvous matcher: wait until a worker's relay shows up.
//!
//! Two variants, both consuming the registry entry they match:
//!
//! - [`find_relay`] deadline only; a process that died silently costs the full timeout
//! - [`find_relay_with_context`] deadline + OS liveness probe on its own tick
//!   + cancellation token
//!
//! ## Wake-up order
//! ```text
//! loop {
//!   ├─► enable Notified (registry store)
//!   ├─► registry.take(pid) ──► Some ──► Ok(relay)
//!   └─► select!
//!         ├─ stored      → loop
//!         ├─ cancelled   → take once more, else Canceled
//!         ├─ deadline    → take once more, else RelayTimeout
//!         └─ tick        → probe; gone → take once more, else ProcessDied
//! }
//! ```
//!
//! ## Rules
//! - A relay that is already in the registry wins over a failure observed in
//!   the same wake-up (the registry is always checked last before failing)
//! - No busy polling: the task sleeps until a store, a tick, the deadline or
//!   cancellation
//! - The liveness tick is independent of store notifications

use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::process_exists;
use super::registry::Registry;
use crate::error::SpawnError;

/// Waits up to `timeout` for a relay stored under `pid`.
pub(crate) async fn find_relay<R>(
    registry: &Registry<R>,
    pid: u32,
    timeout: Duration,
) -> Result<R, SpawnError> {
    let deadline = time::sleep(timeout);
    tokio::pin!(deadline);

    loop {
        let stored = registry.stored();
        tokio::pin!(stored);
        stored.as_mut().enable();

        if let Some(relay) = registry.take(pid) {
            return Ok(relay);
        }

        tokio::select! {
            _ = &mut stored => {}
            _ = &mut deadline => {
                return registry
                    .take(pid)
                    .ok_or(SpawnError::RelayTimeout { pid, timeout });
            }
        }
    }
}

/// Waits up to `timeout` for a relay stored under `pid`, failing early when the
/// process disappears or `ctx` is cancelled.
pub(crate) async fn find_relay_with_context<R>(
    registry: &Registry<R>,
    pid: u32,
    timeout: Duration,
    tick: Duration,
    ctx: &CancellationToken,
) -> Result<R, SpawnError> {
    let deadline = time::sleep(timeout);
    tokio::pin!(deadline);

    let mut ticker = time::interval_at(Instant::now() + tick, tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let stored = registry.stored();
        tokio::pin!(stored);
        stored.as_mut().enable();

        if let Some(relay) = registry.take(pid) {
            return Ok(relay);
        }

        tokio::select! {
            _ = &mut stored => {}
            _ = ctx.cancelled() => {
                return registry.take(pid).ok_or(SpawnError::Canceled);
            }
            _ = &mut deadline => {
                return registry
                    .take(pid)
                    .ok_or(SpawnError::RelayTimeout { pid, timeout });
            }
            _ = ticker.tick() => {
                if !process_exists(pid).await {
                    return registry.take(pid).ok_or(SpawnError::ProcessDied { pid });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::testing::command;

    const TICK: Duration = Duration::from_millis(100);

    #[tokio::test]
    async fn relay_stored_later_is_matched() {
        let registry = Arc::new(Registry::new());
        let writer = Arc::clone(&registry);
        tokio::spawn(async move {
            time::sleep(Duration::from_millis(50)).await;
            writer.store(11, "other");
            writer.store(10, "mine");
        });

        let relay = find_relay(&registry, 10, Duration::from_secs(5)).await.unwrap();
        assert_eq!(relay, "mine");
        assert!(!registry.contains(10), "matched entry is consumed");
        assert!(registry.contains(11), "other pids are untouched");
    }

    #[tokio::test]
    async fn missing_relay_times_out() {
        let registry = Registry::<&str>::new();
        let started = Instant::now();
        let err = find_relay(&registry, 10, Duration::from_millis(150))
            .await
            .unwrap_err();
        assert!(matches!(err, SpawnError::RelayTimeout { pid: 10, .. }));
        assert!(started.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn present_relay_beats_cancellation() {
        let registry = Registry::new();
        registry.store(10, "ready");
        let ctx = CancellationToken::new();
        ctx.cancel();

        let relay = find_relay_with_context(&registry, 10, Duration::from_secs(5), TICK, &ctx)
            .await
            .unwrap();
        assert_eq!(relay, "ready");
    }

    #[tokio::test]
    async fn cancellation_stops_the_wait() {
        let registry = Registry::<&str>::new();
        let ctx = CancellationToken::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let err = find_relay_with_context(
            &registry,
            std::process::id(),
            Duration::from_secs(5),
            TICK,
            &ctx,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SpawnError::Canceled));
    }

    #[tokio::test]
    async fn live_process_waits_for_its_relay() {
        let registry = Arc::new(Registry::new());
        let pid = std::process::id();
        let writer = Arc::clone(&registry);
        tokio::spawn(async move {
            time::sleep(Duration::from_millis(350)).await;
            writer.store(pid, "late but alive");
        });

        let ctx = CancellationToken::new();
        let relay = find_relay_with_context(&registry, pid, Duration::from_secs(5), TICK, &ctx)
            .await
            .unwrap();
        assert_eq!(relay, "late but alive");
    }

    #[tokio::test]
    async fn dead_process_fails_fast_only_with_liveness() {
        let mut child = command("true", &[]).spawn().unwrap();
        let pid = child.id().unwrap();
        time::sleep(Duration::from_millis(100)).await;
        let registry = Registry::<&str>::new();

        let started = Instant::now();
        let ctx = CancellationToken::new();
        let err = find_relay_with_context(&registry, pid, Duration::from_secs(5), TICK, &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, SpawnError::ProcessDied { pid: p } if p == pid));
        assert!(
            started.elapsed() < Duration::from_secs(2),
            "liveness path took {:?}",
            started.elapsed()
        );

        let deadline = Duration::from_millis(600);
        let started = Instant::now();
        let err = find_relay(&registry, pid, deadline).await.unwrap_err();
        assert!(matches!(err, SpawnError::RelayTimeout { .. }));
        assert!(
            started.elapsed() >= deadline,
            "deadline-only path returned after {:?}",
            started.elapsed()
        );

        child.wait().await.unwrap();
    }
}
