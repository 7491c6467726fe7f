//! # Spawn orchestrator: start a worker and pair it with its relay.
//!
//! ```text
//! spawn(worker)                      spawn_within(ctx, deadline, worker)
//!   ├─► worker.start()                 ├─► child = ctx.child_token(), drop guard
//!   ├─► pid (MissingPid if none)       ├─► tokio::spawn(spawn_with_context(worker, child, relay_timeout_within(deadline)))
//!   ├─► find_relay(pid, timeout)       └─► select! (biased)
//!   │     ├─ Ok  ─► attach, Ready            ├─ join     → result
//!   │     └─ Err ─► abort                    ├─ ctx      → Canceled
//!   │                                        └─ deadline → DeadlineExceeded
//!   └─► abort: publish, kill, wait,                 └─► child.cancel(), await join,
//!        registry.delete(pid),                          discard a worker that got ready
//!        Cleanup{cause, errors}
//! ```
//!
//! ## Rules
//! - Every failure after `start` kills and reaps the process before the error
//!   is returned; kill/wait failures are aggregated, never replace the cause
//! - A caller that gives up cancels the background spawn and waits for its
//!   cleanup, so no process outlives the error
//! - Dropping the caller's future cancels the background spawn too; its
//!   cleanup then runs detached
//! - A worker that became ready just as the caller gave up is killed and reaped

use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;

use super::config::FactoryConfig;
use super::matcher::{find_relay, find_relay_with_context};
use super::registry::Registry;
use crate::error::{SpawnError, WorkerError};
use crate::events::{Bus, Event, EventKind};
use crate::worker::{Worker, WorkerState};

/// Runs the spawn sequence against one factory's registry.
pub(crate) struct Spawner<R> {
    registry: Arc<Registry<R>>,
    bus: Bus,
    cfg: FactoryConfig,
}

impl<R> Clone for Spawner<R> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            bus: self.bus.clone(),
            cfg: self.cfg.clone(),
        }
    }
}

impl<R: Send + Sync + 'static> Spawner<R> {
    pub(crate) fn new(registry: Arc<Registry<R>>, bus: Bus, cfg: FactoryConfig) -> Self {
        Self { registry, bus, cfg }
    }

    /// Start, wait for the relay with the deadline-only matcher, attach.
    pub(crate) async fn spawn<W>(&self, mut worker: W) -> Result<W, SpawnError>
    where
        W: Worker<Relay = R>,
    {
        let pid = self.start(&mut worker).await?;
        match find_relay(&self.registry, pid, self.cfg.relay_timeout).await {
            Ok(relay) => Ok(Self::ready(worker, pid, relay)),
            Err(cause) => Err(self.abort(&mut worker, cause).await),
        }
    }

    /// Start, wait for the relay with the liveness matcher, attach.
    ///
    /// `ctx` cancellation aborts the wait; the process is reaped before returning.
    pub(crate) async fn spawn_with_context<W>(
        &self,
        mut worker: W,
        ctx: CancellationToken,
        timeout: Duration,
    ) -> Result<W, SpawnError>
    where
        W: Worker<Relay = R>,
    {
        if ctx.is_cancelled() {
            return Err(SpawnError::Canceled);
        }
        let pid = self.start(&mut worker).await?;
        let tick = self.cfg.liveness_tick_clamped();
        match find_relay_with_context(&self.registry, pid, timeout, tick, &ctx).await {
            Ok(relay) => Ok(Self::ready(worker, pid, relay)),
            Err(cause) => Err(self.abort(&mut worker, cause).await),
        }
    }

    /// Runs [`spawn_with_context`](Self::spawn_with_context) on a background
    /// task, raced against `ctx` and `deadline`.
    pub(crate) async fn spawn_within<W>(
        &self,
        ctx: &CancellationToken,
        deadline: Duration,
        worker: W,
    ) -> Result<W, SpawnError>
    where
        W: Worker<Relay = R>,
    {
        let child = ctx.child_token();
        let _abandon = child.clone().drop_guard();
        let timeout = self.cfg.relay_timeout_within(deadline);
        let spawner = self.clone();
        let token = child.clone();
        let mut join =
            tokio::spawn(async move { spawner.spawn_with_context(worker, token, timeout).await });

        let cause = tokio::select! {
            biased;
            res = &mut join => {
                return res.unwrap_or_else(|e| Err(SpawnError::Join(e.to_string())));
            }
            _ = ctx.cancelled() => SpawnError::Canceled,
            _ = time::sleep(deadline) => SpawnError::DeadlineExceeded { deadline },
        };

        child.cancel();
        match join.await {
            Ok(Ok(worker)) => Err(self.discard(worker, cause).await),
            Ok(Err(e)) => Err(SpawnError::with_cleanup(cause, e.into_cleanup())),
            Err(e) => {
                tracing::warn!(error = %e, "abandoned spawn task failed");
                Err(cause)
            }
        }
    }

    /// Kills and reaps a ready worker nobody is waiting for.
    async fn discard<W>(&self, mut worker: W, cause: SpawnError) -> SpawnError
    where
        W: Worker<Relay = R>,
    {
        tracing::debug!(pid = ?worker.pid(), "worker ready after its caller gave up");
        self.abort(&mut worker, cause).await
    }

    async fn start<W>(&self, worker: &mut W) -> Result<u32, SpawnError>
    where
        W: Worker<Relay = R>,
    {
        worker.start().await.map_err(SpawnError::Start)?;
        match worker.pid() {
            Some(pid) => {
                tracing::debug!(pid, "worker started, waiting for relay");
                Ok(pid)
            }
            None => Err(self.abort(worker, SpawnError::MissingPid).await),
        }
    }

    fn ready<W>(mut worker: W, pid: u32, relay: R) -> W
    where
        W: Worker<Relay = R>,
    {
        worker.attach_relay(relay);
        worker.set_state(WorkerState::Ready);
        tracing::debug!(pid, "relay attached");
        worker
    }

    async fn abort<W>(&self, worker: &mut W, cause: SpawnError) -> SpawnError
    where
        W: Worker<Relay = R>,
    {
        let pid = worker.pid();
        if let Some(ev) = failure_event(&cause, pid) {
            self.bus.publish(ev);
        }

        let cleanup = reap(worker).await;
        if let Some(pid) = pid {
            self.registry.delete(pid);
        }
        for e in &cleanup {
            tracing::warn!(?pid, error = %e, "cleanup after failed spawn");
        }
        SpawnError::with_cleanup(cause, cleanup)
    }
}

/// Best-effort kill + wait; collects what went wrong.
async fn reap<W: Worker>(worker: &mut W) -> Vec<WorkerError> {
    let mut errors = Vec::new();
    if let Err(e) = worker.kill().await {
        errors.push(e);
    }
    if let Err(e) = worker.wait().await {
        errors.push(e);
    }
    errors
}

fn failure_event(cause: &SpawnError, pid: Option<u32>) -> Option<Event> {
    let ev = match cause.cause() {
        SpawnError::RelayTimeout { timeout, .. } => {
            Event::new(EventKind::RelayTimeout).with_timeout(*timeout)
        }
        SpawnError::ProcessDied { .. } => Event::new(EventKind::ProcessDied),
        e @ (SpawnError::Canceled | SpawnError::DeadlineExceeded { .. }) => {
            Event::new(EventKind::SpawnCanceled).with_reason(e.to_string())
        }
        _ => return None,
    };
    Some(match pid {
        Some(pid) => ev.with_pid(pid),
        None => ev,
    })
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use tokio::net::TcpListener;

    use super::*;
    use crate::core::accept::AcceptLoop;
    use crate::core::process_exists;
    use crate::policies::HandshakePolicy;
    use crate::relay::DEFAULT_MAX_FRAME_LEN;
    use crate::testing::{ConnectingWorker, TcpRelay, command, loopback, reaped_worker};
    use crate::worker::ProcessWorker;

    const TICK: Duration = Duration::from_millis(100);

    async fn harness(timeout: Duration) -> (Spawner<TcpRelay>, Bus, SocketAddr, CancellationToken) {
        let (listener, addr): (TcpListener, SocketAddr) = loopback().await;
        let registry = Arc::new(Registry::new());
        let bus = Bus::new(256);
        let shutdown = CancellationToken::new();
        let lp = AcceptLoop {
            listener,
            registry: Arc::clone(&registry),
            bus: bus.clone(),
            policy: HandshakePolicy::FailStop,
            handshake_timeout: None,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            shutdown: shutdown.clone(),
        };
        tokio::spawn(lp.run());
        let cfg = FactoryConfig {
            relay_timeout: timeout,
            liveness_tick: TICK,
            ..FactoryConfig::default()
        };
        (Spawner::new(registry, bus.clone(), cfg), bus, addr, shutdown)
    }

    fn sleeper(bus: &Bus) -> ProcessWorker<TcpRelay> {
        ProcessWorker::new(command("sleep", &["30"]), bus.clone(), Vec::new())
    }

    #[tokio::test]
    async fn connecting_worker_becomes_ready() {
        let (spawner, _bus, addr, shutdown) = harness(Duration::from_secs(5)).await;

        let mut worker = spawner
            .spawn(ConnectingWorker::new(addr, Duration::from_millis(50)))
            .await
            .unwrap();
        assert_eq!(worker.state(), WorkerState::Ready);
        let pid = worker.pid().unwrap();
        let frame = worker.relay_mut().unwrap().receive().await.unwrap();
        assert_eq!(frame, format!("hello from {pid}").into_bytes());
        assert!(spawner.registry.is_empty());

        worker.kill().await.unwrap();
        worker.wait().await.unwrap();
        shutdown.cancel();
    }

    #[tokio::test]
    async fn silent_worker_times_out_and_is_reaped() {
        let (spawner, bus, _addr, shutdown) = harness(Duration::from_millis(200)).await;
        let mut events = bus.subscribe();

        let err = spawner.spawn(sleeper(&bus)).await.unwrap_err();
        let SpawnError::RelayTimeout { pid, .. } = err else {
            panic!("unexpected error: {err}");
        };
        assert!(!process_exists(pid).await);

        let (mut saw_timeout, mut saw_stopped) = (false, false);
        while let Ok(ev) = events.try_recv() {
            match ev.kind {
                EventKind::RelayTimeout => {
                    assert_eq!(ev.pid, Some(pid));
                    assert_eq!(ev.timeout_ms, Some(200));
                    saw_timeout = true;
                }
                EventKind::WorkerStopped if ev.pid == Some(pid) => saw_stopped = true,
                _ => {}
            }
        }
        assert!(saw_timeout);
        assert!(saw_stopped, "process was not waited on");
        shutdown.cancel();
    }

    #[tokio::test]
    async fn launch_failure_is_a_start_error() {
        let (spawner, bus, _addr, shutdown) = harness(Duration::from_secs(1)).await;
        let worker: ProcessWorker<TcpRelay> = ProcessWorker::new(
            command("/nonexistent/relayvisor-worker", &[]),
            bus,
            Vec::new(),
        );
        let err = spawner.spawn(worker).await.unwrap_err();
        assert_eq!(err.as_label(), "spawn_start_failed");
        shutdown.cancel();
    }

    #[tokio::test]
    async fn exited_worker_fails_fast_with_liveness() {
        let (spawner, bus, _addr, shutdown) = harness(Duration::from_secs(10)).await;
        let worker: ProcessWorker<TcpRelay> =
            ProcessWorker::new(command("true", &[]), bus, Vec::new());

        let started = time::Instant::now();
        let err = spawner
            .spawn_within(&CancellationToken::new(), Duration::from_secs(10), worker)
            .await
            .unwrap_err();
        assert_eq!(err.as_label(), "spawn_process_died");
        assert!(started.elapsed() < Duration::from_secs(3));
        shutdown.cancel();
    }

    #[tokio::test]
    async fn caller_deadline_reaps_the_process() {
        let (spawner, bus, _addr, shutdown) = harness(Duration::from_secs(60)).await;
        let mut events = bus.subscribe();

        let err = spawner
            .spawn_within(&CancellationToken::new(), Duration::from_millis(200), sleeper(&bus))
            .await
            .unwrap_err();
        assert!(matches!(err.cause(), SpawnError::DeadlineExceeded { .. }), "{err}");
        assert!(err.is_canceled());

        let pid = reaped_worker(&mut events, Duration::from_secs(1))
            .await
            .expect("worker stopped before the error was returned");
        assert!(!process_exists(pid).await);
        shutdown.cancel();
    }

    #[tokio::test]
    async fn caller_cancellation_reaps_the_process() {
        let (spawner, bus, _addr, shutdown) = harness(Duration::from_secs(60)).await;
        let mut events = bus.subscribe();

        let ctx = CancellationToken::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_millis(150)).await;
            canceller.cancel();
        });

        let err = spawner
            .spawn_within(&ctx, Duration::from_secs(30), sleeper(&bus))
            .await
            .unwrap_err();
        assert!(matches!(err.cause(), SpawnError::Canceled), "{err}");

        let pid = reaped_worker(&mut events, Duration::from_secs(1))
            .await
            .expect("worker stopped before the error was returned");
        assert!(!process_exists(pid).await);
        shutdown.cancel();
    }

    #[tokio::test]
    async fn abandoned_caller_future_still_reaps_the_process() {
        let (spawner, bus, _addr, shutdown) = harness(Duration::from_secs(60)).await;
        let mut events = bus.subscribe();

        let ctx = CancellationToken::new();
        let gave_up = time::timeout(
            Duration::from_millis(300),
            spawner.spawn_within(&ctx, Duration::from_secs(30), sleeper(&bus)),
        )
        .await;
        assert!(gave_up.is_err(), "spawn finished without a relay");
        assert!(!ctx.is_cancelled(), "caller token is left alone");

        let pid = reaped_worker(&mut events, Duration::from_secs(5))
            .await
            .expect("dropped spawn left its process running");
        assert!(!process_exists(pid).await);
        shutdown.cancel();
    }

    #[tokio::test]
    async fn already_cancelled_caller_never_starts_a_process() {
        let (spawner, bus, _addr, shutdown) = harness(Duration::from_secs(5)).await;
        let ctx = CancellationToken::new();
        ctx.cancel();

        let worker: ProcessWorker<TcpRelay> =
            ProcessWorker::new(command("sleep", &["30"]), bus, Vec::new());
        let err = spawner
            .spawn_within(&ctx, Duration::from_secs(5), worker)
            .await
            .unwrap_err();
        assert!(matches!(err, SpawnError::Canceled));
        shutdown.cancel();
    }
}
