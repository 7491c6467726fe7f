//! # ProcessWorker: a worker backed by a `tokio::process::Child`.
//!
//! - stderr is piped and every line is emitted as [`EventKind::WorkerLog`]
//! - the child is killed if the worker is dropped (`kill_on_drop`)
//! - state changes are emitted to the worker's own listeners and to the factory bus

use std::fmt;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};

use super::{Worker, WorkerState};
use crate::error::WorkerError;
use crate::events::{Bus, Event, EventKind};
use crate::subscribers::{Subscribe, SubscriberSet};

/// Delivers worker-scoped events to the worker's listeners and to the bus.
#[derive(Clone)]
struct WorkerEvents {
    bus: Bus,
    listeners: Arc<SubscriberSet>,
}

impl WorkerEvents {
    fn emit(&self, ev: Event) {
        self.listeners.emit(&ev);
        self.bus.publish(ev);
    }
}

/// Worker process launched from a [`Command`].
pub struct ProcessWorker<R> {
    cmd: Command,
    child: Option<Child>,
    pid: Option<u32>,
    state: WorkerState,
    relay: Option<R>,
    events: WorkerEvents,
}

impl<R> ProcessWorker<R> {
    /// Prepares a worker; nothing is launched until [`Worker::start`].
    ///
    /// `listeners` receive this worker's events only. Must be called from within
    /// a Tokio runtime when `listeners` is non-empty.
    pub fn new(mut cmd: Command, bus: Bus, listeners: Vec<Arc<dyn Subscribe>>) -> Self {
        cmd.stderr(Stdio::piped()).kill_on_drop(true);
        let listeners = Arc::new(SubscriberSet::new(listeners, bus.clone()));
        Self {
            cmd,
            child: None,
            pid: None,
            state: WorkerState::Inactive,
            relay: None,
            events: WorkerEvents { bus, listeners },
        }
    }

    /// Attached relay, once the worker is ready.
    pub fn relay(&self) -> Option<&R> {
        self.relay.as_ref()
    }

    /// Mutable access to the attached relay.
    pub fn relay_mut(&mut self) -> Option<&mut R> {
        self.relay.as_mut()
    }

    /// Detaches the relay, leaving the worker without one.
    pub fn take_relay(&mut self) -> Option<R> {
        self.relay.take()
    }

    fn event(&self, kind: EventKind) -> Event {
        let ev = Event::new(kind);
        match self.pid {
            Some(pid) => ev.with_pid(pid),
            None => ev,
        }
    }

    fn forward_stderr(&self, stderr: ChildStderr) {
        let events = self.events.clone();
        let pid = self.pid;
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let mut ev = Event::new(EventKind::WorkerLog).with_reason(line);
                        if let Some(pid) = pid {
                            ev = ev.with_pid(pid);
                        }
                        events.emit(ev);
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::debug!(?pid, error = %e, "worker stderr closed");
                        break;
                    }
                }
            }
        });
    }
}

impl<R> fmt::Debug for ProcessWorker<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessWorker")
            .field("pid", &self.pid)
            .field("state", &self.state)
            .field("relay", &self.relay.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<R: Send + 'static> Worker for ProcessWorker<R> {
    type Relay = R;

    fn pid(&self) -> Option<u32> {
        self.pid
    }

    async fn start(&mut self) -> Result<(), WorkerError> {
        if self.child.is_some() {
            return Err(WorkerError::AlreadyStarted);
        }
        let mut child = self.cmd.spawn().map_err(WorkerError::Launch)?;
        self.pid = child.id();
        let stderr = child.stderr.take();
        self.child = Some(child);

        if let Some(stderr) = stderr {
            self.forward_stderr(stderr);
        }
        self.set_state(WorkerState::Started);
        Ok(())
    }

    async fn kill(&mut self) -> Result<(), WorkerError> {
        let pid = self.pid.unwrap_or_default();
        let child = self.child.as_mut().ok_or(WorkerError::NotStarted)?;
        child
            .start_kill()
            .map_err(|source| WorkerError::Kill { pid, source })?;
        self.set_state(WorkerState::Killed);
        Ok(())
    }

    async fn wait(&mut self) -> Result<ExitStatus, WorkerError> {
        let pid = self.pid.unwrap_or_default();
        let child = self.child.as_mut().ok_or(WorkerError::NotStarted)?;
        let status = child
            .wait()
            .await
            .map_err(|source| WorkerError::Wait { pid, source })?;

        if self.state != WorkerState::Killed {
            self.set_state(if status.success() {
                WorkerState::Stopped
            } else {
                WorkerState::Errored
            });
        }
        let ev = self
            .event(EventKind::WorkerStopped)
            .with_reason(status.to_string());
        self.events.emit(ev);
        Ok(status)
    }

    fn attach_relay(&mut self, relay: R) {
        self.relay = Some(relay);
    }

    fn state(&self) -> WorkerState {
        self.state
    }

    fn set_state(&mut self, state: WorkerState) {
        self.state = state;
        let kind = match state {
            WorkerState::Started => EventKind::WorkerStarted,
            WorkerState::Ready => EventKind::WorkerReady,
            WorkerState::Killed => EventKind::WorkerKilled,
            _ => return,
        };
        let ev = self.event(kind);
        self.events.emit(ev);
    }
}
