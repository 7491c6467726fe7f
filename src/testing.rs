//! Shared helpers for unit tests: real processes, loopback listeners and a
//! worker that connects back to the factory on behalf of its process.

use std::net::SocketAddr;
use std::process::ExitStatus;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tokio::process::Command;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::error::WorkerError;
use crate::events::{Bus, Event, EventKind};
use crate::relay::{SocketRelay, announce_pid};
use crate::subscribers::Subscribe;
use crate::worker::{ProcessWorker, Worker, WorkerState};

pub(crate) type TcpRelay = SocketRelay<TcpStream>;

pub(crate) fn command(program: &str, args: &[&str]) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd
}

pub(crate) async fn loopback() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Pid of the first worker started on `events`, once its `WorkerStopped`
/// arrives. `wait` publishes that event only after the process was reaped.
pub(crate) async fn reaped_worker(
    events: &mut broadcast::Receiver<Event>,
    within: Duration,
) -> Option<u32> {
    let deadline = tokio::time::Instant::now() + within;
    let mut started = None;
    loop {
        let ev = match tokio::time::timeout_at(deadline, events.recv()).await {
            Ok(Ok(ev)) => ev,
            Ok(Err(RecvError::Lagged(_))) => continue,
            _ => return None,
        };
        match ev.kind {
            EventKind::WorkerStarted if started.is_none() => started = ev.pid,
            EventKind::WorkerStopped if started.is_some() && ev.pid == started => {
                return started;
            }
            _ => {}
        }
    }
}

/// Records every event it sees.
#[derive(Default)]
pub(crate) struct Collector {
    events: Mutex<Vec<Event>>,
}

impl Collector {
    pub(crate) fn kinds(&self) -> Vec<EventKind> {
        self.events.lock().unwrap().iter().map(|e| e.kind).collect()
    }

    pub(crate) async fn wait_for(&self, kind: EventKind, within: Duration) -> Option<Event> {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            if let Some(ev) = self
                .events
                .lock()
                .unwrap()
                .iter()
                .find(|e| e.kind == kind)
                .cloned()
            {
                return Some(ev);
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[async_trait]
impl Subscribe for Collector {
    async fn on_event(&self, event: &Event) {
        self.events.lock().unwrap().push(event.clone());
    }

    fn name(&self) -> &'static str {
        "collector"
    }
}

/// Worker whose process (`sleep 30`) is "connected" by a helper task.
///
/// After `delay` the helper dials `addr`, announces the process pid and sends
/// one `hello from <pid>` frame, then keeps the connection open.
#[derive(Debug)]
pub(crate) struct ConnectingWorker {
    inner: ProcessWorker<TcpRelay>,
    addr: SocketAddr,
    delay: Duration,
    client: Option<JoinHandle<()>>,
}

impl ConnectingWorker {
    pub(crate) fn new(addr: SocketAddr, delay: Duration) -> Self {
        Self {
            inner: ProcessWorker::new(command("sleep", &["30"]), Bus::new(16), Vec::new()),
            addr,
            delay,
            client: None,
        }
    }

    pub(crate) fn relay_mut(&mut self) -> Option<&mut TcpRelay> {
        self.inner.relay_mut()
    }
}

#[async_trait]
impl Worker for ConnectingWorker {
    type Relay = TcpRelay;

    fn pid(&self) -> Option<u32> {
        self.inner.pid()
    }

    async fn start(&mut self) -> Result<(), WorkerError> {
        self.inner.start().await?;
        let pid = self.inner.pid().ok_or(WorkerError::NotStarted)?;
        let (addr, delay) = (self.addr, self.delay);
        self.client = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Ok(stream) = TcpStream::connect(addr).await else {
                return;
            };
            let mut relay = SocketRelay::new(stream);
            if announce_pid(&mut relay, pid).await.is_err() {
                return;
            }
            let _ = relay.send(format!("hello from {pid}").as_bytes()).await;
            tokio::time::sleep(Duration::from_secs(30)).await;
        }));
        Ok(())
    }

    async fn kill(&mut self) -> Result<(), WorkerError> {
        if let Some(client) = self.client.take() {
            client.abort();
        }
        self.inner.kill().await
    }

    async fn wait(&mut self) -> Result<ExitStatus, WorkerError> {
        self.inner.wait().await
    }

    fn attach_relay(&mut self, relay: TcpRelay) {
        self.inner.attach_relay(relay);
    }

    fn state(&self) -> WorkerState {
        self.inner.state()
    }

    fn set_state(&mut self, state: WorkerState) {
        self.inner.set_state(state);
    }
}

/// Dials `addr` and sends a frame that is not a pid handshake.
pub(crate) async fn connect_garbage(addr: SocketAddr) -> TcpRelay {
    let stream = TcpStream::connect(addr).await.unwrap();
    let mut relay = SocketRelay::new(stream);
    relay.send(b"not a handshake").await.unwrap();
    relay
}

/// Dials `addr` and announces `pid`.
pub(crate) async fn connect_as(addr: SocketAddr, pid: u32) -> TcpRelay {
    let stream = TcpStream::connect(addr).await.unwrap();
    let mut relay = SocketRelay::new(stream);
    announce_pid(&mut relay, pid).await.unwrap();
    relay
}
