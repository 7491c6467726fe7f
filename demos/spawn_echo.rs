//! # Demo: spawn_echo
//!
//! Spawns two `echo_worker` processes through one [`SocketFactory`] and talks
//! to each over its own relay.
//!
//! Demonstrates how to:
//! - Build a factory on a loopback TCP listener.
//! - Spawn with and without a caller deadline.
//! - Receive a worker's stderr through a per-worker listener.
//! - Close the factory and read its terminal error.
//!
//! ## Run
//! ```bash
//! cargo build --example echo_worker
//! cargo run --example spawn_echo --features logging
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use relayvisor::{Event, EventKind, FactoryConfig, SocketFactory, Subscribe, Worker};
use tokio::net::TcpListener;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Prints the worker's stderr lines.
struct Stderr;

#[async_trait]
impl Subscribe for Stderr {
    async fn on_event(&self, ev: &Event) {
        if ev.kind == EventKind::WorkerLog {
            println!("[worker {:?}] {}", ev.pid, ev.reason.as_deref().unwrap_or(""));
        }
    }

    fn name(&self) -> &'static str {
        "stderr"
    }
}

fn echo_worker(addr: &str) -> std::io::Result<Command> {
    let mut path: PathBuf = std::env::current_exe()?;
    path.set_file_name("echo_worker");
    let mut cmd = Command::new(path);
    cmd.env("RELAY_ADDR", addr);
    Ok(cmd)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Bind the listener workers connect back to
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?.to_string();

    // 2. Factory-wide subscribers (optional)
    #[cfg(feature = "logging")]
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(relayvisor::LogWriter::new())];
    #[cfg(not(feature = "logging"))]
    let subs: Vec<Arc<dyn Subscribe>> = Vec::new();

    let cfg = FactoryConfig {
        relay_timeout: Duration::from_secs(10),
        ..FactoryConfig::default()
    };
    let (factory, mut errors) = SocketFactory::builder(listener)
        .with_config(cfg)
        .with_subscribers(subs)
        .build();

    // 3. Deadline-only spawn
    let mut first = factory
        .spawn_worker(echo_worker(&addr)?, vec![Arc::new(Stderr)])
        .await?;

    // 4. Spawn bounded by a caller deadline; fails fast if the process dies
    let ctx = CancellationToken::new();
    let mut second = factory
        .spawn_worker_with_timeout(&ctx, Duration::from_secs(5), echo_worker(&addr)?, Vec::new())
        .await?;

    for worker in [&mut first, &mut second] {
        let pid = worker.pid();
        if let Some(relay) = worker.relay_mut() {
            relay.send(b"ping").await?;
            let reply = relay.receive().await?;
            println!("[pid {pid:?}] echoed {:?}", String::from_utf8_lossy(&reply));
        }
    }

    // 5. Tear down
    for mut worker in [first, second] {
        worker.kill().await?;
        worker.wait().await?;
    }
    factory.close()?;
    if let Some(err) = errors.recv().await {
        println!("accept loop stopped: {err}");
    }
    Ok(())
}
