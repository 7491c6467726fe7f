//! # Demo: echo_worker
//!
//! Worker side of the relay protocol. Connects to `RELAY_ADDR`, announces its
//! pid and echoes every frame back until the parent closes the connection.
//!
//! ## Flow
//! ```text
//! TcpStream::connect(RELAY_ADDR)
//!     ├─► announce_pid(std::process::id())
//!     └─► loop { receive() ─► send() }
//! ```
//!
//! Started by the `spawn_echo` demo; not meant to be run by hand.

use relayvisor::{SocketRelay, announce_pid};
use tokio::net::TcpStream;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let addr = std::env::var("RELAY_ADDR")?;
    let stream = TcpStream::connect(&addr).await?;
    let mut relay = SocketRelay::new(stream);

    announce_pid(&mut relay, std::process::id()).await?;
    eprintln!("connected to {addr}");

    while let Ok(frame) = relay.receive().await {
        relay.send(&frame).await?;
    }
    Ok(())
}
