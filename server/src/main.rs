//! Development collector
//!
//! Accepts tracker reports over plain HTTP, logs them and answers `200 OK`.
//! Listens on `$COLLECTOR_ADDR` (or the first argument), default `0.0.0.0:8080`.

mod session;

use anyhow::{Context, Result};
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_ADDR: &str = "0.0.0.0:8080";

/// Time a client gets to deliver its request
const READ_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let addr = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("COLLECTOR_ADDR").ok())
        .unwrap_or_else(|| DEFAULT_ADDR.to_string());

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Collector listening on {}", addr);

    loop {
        let (socket, peer) = listener.accept().await?;
        debug!("Connection from {}", peer);

        tokio::spawn(async move {
            let result = session::handle_connection(socket, &peer.to_string(), READ_TIMEOUT).await;
            if let Err(e) = result {
                // Already logged by the session
                debug!("[{}] Exchange ended with error: {:#}", peer, e);
            }
        });
    }
}
