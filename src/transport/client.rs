//! One-shot HTTP transport client
//!
//! Every report opens its own connection: connect, send the whole request,
//! drain the response until the peer closes, close. A failure anywhere
//! releases the stream and asks the connectivity manager to repair the link.

use crate::connection::ConnectivityManager;
use crate::transport::traits::{TransportConnector, TransportStream};
use anyhow::{bail, Context, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};
use tracker_shared::{timing, EncodedReport};

/// Connect through `connector`, bounded by `limit`
pub(crate) async fn connect_within<C: TransportConnector>(
    connector: &C,
    host: &str,
    port: u16,
    limit: Duration,
) -> Result<C::Stream> {
    match timeout(limit, connector.connect(host, port)).await {
        Ok(result) => result,
        Err(_) => bail!("connect to {}:{} timed out after {:?}", host, port, limit),
    }
}

/// Run one socket operation, bounded by `limit`
pub(crate) async fn io_within<T>(
    limit: Duration,
    what: &str,
    op: impl Future<Output = std::io::Result<T>>,
) -> Result<T> {
    match timeout(limit, op).await {
        Ok(result) => result.with_context(|| format!("{} failed", what)),
        Err(_) => bail!("{} timed out after {:?}", what, limit),
    }
}

/// Best-effort close. A failing close never replaces the exchange outcome.
pub(crate) async fn release<S: TransportStream>(stream: &mut S) {
    if let Err(e) = stream.close().await {
        debug!("[HTTP] Ignoring close error: {:#}", e);
    }
}

/// Sends encoded reports to the server
pub struct TransportClient<C: TransportConnector> {
    connector: Arc<C>,
    connectivity: Arc<ConnectivityManager<C>>,
    host: String,
    port: u16,
    send_timeout: Duration,
}

impl<C: TransportConnector> TransportClient<C> {
    pub fn new(
        connector: Arc<C>,
        connectivity: Arc<ConnectivityManager<C>>,
        host: impl Into<String>,
        port: u16,
        send_timeout: Duration,
    ) -> Self {
        Self {
            connector,
            connectivity,
            host: host.into(),
            port,
            send_timeout,
        }
    }

    /// POST a report. Returns true only if the full exchange completed.
    ///
    /// On failure the link is re-attached before returning; the report is
    /// not resent.
    pub async fn post(&self, report: &EncodedReport) -> bool {
        match self.exchange(&report.request).await {
            Ok(received) => {
                info!(
                    "[HTTP] POST {} delivered ({} response bytes)",
                    report.path, received
                );
                true
            }
            Err(e) => {
                warn!(
                    "[HTTP] POST {} over {} failed: {:#}",
                    report.path,
                    self.connector.name(),
                    e
                );
                self.connectivity.attach_link().await;
                false
            }
        }
    }

    async fn exchange(&self, request: &[u8]) -> Result<usize> {
        let mut stream = connect_within(
            self.connector.as_ref(),
            &self.host,
            self.port,
            self.send_timeout,
        )
        .await?;

        let result = self.send_and_drain(&mut stream, request).await;
        release(&mut stream).await;
        result
    }

    async fn send_and_drain(&self, stream: &mut C::Stream, request: &[u8]) -> Result<usize> {
        io_within(self.send_timeout, "send", stream.write_all(request)).await?;
        io_within(self.send_timeout, "flush", stream.flush()).await?;

        let mut chunk = [0u8; timing::RESPONSE_CHUNK_BYTES];
        let mut received = 0;
        loop {
            let n = io_within(self.send_timeout, "recv", stream.read(&mut chunk)).await?;
            if n == 0 {
                break;
            }
            trace!("[HTTP] Drained {} bytes", n);
            received += n;
        }
        Ok(received)
    }
}
