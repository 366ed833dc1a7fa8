//! Connectivity manager: link attach, reachability probe and boot-time retry

use crate::hal::{LinkCredentials, LinkProvider};
use crate::transport::client::{connect_within, io_within, release};
use crate::transport::TransportConnector;
use anyhow::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::sleep;
use tracing::{debug, info, warn};
use tracker_shared::timing;

/// Configuration for the connectivity manager
#[derive(Debug, Clone)]
pub struct ConnectivityConfig {
    pub credentials: LinkCredentials,
    /// Wait before each attach (modem start-up latency)
    pub warmup: Duration,
    /// Wait after each attach
    pub settle: Duration,
    /// Host probed to confirm the data path
    pub probe_host: String,
    pub probe_port: u16,
    pub probe_timeout: Duration,
    /// Delay between failed probes at boot
    pub probe_retry_delay: Duration,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            credentials: LinkCredentials {
                apn: "internet".into(),
                username: String::new(),
                password: String::new(),
            },
            warmup: Duration::from_millis(timing::LINK_WARMUP_MS),
            settle: Duration::from_millis(timing::LINK_SETTLE_MS),
            probe_host: "127.0.0.1".into(),
            probe_port: 80,
            probe_timeout: Duration::from_millis(timing::PROBE_TIMEOUT_MS),
            probe_retry_delay: Duration::from_millis(timing::PROBE_RETRY_DELAY_MS),
        }
    }
}

/// Establishes and repairs the cellular data link
pub struct ConnectivityManager<C: TransportConnector> {
    config: ConnectivityConfig,
    link: Arc<dyn LinkProvider>,
    connector: Arc<C>,
    attaches: AtomicU64,
}

impl<C: TransportConnector> ConnectivityManager<C> {
    pub fn new(config: ConnectivityConfig, link: Arc<dyn LinkProvider>, connector: Arc<C>) -> Self {
        Self {
            config,
            link,
            connector,
            attaches: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &ConnectivityConfig {
        &self.config
    }

    /// Number of attach requests issued so far
    pub fn attach_count(&self) -> u64 {
        self.attaches.load(Ordering::SeqCst)
    }

    /// Request the packet-data session
    ///
    /// Attach failures are logged only; they surface later as probe or
    /// transport failures.
    pub async fn attach_link(&self) {
        sleep(self.config.warmup).await;

        let attempt = self.attaches.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            "[LINK] Starting packet data with APN {:?} via {} (attach #{})",
            self.config.credentials.apn,
            self.link.name(),
            attempt
        );
        if let Err(e) = self.link.attach(&self.config.credentials).await {
            warn!("[LINK] Attach #{} failed: {:#}", attempt, e);
        }

        sleep(self.config.settle).await;
    }

    /// Minimal HTTP round trip confirming the data path works
    pub async fn verify_reachability(&self, probe_host: &str) -> bool {
        match self.probe(probe_host).await {
            Ok(n) => {
                debug!("[LINK] Probe of {} read {} bytes", probe_host, n);
                true
            }
            Err(e) => {
                warn!("[LINK] Connectivity check failed: {:#}", e);
                false
            }
        }
    }

    async fn probe(&self, probe_host: &str) -> Result<usize> {
        let limit = self.config.probe_timeout;
        let mut stream = connect_within(
            self.connector.as_ref(),
            probe_host,
            self.config.probe_port,
            limit,
        )
        .await?;

        let request = format!("GET / HTTP/1.0\r\nHost: {}\r\n\r\n", probe_host);
        let mut chunk = [0u8; timing::PROBE_CHUNK_BYTES];

        let result: Result<usize> = async {
            io_within(limit, "probe send", stream.write_all(request.as_bytes())).await?;
            io_within(limit, "probe recv", stream.read(&mut chunk)).await
        }
        .await;

        release(&mut stream).await;
        result
    }

    /// Boot policy: attach, then probe until reachable, re-attaching between attempts
    ///
    /// Returns the number of failed probes.
    pub async fn establish(&self) -> u32 {
        self.attach_link().await;

        let mut retries = 0;
        while !self.verify_reachability(&self.config.probe_host).await {
            retries += 1;
            info!(
                "[LINK] No connectivity yet. Retry {} in {:?}...",
                retries, self.config.probe_retry_delay
            );
            sleep(self.config.probe_retry_delay).await;
            self.attach_link().await;
        }

        info!("[LINK] Internet reachable");
        retries
    }
}
