//! Start-up sequence
//!
//! Solid LED while the agent boots, then block until the data path is
//! confirmed, then power the GNSS receiver. Nothing is reported before
//! connectivity has been verified once.

use crate::connection::ConnectivityManager;
use crate::hal::LocationProvider;
use crate::indicator::StatusIndicator;
use crate::transport::TransportConnector;
use std::time::Duration;
use tracing::{info, warn};

/// What happened during start-up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootSummary {
    /// Failed reachability probes before the link came up
    pub probe_retries: u32,
    pub link_attaches: u64,
    pub gnss_enabled: bool,
}

pub async fn bootstrap<C: TransportConnector>(
    indicator: &StatusIndicator,
    boot_signal: Duration,
    connectivity: &ConnectivityManager<C>,
    location: &dyn LocationProvider,
) -> BootSummary {
    info!("[BOOT] Signalling start-up for {:?}", boot_signal);
    indicator.hold(boot_signal).await;

    let probe_retries = connectivity.establish().await;
    info!(
        "[BOOT] Data link ready after {} failed probe(s)",
        probe_retries
    );

    let gnss_enabled = match location.enable().await {
        Ok(()) => {
            info!("[GPS] Receiver enabled");
            true
        }
        Err(e) => {
            // Keep going: the report cycle treats an idle receiver as no fix
            warn!("[GPS] Failed to enable receiver: {:#}", e);
            false
        }
    };

    BootSummary {
        probe_retries,
        link_attaches: connectivity.attach_count(),
        gnss_enabled,
    }
}
