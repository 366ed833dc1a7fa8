mod bootstrap;
mod config;
mod connection;
mod hal;
mod indicator;
mod scheduler;
mod transport;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use crate::config::{AgentConfig, GpioBackend, LinkBackend};
use crate::connection::ConnectivityManager;
use crate::hal::{
    CommandLink, Gpio, LinkProvider, LocationProvider, Pin, SimulatedGnss, SimulatedGpio,
    SimulatedLink, SysfsGpio,
};
use crate::indicator::StatusIndicator;
use crate::scheduler::ReportingScheduler;
use crate::transport::{TcpConnector, TransportClient};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use tracker_shared::ReportEncoder;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config = AgentConfig::load().context("failed to load agent configuration")?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    info!("Tracker agent starting: device {}", config.device.device_id);
    info!(
        "  Server: {} ({} / {})",
        config.server.host_header(),
        config.server.routine_path,
        config.server.emergency_path
    );

    let button = Pin(config.pins.button);
    let led = Pin(config.pins.led);
    let gpio: Arc<dyn Gpio> = match config.pins.backend {
        GpioBackend::Sysfs => Arc::new(
            SysfsGpio::open(&config.pins.sysfs_root, &[button], &[led])
                .context("failed to open GPIO")?,
        ),
        GpioBackend::Simulated => Arc::new(SimulatedGpio::new()),
    };

    let link: Arc<dyn LinkProvider> = match config.link.backend {
        LinkBackend::Command => Arc::new(
            CommandLink::from_command_line(&config.link.attach_command)
                .context("invalid link.attach_command")?,
        ),
        LinkBackend::Simulated => Arc::new(SimulatedLink),
    };
    let location: Arc<dyn LocationProvider> = Arc::new(SimulatedGnss::new(
        config.gps.simulated_fix,
        config.gps.simulated_satellites,
    ));
    info!("  Link: {}, GPIO: {:?}", link.name(), config.pins.backend);

    let connector = Arc::new(TcpConnector::new());
    let connectivity = Arc::new(ConnectivityManager::new(
        config.connectivity(),
        link,
        connector.clone(),
    ));
    let probe = connectivity.config();
    info!("  Probe: {}:{}", probe.probe_host, probe.probe_port);
    let indicator = StatusIndicator::new(gpio.clone(), led);

    let summary = bootstrap::bootstrap(
        &indicator,
        config.boot_signal(),
        &*connectivity,
        location.as_ref(),
    )
    .await;
    info!("Boot complete: {:?}", summary);

    let client = TransportClient::new(
        connector,
        connectivity,
        config.server.host.clone(),
        config.server.port,
        config.send_timeout(),
    );
    let encoder = ReportEncoder::new(config.device.clone(), config.server.clone());

    let mut reporter = ReportingScheduler::new(
        config.scheduler_settings(),
        encoder,
        client,
        location,
        gpio,
        indicator,
    );
    reporter.run().await;

    Ok(())
}
