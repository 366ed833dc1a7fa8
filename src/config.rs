//! Agent configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional TOML
//! file (`$TRACKER_CONFIG`, default `tracker.toml`), then `TRACKER_*`
//! environment variables with `__` between sections
//! (e.g. `TRACKER_SERVER__HOST`).

use crate::connection::ConnectivityConfig;
use crate::hal::{LinkCredentials, Pin};
use crate::scheduler::SchedulerSettings;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracker_shared::{timing, DeviceIdentity, Fix, NetworkEndpoint};

pub const CONFIG_PATH_VAR: &str = "TRACKER_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "tracker.toml";

/// Longest accepted GPS report interval (one day)
const MAX_REPORT_INTERVAL_SECS: u64 = 86_400;
/// Longest accepted button poll period
const MAX_BUTTON_POLL_MS: u64 = 10_000;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// How the packet-data session is brought up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkBackend {
    /// Run `attach_command`
    Command,
    /// Assume the host is already online
    #[default]
    Simulated,
}

/// Where the button and LED live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpioBackend {
    /// Linux `/sys/class/gpio`
    Sysfs,
    /// In-memory pins
    #[default]
    Simulated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    pub apn: String,
    pub username: String,
    pub password: String,
    pub backend: LinkBackend,
    /// Command line for the `command` backend
    pub attach_command: String,
    pub warmup_ms: u64,
    pub settle_ms: u64,
    /// Defaults to the server host
    pub probe_host: Option<String>,
    /// Defaults to the server port, or 80 when `probe_host` is set
    pub probe_port: Option<u16>,
    pub probe_timeout_ms: u64,
    pub probe_retry_delay_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            apn: "internet".into(),
            username: String::new(),
            password: String::new(),
            backend: LinkBackend::default(),
            attach_command: String::new(),
            warmup_ms: timing::LINK_WARMUP_MS,
            settle_ms: timing::LINK_SETTLE_MS,
            probe_host: None,
            probe_port: None,
            probe_timeout_ms: timing::PROBE_TIMEOUT_MS,
            probe_retry_delay_ms: timing::PROBE_RETRY_DELAY_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpsConfig {
    pub report_interval_secs: u64,
    /// Position replayed by the simulated receiver
    pub simulated_fix: Option<Fix>,
    pub simulated_satellites: u32,
}

impl Default for GpsConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: timing::GPS_REPORT_INTERVAL_SECS,
            simulated_fix: None,
            simulated_satellites: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinConfig {
    /// Emergency button, active low
    pub button: u8,
    pub led: u8,
    pub backend: GpioBackend,
    pub sysfs_root: String,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            button: 6,
            led: 27,
            backend: GpioBackend::default(),
            sysfs_root: "/sys/class/gpio".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    pub send_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            send_timeout_ms: timing::SEND_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub button_poll_ms: u64,
    pub debounce_ms: u64,
    pub boot_signal_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            button_poll_ms: timing::BUTTON_POLL_INTERVAL_MS,
            debounce_ms: timing::EMERGENCY_DEBOUNCE_MS,
            boot_signal_ms: timing::BOOT_SIGNAL_MS,
        }
    }
}

/// Resend policy for emergency alerts
///
/// `retries = 0` drops a failed alert, leaving a new button press as the only
/// way to raise it again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyPolicy {
    pub retries: u32,
    pub retry_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for EmergencyPolicy {
    fn default() -> Self {
        Self {
            retries: 0,
            retry_backoff_ms: 2_000,
            max_backoff_ms: 30_000,
        }
    }
}

impl EmergencyPolicy {
    /// Wait before retry number `retry` (1-based): doubles each time, capped
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64 << retry.saturating_sub(1).min(16);
        let delay = self.retry_backoff_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_backoff_ms))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub device: DeviceIdentity,
    pub server: NetworkEndpoint,
    pub link: LinkConfig,
    pub gps: GpsConfig,
    pub pins: PinConfig,
    pub transport: TransportConfig,
    pub scheduler: SchedulerConfig,
    pub emergency: EmergencyPolicy,
    /// Log level (trace, debug, info, warn, error), overridden by RUST_LOG
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            device: DeviceIdentity::new("tracker-001", "unassigned"),
            server: NetworkEndpoint {
                host: "127.0.0.1".into(),
                port: 8080,
                routine_path: "/update_location".into(),
                emergency_path: "/emergency".into(),
            },
            link: LinkConfig::default(),
            gps: GpsConfig::default(),
            pins: PinConfig::default(),
            transport: TransportConfig::default(),
            scheduler: SchedulerConfig::default(),
            emergency: EmergencyPolicy::default(),
            log_level: "info".into(),
        }
    }
}

impl AgentConfig {
    /// Load from the file named by `$TRACKER_CONFIG` (if present) and the environment
    pub fn load() -> Result<Self, ConfigError> {
        let path =
            std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(&path)
    }

    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        let config: AgentConfig = Config::builder()
            .add_source(Config::try_from(&AgentConfig::default())?)
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("TRACKER")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_identifier("device.device_id", &self.device.device_id)?;
        validate_identifier("device.user_id", &self.device.user_id)?;

        if self.server.host.trim().is_empty() {
            return Err(ConfigError::Invalid("server.host is empty".into()));
        }
        for (name, path) in [
            ("server.routine_path", &self.server.routine_path),
            ("server.emergency_path", &self.server.emergency_path),
        ] {
            if !path.starts_with('/') {
                return Err(ConfigError::Invalid(format!(
                    "{} must start with '/': {:?}",
                    name, path
                )));
            }
        }

        for (name, value) in [
            ("gps.report_interval_secs", self.gps.report_interval_secs),
            ("scheduler.button_poll_ms", self.scheduler.button_poll_ms),
            ("transport.send_timeout_ms", self.transport.send_timeout_ms),
            ("link.probe_timeout_ms", self.link.probe_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be non-zero", name)));
            }
        }

        for (name, value, max) in [
            (
                "gps.report_interval_secs",
                self.gps.report_interval_secs,
                MAX_REPORT_INTERVAL_SECS,
            ),
            (
                "scheduler.button_poll_ms",
                self.scheduler.button_poll_ms,
                MAX_BUTTON_POLL_MS,
            ),
        ] {
            if value > max {
                return Err(ConfigError::Invalid(format!(
                    "{} must be at most {}, got {}",
                    name, max, value
                )));
            }
        }

        if self.link.backend == LinkBackend::Command && self.link.attach_command.trim().is_empty()
        {
            return Err(ConfigError::Invalid(
                "link.attach_command is required for the command backend".into(),
            ));
        }

        Ok(())
    }

    pub fn credentials(&self) -> LinkCredentials {
        LinkCredentials {
            apn: self.link.apn.clone(),
            username: self.link.username.clone(),
            password: self.link.password.clone(),
        }
    }

    pub fn connectivity(&self) -> ConnectivityConfig {
        ConnectivityConfig {
            credentials: self.credentials(),
            warmup: Duration::from_millis(self.link.warmup_ms),
            settle: Duration::from_millis(self.link.settle_ms),
            probe_host: self
                .link
                .probe_host
                .clone()
                .unwrap_or_else(|| self.server.host.clone()),
            probe_port: self.probe_port(),
            probe_timeout: Duration::from_millis(self.link.probe_timeout_ms),
            probe_retry_delay: Duration::from_millis(self.link.probe_retry_delay_ms),
        }
    }

    fn probe_port(&self) -> u16 {
        match (&self.link.probe_host, self.link.probe_port) {
            (_, Some(port)) => port,
            (Some(_), None) => 80,
            (None, None) => self.server.port,
        }
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            button_pin: Pin(self.pins.button),
            gps_interval: Duration::from_secs(self.gps.report_interval_secs),
            button_poll_interval: Duration::from_millis(self.scheduler.button_poll_ms),
            debounce: Duration::from_millis(self.scheduler.debounce_ms),
            emergency: self.emergency.clone(),
        }
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.transport.send_timeout_ms)
    }

    pub fn boot_signal(&self) -> Duration {
        Duration::from_millis(self.scheduler.boot_signal_ms)
    }
}

/// Identifiers go on the wire unencoded, so they must not need encoding
fn validate_identifier(name: &str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Invalid(format!("{} is empty", name)));
    }
    let bad = |c: char| {
        !c.is_ascii() || c.is_ascii_control() || c.is_ascii_whitespace() || c == '&' || c == '='
    };
    if value.chars().any(bad) {
        return Err(ConfigError::Invalid(format!(
            "{} contains characters that need URL encoding: {:?}",
            name, value
        )));
    }
    Ok(())
}
