//! Tracker Shared Types
//!
//! This crate provides the wire types, report codec and reporting schedule
//! shared between the tracker agent and the development collector.

pub mod codec;
pub mod schedule;

use serde::{Deserialize, Serialize};

pub use codec::{CodecError, EncodedReport, PostRequest, Report, ReportEncoder, RequestDecoder};
pub use schedule::ReportSchedule;

/// Timing parameters for the reporting loop
pub mod timing {
    /// Interval between GPS report cycles
    pub const GPS_REPORT_INTERVAL_SECS: u64 = 60;

    /// Button poll period (bounds emergency detection latency)
    pub const BUTTON_POLL_INTERVAL_MS: u64 = 100;

    /// Pause after an emergency acknowledgement before polling again
    pub const EMERGENCY_DEBOUNCE_MS: u64 = 500;

    /// Socket timeout for routine and emergency sends
    pub const SEND_TIMEOUT_MS: u64 = 20_000;

    /// Socket timeout for the reachability probe
    pub const PROBE_TIMEOUT_MS: u64 = 10_000;

    /// Modem warm-up before issuing a link attach
    pub const LINK_WARMUP_MS: u64 = 60_000;

    /// Settle time after a link attach
    pub const LINK_SETTLE_MS: u64 = 5_000;

    /// Delay between failed reachability probes at boot
    pub const PROBE_RETRY_DELAY_MS: u64 = 5_000;

    /// Solid LED on at boot
    pub const BOOT_SIGNAL_MS: u64 = 3_000;

    /// Chunk size used when draining a response
    pub const RESPONSE_CHUNK_BYTES: usize = 512;

    /// Chunk size read by the reachability probe
    pub const PROBE_CHUNK_BYTES: usize = 64;
}

/// Static identifiers embedded verbatim into every report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub device_id: String,
    pub user_id: String,
}

impl DeviceIdentity {
    pub fn new(device_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            user_id: user_id.into(),
        }
    }
}

/// Where reports are delivered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkEndpoint {
    pub host: String,
    pub port: u16,
    /// Path receiving routine location reports
    pub routine_path: String,
    /// Path receiving emergency alerts
    pub emergency_path: String,
}

impl NetworkEndpoint {
    /// Value for the `Host` header (port omitted when it is the HTTP default)
    pub fn host_header(&self) -> String {
        if self.port == 80 {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// A single GPS coordinate pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    pub latitude: f64,
    pub longitude: f64,
}

impl Fix {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// A zero coordinate is the receiver's cold-start sentinel
    pub fn is_acquired(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude != 0.0
            && self.longitude != 0.0
    }
}

/// Classification of one location reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FixStatus {
    /// Fix acquired, may be transmitted
    Valid(Fix),
    /// Reading present but carries the zero sentinel or non-finite values
    Invalid(Fix),
    /// No reading, or the provider failed to produce one
    Missing,
}

impl FixStatus {
    pub fn classify(reading: Option<Fix>) -> Self {
        match reading {
            Some(fix) if fix.is_acquired() => FixStatus::Valid(fix),
            Some(fix) => FixStatus::Invalid(fix),
            None => FixStatus::Missing,
        }
    }
}
