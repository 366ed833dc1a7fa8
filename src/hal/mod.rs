//! Hardware abstraction
//!
//! Narrow traits for the collaborators the agent drives: the cellular data
//! link, the GNSS receiver and digital I/O. Concrete backends:
//! - `SysfsGpio` / `SimulatedGpio` for the button and LED
//! - `CommandLink` / `SimulatedLink` for the packet-data attach
//! - `SimulatedGnss` for location readings

mod gnss;
mod gpio;
mod link;

pub use gnss::SimulatedGnss;
pub use gpio::{SimulatedGpio, SysfsGpio};
pub use link::{CommandLink, SimulatedLink};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracker_shared::Fix;

/// A digital I/O line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pin(pub u8);

impl std::fmt::Display for Pin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GPIO{}", self.0)
    }
}

/// Credentials for the cellular packet-data session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkCredentials {
    pub apn: String,
    pub username: String,
    pub password: String,
}

/// Brings up the cellular packet-data session
#[async_trait]
pub trait LinkProvider: Send + Sync {
    /// Request the session. Success only means the request was issued.
    async fn attach(&self, credentials: &LinkCredentials) -> Result<()>;

    /// Human-readable name for this backend
    fn name(&self) -> &'static str;
}

/// GNSS receiver
#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Power on the receiver
    async fn enable(&self) -> Result<()>;

    /// Latest fix, `None` when the receiver has nothing to report
    async fn read_fix(&self) -> Result<Option<Fix>>;

    async fn visible_satellite_count(&self) -> Result<u32>;
}

/// Digital I/O. `true` is electrical high.
pub trait Gpio: Send + Sync {
    fn read(&self, pin: Pin) -> Result<bool>;

    fn write(&self, pin: Pin, high: bool) -> Result<()>;
}
