//! GNSS backends

use super::LocationProvider;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;
use tracker_shared::Fix;

/// Receiver replaying a fixed position once enabled
pub struct SimulatedGnss {
    fix: Option<Fix>,
    satellites: u32,
    enabled: AtomicBool,
}

impl SimulatedGnss {
    pub fn new(fix: Option<Fix>, satellites: u32) -> Self {
        Self {
            fix,
            satellites,
            enabled: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl LocationProvider for SimulatedGnss {
    async fn enable(&self) -> Result<()> {
        info!("[GPS] Simulated receiver on");
        self.enabled.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn read_fix(&self) -> Result<Option<Fix>> {
        if !self.enabled.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(self.fix)
    }

    async fn visible_satellite_count(&self) -> Result<u32> {
        if !self.enabled.load(Ordering::SeqCst) {
            return Ok(0);
        }
        Ok(self.satellites)
    }
}
