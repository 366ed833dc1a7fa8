use crate::hal::{Gpio, Pin};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{trace, warn};

/// A fixed on/off blink sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlinkPattern {
    pub count: u32,
    pub on: Duration,
    pub off: Duration,
}

impl BlinkPattern {
    /// Emergency alert handled
    pub const EMERGENCY_ACK: Self = Self::new(6, 200, 200);
    /// Receiver answered with the zero-coordinate sentinel
    pub const INVALID_FIX: Self = Self::new(10, 100, 100);
    /// Receiver had no reading at all
    pub const MISSING_FIX: Self = Self::new(5, 100, 100);

    pub const fn new(count: u32, on_ms: u64, off_ms: u64) -> Self {
        Self {
            count,
            on: Duration::from_millis(on_ms),
            off: Duration::from_millis(off_ms),
        }
    }

    /// Total time the pattern blocks the caller
    pub fn duration(&self) -> Duration {
        (self.on + self.off) * self.count
    }
}

/// Drives the status LED. Patterns run to completion before returning.
pub struct StatusIndicator {
    gpio: Arc<dyn Gpio>,
    pin: Pin,
}

impl StatusIndicator {
    pub fn new(gpio: Arc<dyn Gpio>, pin: Pin) -> Self {
        Self { gpio, pin }
    }

    /// Drive the LED. A failing write is logged and otherwise ignored.
    pub fn set(&self, on: bool) {
        if let Err(e) = self.gpio.write(self.pin, on) {
            warn!("LED write on {} failed: {:#}", self.pin, e);
        }
    }

    pub async fn blink(&self, pattern: BlinkPattern) {
        trace!(
            "LED {}: {} blinks over {:?}",
            self.pin,
            pattern.count,
            pattern.duration()
        );
        for _ in 0..pattern.count {
            self.set(true);
            sleep(pattern.on).await;
            self.set(false);
            sleep(pattern.off).await;
        }
    }

    /// Solid on for `duration`, then off
    pub async fn hold(&self, duration: Duration) {
        self.set(true);
        sleep(duration).await;
        self.set(false);
    }
}
