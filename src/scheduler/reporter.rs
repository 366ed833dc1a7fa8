//! Reporting Scheduler
//!
//! A single cooperative loop driving two timers: the emergency button poll
//! (every 100 ms by default) and the GPS report cycle (every 60 s). Each tick
//! runs whichever activities are due, strictly in sequence, then waits for
//! the next due time. Network sends and LED patterns run to completion inside
//! the tick, so they delay the next button poll.

use crate::config::EmergencyPolicy;
use crate::hal::{Gpio, LocationProvider, Pin};
use crate::indicator::{BlinkPattern, StatusIndicator};
use crate::transport::{TransportClient, TransportConnector};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info, warn};
use tracker_shared::{Fix, FixStatus, ReportEncoder, ReportSchedule};

/// Timing and policy for the reporting loop
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Emergency button, active low
    pub button_pin: Pin,
    pub gps_interval: Duration,
    pub button_poll_interval: Duration,
    /// Pause after the emergency acknowledgement
    pub debounce: Duration,
    pub emergency: EmergencyPolicy,
}

/// Result of handling a button press
#[derive(Debug, Clone, PartialEq)]
pub enum EmergencyOutcome {
    Delivered { attempts: u32 },
    /// Every attempt failed; the alert is lost
    Dropped { attempts: u32 },
}

/// Result of one GPS report cycle
#[derive(Debug, Clone, PartialEq)]
pub enum GpsOutcome {
    Delivered(Fix),
    SendFailed(Fix),
    InvalidFix(Fix),
    MissingFix,
}

/// What ran during one tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub emergency: Option<EmergencyOutcome>,
    pub gps: Option<GpsOutcome>,
}

fn clock() -> std::time::Instant {
    Instant::now().into_std()
}

pub struct ReportingScheduler<C: TransportConnector> {
    settings: SchedulerSettings,
    encoder: ReportEncoder,
    client: TransportClient<C>,
    location: Arc<dyn LocationProvider>,
    gpio: Arc<dyn Gpio>,
    indicator: StatusIndicator,
    schedule: ReportSchedule,
}

impl<C: TransportConnector> ReportingScheduler<C> {
    pub fn new(
        settings: SchedulerSettings,
        encoder: ReportEncoder,
        client: TransportClient<C>,
        location: Arc<dyn LocationProvider>,
        gpio: Arc<dyn Gpio>,
        indicator: StatusIndicator,
    ) -> Self {
        let schedule = ReportSchedule::new(
            clock(),
            settings.gps_interval,
            settings.button_poll_interval,
        );

        Self {
            settings,
            encoder,
            client,
            location,
            gpio,
            indicator,
            schedule,
        }
    }

    #[cfg(test)]
    pub fn schedule(&self) -> &ReportSchedule {
        &self.schedule
    }

    /// Run forever
    pub async fn run(&mut self) {
        info!(
            "Reporting loop started: button every {:?}, GPS every {:?}",
            self.settings.button_poll_interval, self.settings.gps_interval
        );

        loop {
            let report = self.tick().await;
            if report != TickReport::default() {
                debug!("Tick: {:?}", report);
            }
            sleep_until(Instant::from_std(self.schedule.next_due())).await;
        }
    }

    /// Run every activity that is due now
    pub async fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();

        let now = clock();
        if self.schedule.is_button_poll_due(now) {
            self.schedule.mark_button_polled(now);
            report.emergency = self.check_emergency().await;
        }

        let now = clock();
        if self.schedule.is_gps_report_due(now) {
            report.gps = Some(self.run_gps_cycle(now).await);
        }

        report
    }

    async fn check_emergency(&mut self) -> Option<EmergencyOutcome> {
        let pressed = match self.gpio.read(self.settings.button_pin) {
            Ok(level) => !level,
            Err(e) => {
                warn!("[EMERGENCY] Button read failed: {:#}", e);
                false
            }
        };
        if !pressed {
            return None;
        }

        warn!("[EMERGENCY] Button pressed, sending identity-only alert");
        let outcome = self.send_emergency().await;

        self.indicator.blink(BlinkPattern::EMERGENCY_ACK).await;
        sleep(self.settings.debounce).await;

        Some(outcome)
    }

    async fn send_emergency(&self) -> EmergencyOutcome {
        let report = self.encoder.encode_emergency();
        let policy = &self.settings.emergency;
        let mut attempts = 0;

        loop {
            attempts += 1;
            if self.client.post(&report).await {
                info!("[EMERGENCY] Alert sent (attempt {})", attempts);
                return EmergencyOutcome::Delivered { attempts };
            }

            if attempts > policy.retries {
                warn!(
                    "[EMERGENCY] Alert failed after {} attempt(s) and was dropped",
                    attempts
                );
                return EmergencyOutcome::Dropped { attempts };
            }

            let backoff = policy.backoff(attempts);
            warn!(
                "[EMERGENCY] Alert failed, retry {}/{} in {:?}",
                attempts, policy.retries, backoff
            );
            sleep(backoff).await;
        }
    }

    async fn run_gps_cycle(&mut self, now: std::time::Instant) -> GpsOutcome {
        let reading = match self.location.read_fix().await {
            Ok(reading) => reading,
            Err(e) => {
                warn!("[GPS] Location read failed: {:#}", e);
                None
            }
        };
        match self.location.visible_satellite_count().await {
            Ok(count) => info!("[GPS] Location: {:?}, satellites visible: {}", reading, count),
            Err(e) => info!("[GPS] Location: {:?}, satellites unknown: {:#}", reading, e),
        }

        let outcome = match FixStatus::classify(reading) {
            FixStatus::Valid(fix) => {
                self.indicator.set(true);
                let report = self.encoder.encode_routine(&fix);
                if self.client.post(&report).await {
                    GpsOutcome::Delivered(fix)
                } else {
                    GpsOutcome::SendFailed(fix)
                }
            }
            FixStatus::Invalid(fix) => {
                warn!("[GPS] No valid fix yet ({:?})", fix);
                self.indicator.blink(BlinkPattern::INVALID_FIX).await;
                GpsOutcome::InvalidFix(fix)
            }
            FixStatus::Missing => {
                warn!("[GPS] No location available");
                self.indicator.blink(BlinkPattern::MISSING_FIX).await;
                GpsOutcome::MissingFix
            }
        };

        self.indicator.set(false);
        self.schedule.mark_gps_reported(now);
        outcome
    }
}
