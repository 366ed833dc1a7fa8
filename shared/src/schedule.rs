//! Report Schedule
//!
//! Tracks the two timers driving the reporting loop: the button poll and the
//! GPS report. Both are advanced from a monotonic clock supplied by the
//! caller, so the schedule itself never reads the time.

use std::time::{Duration, Instant};

/// Deadline used when `now + interval` does not fit in an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

fn deadline(now: Instant, interval: Duration) -> Instant {
    now.checked_add(interval)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// Due times for the button poll and the GPS report cycle
#[derive(Debug, Clone)]
pub struct ReportSchedule {
    gps_interval: Duration,
    button_poll_interval: Duration,
    button_poll_due: Instant,
    gps_report_due: Instant,
    last_gps_report: Option<Instant>,
}

impl ReportSchedule {
    /// Create a schedule whose first button poll and first GPS cycle are due immediately
    pub fn new(now: Instant, gps_interval: Duration, button_poll_interval: Duration) -> Self {
        Self {
            gps_interval,
            button_poll_interval,
            button_poll_due: now,
            gps_report_due: now,
            last_gps_report: None,
        }
    }

    pub fn gps_interval(&self) -> Duration {
        self.gps_interval
    }

    pub fn button_poll_due(&self) -> Instant {
        self.button_poll_due
    }

    pub fn gps_report_due(&self) -> Instant {
        self.gps_report_due
    }

    /// Time the last GPS cycle ran, if any
    pub fn last_gps_report(&self) -> Option<Instant> {
        self.last_gps_report
    }

    pub fn is_button_poll_due(&self, now: Instant) -> bool {
        now >= self.button_poll_due
    }

    pub fn is_gps_report_due(&self, now: Instant) -> bool {
        now >= self.gps_report_due
    }

    pub fn mark_button_polled(&mut self, now: Instant) {
        self.button_poll_due = deadline(now, self.button_poll_interval);
    }

    /// Record a GPS cycle. The interval restarts from `now` whatever the cycle's outcome.
    pub fn mark_gps_reported(&mut self, now: Instant) {
        self.last_gps_report = Some(now);
        self.gps_report_due = deadline(now, self.gps_interval);
    }

    /// Earliest instant at which either timer fires
    pub fn next_due(&self) -> Instant {
        self.button_poll_due.min(self.gps_report_due)
    }
}
