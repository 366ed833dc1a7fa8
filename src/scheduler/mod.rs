//! Periodic location reporting and emergency button handling

pub mod reporter;

pub use reporter::{ReportingScheduler, SchedulerSettings};
