//! User-visible status through a single LED

mod led;

pub use led::{BlinkPattern, StatusIndicator};
