//! Connectivity management for the cellular data link
//!
//! This module handles:
//! - Packet-data attach with warm-up and settle delays
//! - Reachability probing
//! - Boot-time attach/probe retry loop
//! - Lazy link repair after transport failures

mod manager;

pub use manager::{ConnectivityConfig, ConnectivityManager};
