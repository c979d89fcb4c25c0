//! Statistics and metrics for the relay hub

pub mod metrics;

pub use metrics::{HubStats, StatsSnapshot};
