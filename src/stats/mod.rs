//! Read-only session statistics

pub mod aggregator;

pub use aggregator::{SessionStats, StatsAggregator};
