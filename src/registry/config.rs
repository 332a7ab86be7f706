//! Registry configuration

use std::time::Duration;

/// Grace window an ended session stays queryable before it is purged
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(60);

/// How often the retention sweeper looks for expired sessions
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// Registry configuration options
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Time an ended session remains readable before purge
    pub grace_period: Duration,

    /// Retention sweeper tick interval
    pub sweep_interval: Duration,

    /// Buffer size for channel-backed history sinks
    pub history_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            history_capacity: 1024,
        }
    }
}

impl RegistryConfig {
    /// Set the grace period
    pub fn grace_period(mut self, period: Duration) -> Self {
        self.grace_period = period;
        self
    }

    /// Set the sweep interval
    ///
    /// A zero interval would make the sweeper spin, so it is raised to 1ms.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Set the history channel capacity (at least 1)
    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity.max(1);
        self
    }
}
