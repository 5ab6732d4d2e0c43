//! Connection pool configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::pool::duration_ms;

/// Connection pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionPoolConfig {
    /// Connections pre-created on start and maintained by the health monitor.
    pub min_connections: usize,
    /// Hard bound on live connections (idle + checked out).
    pub max_connections: usize,
    /// Health monitor interval in milliseconds.
    pub check_interval_ms: u64,
    /// Idle time after which a connection is replaced, in milliseconds.
    pub max_idle_time_ms: u64,
    /// Age after which a connection is replaced, in milliseconds.
    pub max_lifetime_ms: u64,
}

impl Default for ConnectionPoolConfig {
    fn default() -> Self {
        Self {
            min_connections: 2,
            max_connections: 10,
            check_interval_ms: 30_000,
            max_idle_time_ms: 300_000,
            max_lifetime_ms: 1_800_000,
        }
    }
}

impl ConnectionPoolConfig {
    /// Configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum and maximum connection counts.
    #[must_use]
    pub const fn with_bounds(mut self, min: usize, max: usize) -> Self {
        self.min_connections = min;
        self.max_connections = max;
        self
    }

    /// Set the health monitor interval.
    #[must_use]
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval_ms = duration_ms(interval);
        self
    }

    /// Set the idle replacement threshold.
    #[must_use]
    pub fn with_max_idle_time(mut self, idle: Duration) -> Self {
        self.max_idle_time_ms = duration_ms(idle);
        self
    }

    /// Set the lifetime replacement threshold.
    #[must_use]
    pub fn with_max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime_ms = duration_ms(lifetime);
        self
    }

    /// Health monitor interval.
    #[must_use]
    pub const fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    /// Idle replacement threshold.
    #[must_use]
    pub const fn max_idle_time(&self) -> Duration {
        Duration::from_millis(self.max_idle_time_ms)
    }

    /// Lifetime replacement threshold.
    #[must_use]
    pub const fn max_lifetime(&self) -> Duration {
        Duration::from_millis(self.max_lifetime_ms)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_connections == 0 {
            return Err("max_connections must be greater than 0".into());
        }
        if self.min_connections > self.max_connections {
            return Err(format!(
                "min_connections ({}) exceeds max_connections ({})",
                self.min_connections, self.max_connections
            ));
        }
        if self.check_interval_ms == 0 {
            return Err("check_interval_ms must be greater than 0".into());
        }
        Ok(())
    }
}
