//! Connection health checks used on release and by the background monitor.

use std::time::Duration;

use crate::config::ConnectionPoolConfig;
use crate::core::PooledConnection;

/// Decides whether a pooled connection may go back into the idle set.
pub trait HealthChecker<C>: Send + Sync {
    /// Whether the connection is usable right now.
    fn is_healthy(&self, conn: &PooledConnection<C>) -> bool;

    /// Whether the connection should be retired even though it still works.
    fn should_replace(&self, conn: &PooledConnection<C>) -> bool;
}

/// Retires connections by age and idle time, and honors
/// [`PooledConnection::mark_unhealthy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifetimeHealthChecker {
    max_idle_time: Duration,
    max_lifetime: Duration,
}

impl LifetimeHealthChecker {
    /// Checker with explicit limits.
    #[must_use]
    pub const fn new(max_idle_time: Duration, max_lifetime: Duration) -> Self {
        Self {
            max_idle_time,
            max_lifetime,
        }
    }

    /// Checker using the limits from a pool configuration.
    #[must_use]
    pub fn from_config(config: &ConnectionPoolConfig) -> Self {
        Self::new(config.max_idle_time(), config.max_lifetime())
    }
}

impl<C> HealthChecker<C> for LifetimeHealthChecker {
    fn is_healthy(&self, conn: &PooledConnection<C>) -> bool {
        conn.is_healthy()
    }

    fn should_replace(&self, conn: &PooledConnection<C>) -> bool {
        conn.age() >= self.max_lifetime || conn.idle_time() >= self.max_idle_time
    }
}
