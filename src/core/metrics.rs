//! Metrics sink injected into the worker and connection pools.
//!
//! Pools report events through a [`MetricsSink`] handed to their constructors
//! instead of reaching for a process-wide registry. Aggregation and export
//! belong to the caller's sink.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::JobError;

/// Receiver for engine events. Every method defaults to a no-op.
pub trait MetricsSink: Send + Sync {
    /// A job was accepted by `submit`.
    fn job_submitted(&self) {}
    /// A job finished successfully.
    fn job_completed(&self, _elapsed: Duration) {}
    /// A job reached a terminal failure.
    fn job_failed(&self, _error: &JobError) {}
    /// A job attempt failed and will be retried.
    fn job_retried(&self, _attempt: u32) {}
    /// The connection pool opened a connection.
    fn connection_created(&self) {}
    /// The connection pool closed a connection.
    fn connection_closed(&self) {}
    /// An `acquire` call had to wait for a released connection.
    fn connection_waited(&self, _waited: Duration) {}
}

/// Sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {}

/// Point-in-time copy of [`InMemoryMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Jobs accepted.
    pub jobs_submitted: u64,
    /// Jobs succeeded.
    pub jobs_completed: u64,
    /// Jobs failed terminally.
    pub jobs_failed: u64,
    /// Retry attempts scheduled.
    pub jobs_retried: u64,
    /// Connections opened.
    pub connections_created: u64,
    /// Connections closed.
    pub connections_closed: u64,
    /// Acquire calls that waited.
    pub connection_waits: u64,
}

/// Counting sink for tests and simple embedding.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    jobs_submitted: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
    jobs_retried: AtomicU64,
    connections_created: AtomicU64,
    connections_closed: AtomicU64,
    connection_waits: AtomicU64,
}

impl InMemoryMetrics {
    /// Create a zeroed sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current counter values.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_submitted: self.jobs_submitted.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            jobs_retried: self.jobs_retried.load(Ordering::Relaxed),
            connections_created: self.connections_created.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            connection_waits: self.connection_waits.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSink for InMemoryMetrics {
    fn job_submitted(&self) {
        self.jobs_submitted.fetch_add(1, Ordering::Relaxed);
    }

    fn job_completed(&self, _elapsed: Duration) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
    }

    fn job_failed(&self, _error: &JobError) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    fn job_retried(&self, _attempt: u32) {
        self.jobs_retried.fetch_add(1, Ordering::Relaxed);
    }

    fn connection_created(&self) {
        self.connections_created.fetch_add(1, Ordering::Relaxed);
    }

    fn connection_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    fn connection_waited(&self, _waited: Duration) {
        self.connection_waits.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_counts() {
        let metrics = InMemoryMetrics::new();
        metrics.job_submitted();
        metrics.job_submitted();
        metrics.job_failed(&JobError::Cancelled);
        metrics.connection_created();
        let snap = metrics.snapshot();
        assert_eq!(snap.jobs_submitted, 2);
        assert_eq!(snap.jobs_failed, 1);
        assert_eq!(snap.connections_created, 1);
        assert_eq!(snap.jobs_completed, 0);
    }
}
