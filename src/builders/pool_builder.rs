//! Builders to construct worker and connection pools from configuration.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::{ConnectionPoolConfig, EngineConfig, QueueStrategy, WorkerPoolConfig};
use crate::core::{
    ConnectionError, ConnectionFactory, ConnectionPool, JobQueue, MetricsSink, NoopMetrics,
    PoolError, QueuedJob, WorkerPool,
};
use crate::infra::{ChannelQueue, LockFreeQueue, WorkStealingScheduler};

/// Build the queue strategy named by `config` for `workers` workers.
///
/// The work-stealing scheduler splits `queue_capacity` across one ring
/// buffer per worker (each rounded up to a power of two).
#[must_use]
pub fn build_queue(config: &WorkerPoolConfig, workers: usize) -> Box<dyn JobQueue<QueuedJob>> {
    let capacity = config.queue_capacity;
    match config.queue_strategy {
        QueueStrategy::Channel => Box::new(ChannelQueue::new(capacity)),
        QueueStrategy::LockFree => Box::new(LockFreeQueue::with_limit(capacity)),
        QueueStrategy::WorkStealing => {
            let workers = workers.max(1);
            Box::new(WorkStealingScheduler::new(
                workers,
                capacity.div_ceil(workers),
            ))
        }
    }
}

/// Step-by-step construction of a [`WorkerPool`].
pub struct WorkerPoolBuilder {
    config: WorkerPoolConfig,
    queue: Option<Box<dyn JobQueue<QueuedJob>>>,
    metrics: Arc<dyn MetricsSink>,
    parent: Option<CancellationToken>,
}

impl WorkerPoolBuilder {
    /// Start from a pool configuration.
    #[must_use]
    pub fn new(config: WorkerPoolConfig) -> Self {
        Self {
            config,
            queue: None,
            metrics: Arc::new(NoopMetrics),
            parent: None,
        }
    }

    /// Report events to `metrics`.
    #[must_use]
    pub fn metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Use a caller-supplied queue instead of `config.queue_strategy`.
    #[must_use]
    pub fn queue(mut self, queue: Box<dyn JobQueue<QueuedJob>>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Derive the pool's root token from `parent`, so cancelling it reaches
    /// every in-flight job.
    #[must_use]
    pub fn cancellation(mut self, parent: CancellationToken) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Validate the configuration and build the pool (not yet started).
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidConfig` if validation fails.
    pub fn build(self) -> Result<WorkerPool, PoolError> {
        self.config.validate().map_err(PoolError::InvalidConfig)?;
        let workers = self.config.effective_workers();
        let queue = self
            .queue
            .unwrap_or_else(|| build_queue(&self.config, workers));
        let root = self
            .parent
            .map_or_else(CancellationToken::new, |parent| parent.child_token());
        Ok(WorkerPool::from_parts(self.config, queue, self.metrics, root))
    }
}

/// Build a worker pool and a connection pool from one engine configuration,
/// sharing a metrics sink.
///
/// # Errors
///
/// Returns a message naming the invalid section.
pub fn build_engine<F>(
    cfg: &EngineConfig,
    factory: F,
    metrics: Arc<dyn MetricsSink>,
) -> Result<(WorkerPool, ConnectionPool<F>), String>
where
    F: ConnectionFactory,
{
    cfg.validate().map_err(|e| format!("config invalid: {e}"))?;
    let pool = WorkerPoolBuilder::new(cfg.pool.clone())
        .metrics(Arc::clone(&metrics))
        .build()
        .map_err(|e| e.to_string())?;
    let connections = build_connection_pool(cfg.connections.clone(), factory, metrics)
        .map_err(|e| e.to_string())?;
    Ok((pool, connections))
}

/// Build a connection pool with the stock lifetime health checker.
///
/// # Errors
///
/// Returns `ConnectionError::InvalidConfig` if validation fails.
pub fn build_connection_pool<F>(
    config: ConnectionPoolConfig,
    factory: F,
    metrics: Arc<dyn MetricsSink>,
) -> Result<ConnectionPool<F>, ConnectionError>
where
    F: ConnectionFactory,
{
    Ok(ConnectionPool::new(config, factory)?.with_metrics(metrics))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_queue_per_strategy() {
        let base = WorkerPoolConfig::new().with_queue_capacity(10);

        let channel = build_queue(&base, 3);
        assert_eq!(channel.name(), "channel");
        assert_eq!(channel.capacity(), Some(10));

        let lock_free = build_queue(&base.clone().with_queue_strategy(QueueStrategy::LockFree), 3);
        assert_eq!(lock_free.name(), "lock_free");
        assert_eq!(lock_free.capacity(), Some(10));

        let stealing =
            build_queue(&base.with_queue_strategy(QueueStrategy::WorkStealing), 3);
        assert_eq!(stealing.name(), "work_stealing");
        // ceil(10 / 3) = 4 per worker, already a power of two
        assert_eq!(stealing.capacity(), Some(12));
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let err = WorkerPoolBuilder::new(WorkerPoolConfig::new().with_queue_capacity(0))
            .build()
            .err()
            .expect("zero capacity is invalid");
        assert!(matches!(err, PoolError::InvalidConfig(_)));
    }
}
