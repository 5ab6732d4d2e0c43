//! Job execution core: jobs, queues, pools and error taxonomy.

pub mod batch;
pub mod connection_pool;
pub mod error;
pub mod health;
pub mod job;
pub mod metrics;
pub mod queue;
pub mod worker_pool;

pub use batch::{BatchProcessor, BatchState, ProgressFn};
pub use connection_pool::{ConnectionFactory, ConnectionPool, ConnectionStats, PooledConnection};
pub use error::{AppResult, ConnectionError, JobError, PoolError};
pub use health::{HealthChecker, LifetimeHealthChecker};
pub use job::{job_fn, Backoff, FnJob, Job, JobContext, JobId, JobResult, QueuedJob};
pub use metrics::{InMemoryMetrics, MetricsSink, MetricsSnapshot, NoopMetrics};
pub use queue::JobQueue;
pub use worker_pool::{PoolState, WorkerPool, WorkerStats};
