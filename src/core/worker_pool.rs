//! Bounded worker pool with dedicated OS threads.
//!
//! # Lifecycle
//!
//! `Created → Running → Stopping → Stopped`. [`WorkerPool::start`] spawns the
//! worker threads; [`WorkerPool::stop`] cancels the root token, closes the
//! submission path, joins every worker and finally closes the result channel.
//! `stop` is idempotent.
//!
//! # Guarantees
//!
//! - Every accepted job yields exactly one [`JobResult`]: success, terminal
//!   error, or `Cancelled` for jobs still queued when the pool was cancelled.
//! - Workers schedule against the [`JobQueue`] capability, so the bounded
//!   channel, the lock-free queue and the work-stealing ring buffers are
//!   interchangeable.
//!
//! # Example
//!
//! ```rust,ignore
//! use transfer_engine::config::WorkerPoolConfig;
//! use transfer_engine::core::{job_fn, WorkerPool};
//!
//! let pool = WorkerPool::new(WorkerPoolConfig::new().with_workers(4))?;
//! pool.start()?;
//! pool.submit(job_fn("list-bucket", |_ctx| async { Ok(()) }))?;
//! let result = pool.results().recv()?;
//! pool.stop();
//! ```

mod dispatch;
mod runner;

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::builders::WorkerPoolBuilder;
use crate::config::WorkerPoolConfig;
use crate::core::{Job, JobId, JobQueue, JobResult, MetricsSink, PoolError, QueuedJob};

use dispatch::Dispatch;

/// Lifecycle state of a [`WorkerPool`], ordered by progression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PoolState {
    /// Constructed, workers not yet spawned.
    Created,
    /// Accepting submissions.
    Running,
    /// Shutdown requested, workers draining.
    Stopping,
    /// All workers joined, result channel closed.
    Stopped,
}

impl PoolState {
    const fn as_u8(self) -> u8 {
        match self {
            Self::Created => 0,
            Self::Running => 1,
            Self::Stopping => 2,
            Self::Stopped => 3,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// Statistics about pool utilization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerStats {
    /// Number of worker threads.
    pub worker_count: usize,
    /// Jobs waiting in the queue (approximate for lock-free strategies).
    pub queue_len: usize,
    /// Queue capacity, `None` when unbounded.
    pub queue_capacity: Option<usize>,
    /// Whether the pool accepts submissions.
    pub running: bool,
    /// Current lifecycle state.
    pub state: PoolState,
    /// Queue strategy name.
    pub strategy: &'static str,
    /// Jobs currently executing.
    pub active_jobs: u64,
    /// Jobs accepted.
    pub submitted_jobs: u64,
    /// Jobs that succeeded.
    pub completed_jobs: u64,
    /// Jobs that failed terminally.
    pub failed_jobs: u64,
    /// Jobs that ended cancelled.
    pub cancelled_jobs: u64,
    /// Retry attempts scheduled.
    pub retried_attempts: u64,
}

/// Internal counters for pool statistics (lock-free atomics).
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub active_jobs: AtomicU64,
    pub submitted_jobs: AtomicU64,
    pub completed_jobs: AtomicU64,
    pub failed_jobs: AtomicU64,
    pub cancelled_jobs: AtomicU64,
    pub retried_attempts: AtomicU64,
}

/// State shared between the pool handle and its workers.
pub(crate) struct PoolShared {
    pub config: WorkerPoolConfig,
    pub dispatch: Dispatch,
    pub counters: PoolCounters,
    pub metrics: Arc<dyn MetricsSink>,
    pub root: CancellationToken,
}

impl PoolShared {
    /// Account a terminal result.
    pub fn record(&self, result: &JobResult) {
        match result.error() {
            None => {
                self.counters.completed_jobs.fetch_add(1, Ordering::Relaxed);
                self.metrics.job_completed(result.elapsed());
            }
            Some(err) if err.is_cancelled() => {
                self.counters.cancelled_jobs.fetch_add(1, Ordering::Relaxed);
            }
            Some(err) => {
                self.counters.failed_jobs.fetch_add(1, Ordering::Relaxed);
                self.metrics.job_failed(err);
            }
        }
    }
}

/// Fixed-size pool of worker threads executing [`Job`]s.
pub struct WorkerPool {
    shared: Arc<PoolShared>,
    state: AtomicU8,
    worker_count: usize,
    workers: Mutex<Vec<JoinHandle<()>>>,
    results_tx: Mutex<Option<Sender<JobResult>>>,
    results_rx: Receiver<JobResult>,
}

impl WorkerPool {
    /// Create a pool using the queue strategy named in `config`.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidConfig` if the configuration is invalid.
    pub fn new(config: WorkerPoolConfig) -> Result<Self, PoolError> {
        WorkerPoolBuilder::new(config).build()
    }

    /// Create a pool against a caller-supplied queue strategy.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidConfig` if the configuration is invalid.
    pub fn with_queue(
        config: WorkerPoolConfig,
        queue: Box<dyn JobQueue<QueuedJob>>,
    ) -> Result<Self, PoolError> {
        WorkerPoolBuilder::new(config).queue(queue).build()
    }

    /// Create a pool whose root token is a child of `parent`.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidConfig` if the configuration is invalid.
    pub fn with_cancellation(
        config: WorkerPoolConfig,
        parent: &CancellationToken,
    ) -> Result<Self, PoolError> {
        WorkerPoolBuilder::new(config)
            .cancellation(parent.clone())
            .build()
    }

    pub(crate) fn from_parts(
        config: WorkerPoolConfig,
        queue: Box<dyn JobQueue<QueuedJob>>,
        metrics: Arc<dyn MetricsSink>,
        root: CancellationToken,
    ) -> Self {
        let worker_count = config.effective_workers();
        let (results_tx, results_rx) = unbounded();
        Self {
            shared: Arc::new(PoolShared {
                config,
                dispatch: Dispatch::new(queue),
                counters: PoolCounters::default(),
                metrics,
                root,
            }),
            state: AtomicU8::new(PoolState::Created.as_u8()),
            worker_count,
            workers: Mutex::new(Vec::with_capacity(worker_count)),
            results_tx: Mutex::new(Some(results_tx)),
            results_rx,
        }
    }

    /// Spawn the worker threads and start accepting submissions.
    ///
    /// # Errors
    ///
    /// - `PoolError::AlreadyStarted` if the pool is already running
    /// - `PoolError::PoolClosed` if the pool was stopped
    /// - `PoolError::WorkerSpawn` if a thread could not be spawned (the pool
    ///   is stopped before returning)
    pub fn start(&self) -> Result<(), PoolError> {
        if let Err(actual) = self.state.compare_exchange(
            PoolState::Created.as_u8(),
            PoolState::Running.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            return Err(match PoolState::from_u8(actual) {
                PoolState::Running => PoolError::AlreadyStarted,
                _ => PoolError::PoolClosed,
            });
        }

        let Some(results_tx) = self.results_tx.lock().clone() else {
            return Err(PoolError::PoolClosed);
        };

        let mut workers = self.workers.lock();
        for worker_id in 0..self.worker_count {
            match runner::spawn_worker(worker_id, Arc::clone(&self.shared), results_tx.clone()) {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    error!(worker_id, error = %e, "failed to spawn worker thread");
                    drop(workers);
                    self.stop();
                    return Err(PoolError::WorkerSpawn(e.to_string()));
                }
            }
        }

        let queue = self.shared.dispatch.queue();
        info!(
            worker_count = self.worker_count,
            strategy = queue.name(),
            queue_capacity = ?queue.capacity(),
            job_timeout = ?self.shared.config.job_timeout(),
            max_retries = self.shared.config.max_retries,
            "worker pool started"
        );
        Ok(())
    }

    /// Submit a job, waiting for queue room if necessary.
    ///
    /// # Errors
    ///
    /// - `PoolError::NotStarted` before `start`
    /// - `PoolError::PoolClosed` once shutdown began (also while waiting)
    pub fn submit(&self, job: Arc<dyn Job>) -> Result<JobId, PoolError> {
        self.ensure_running()?;
        let queued = QueuedJob::new(job);
        let id = queued.id();
        self.shared.dispatch.push(queued)?;
        self.accepted(id);
        Ok(id)
    }

    /// Submit a job without waiting.
    ///
    /// # Errors
    ///
    /// - `PoolError::QueueFull` if the queue has no room
    /// - `PoolError::NotStarted` before `start`
    /// - `PoolError::PoolClosed` once shutdown began
    pub fn try_submit(&self, job: Arc<dyn Job>) -> Result<JobId, PoolError> {
        self.ensure_running()?;
        let queued = QueuedJob::new(job);
        let id = queued.id();
        if let Err(e) = self.shared.dispatch.try_push(queued) {
            if e == PoolError::QueueFull {
                warn!("worker pool queue is full");
            }
            return Err(e);
        }
        self.accepted(id);
        Ok(id)
    }

    /// Receive end of the result channel. Closes after `stop` joined all
    /// workers and every result has been drained.
    #[must_use]
    pub fn results(&self) -> Receiver<JobResult> {
        self.results_rx.clone()
    }

    /// Shut down: cancel in-flight jobs, close submissions, join workers,
    /// close the result channel. Later calls are no-ops.
    pub fn stop(&self) {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current >= PoolState::Stopping.as_u8() {
                return;
            }
            match self.state.compare_exchange(
                current,
                PoolState::Stopping.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        info!("stopping worker pool");
        self.shared.root.cancel();
        self.shared.dispatch.close();

        let handles: Vec<_> = self.workers.lock().drain(..).collect();
        let joined = handles.len();
        for (worker_id, handle) in handles.into_iter().enumerate() {
            if handle.join().is_err() {
                warn!(worker_id, "worker thread panicked");
            } else {
                debug!(worker_id, "worker joined");
            }
        }

        self.results_tx.lock().take();
        self.state.store(PoolState::Stopped.as_u8(), Ordering::Release);
        info!(worker_count = joined, "worker pool stopped");
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> PoolState {
        PoolState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Snapshot of worker and queue statistics.
    #[must_use]
    pub fn worker_stats(&self) -> WorkerStats {
        let queue = self.shared.dispatch.queue();
        let counters = &self.shared.counters;
        let state = self.state();
        WorkerStats {
            worker_count: self.worker_count,
            queue_len: queue.len(),
            queue_capacity: queue.capacity(),
            running: state == PoolState::Running,
            state,
            strategy: queue.name(),
            active_jobs: counters.active_jobs.load(Ordering::Relaxed),
            submitted_jobs: counters.submitted_jobs.load(Ordering::Relaxed),
            completed_jobs: counters.completed_jobs.load(Ordering::Relaxed),
            failed_jobs: counters.failed_jobs.load(Ordering::Relaxed),
            cancelled_jobs: counters.cancelled_jobs.load(Ordering::Relaxed),
            retried_attempts: counters.retried_attempts.load(Ordering::Relaxed),
        }
    }

    fn ensure_running(&self) -> Result<(), PoolError> {
        match self.state() {
            PoolState::Running => Ok(()),
            PoolState::Created => Err(PoolError::NotStarted),
            PoolState::Stopping | PoolState::Stopped => Err(PoolError::PoolClosed),
        }
    }

    fn accepted(&self, id: JobId) {
        self.shared.counters.submitted_jobs.fetch_add(1, Ordering::Relaxed);
        self.shared.metrics.job_submitted();
        debug!(job_id = %id, "job submitted to worker pool");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Signal shutdown but don't join: explicit `stop()` is the graceful path.
        if self.state() < PoolState::Stopping {
            self.shared.root.cancel();
            self.shared.dispatch.close();
            debug!("WorkerPool dropped without explicit stop - workers will be detached");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{job_fn, JobError};
    use std::time::Duration;

    fn small_config() -> WorkerPoolConfig {
        WorkerPoolConfig::new()
            .with_workers(2)
            .with_queue_capacity(16)
            .with_retry_base_delay(Duration::from_millis(1))
            .with_retry_max_delay(Duration::from_millis(5))
    }

    #[test]
    fn test_state_ordering() {
        assert!(PoolState::Created < PoolState::Running);
        assert!(PoolState::Stopping < PoolState::Stopped);
        assert_eq!(PoolState::from_u8(PoolState::Stopping.as_u8()), PoolState::Stopping);
    }

    #[test]
    fn test_submit_before_start_is_rejected() {
        let pool = WorkerPool::new(small_config()).expect("valid config");
        let err = pool
            .submit(job_fn("noop", |_ctx| async { Ok(()) }))
            .expect_err("not started");
        assert_eq!(err, PoolError::NotStarted);
        pool.stop();
        assert_eq!(pool.state(), PoolState::Stopped);
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let pool = WorkerPool::new(small_config()).expect("valid config");
        pool.start().expect("first start");
        assert_eq!(pool.start(), Err(PoolError::AlreadyStarted));
        pool.stop();
        assert_eq!(pool.start(), Err(PoolError::PoolClosed));
    }

    #[test]
    fn test_stats_track_outcomes() {
        let pool = WorkerPool::new(small_config().with_max_retries(1)).expect("valid config");
        pool.start().expect("start");
        pool.submit(job_fn("ok", |_ctx| async { Ok(()) })).expect("submit");
        pool.submit(job_fn("flaky", |_ctx| async { Err(JobError::recoverable("503")) }))
            .expect("submit");

        let rx = pool.results();
        let outcomes: Vec<_> = (0..2)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).expect("result"))
            .collect();
        assert_eq!(outcomes.iter().filter(|r| r.is_success()).count(), 1);

        let stats = pool.worker_stats();
        assert_eq!(stats.worker_count, 2);
        assert_eq!(stats.submitted_jobs, 2);
        assert_eq!(stats.completed_jobs, 1);
        assert_eq!(stats.failed_jobs, 1);
        assert_eq!(stats.retried_attempts, 1);
        assert!(stats.running);
        assert_eq!(stats.strategy, "channel");
        pool.stop();
        assert!(!pool.worker_stats().running);
    }
}
