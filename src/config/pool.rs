//! Worker pool configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Backing store the worker pool schedules against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStrategy {
    /// Bounded `crossbeam-channel` queue.
    #[default]
    Channel,
    /// Michael & Scott lock-free queue, bounded softly by `queue_capacity`.
    LockFree,
    /// Per-worker ring buffers with work stealing.
    WorkStealing,
}

/// Worker pool configuration.
///
/// Durations are stored in milliseconds so the struct maps directly onto JSON
/// and environment variables; use the accessor methods for `Duration`s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerPoolConfig {
    /// Worker threads; `0` means one per CPU.
    pub workers: usize,
    /// Maximum queued jobs before submissions see backpressure.
    pub queue_capacity: usize,
    /// Per-attempt timeout in milliseconds.
    pub job_timeout_ms: u64,
    /// Retries after the first attempt for recoverable failures.
    pub max_retries: u32,
    /// Base retry delay in milliseconds.
    pub retry_base_delay_ms: u64,
    /// Upper bound on a single retry delay in milliseconds.
    pub retry_max_delay_ms: u64,
    /// Queue backing strategy.
    pub queue_strategy: QueueStrategy,
    /// Worker thread stack size in bytes.
    pub thread_stack_size: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            queue_capacity: 1024,
            job_timeout_ms: 300_000,
            max_retries: 3,
            retry_base_delay_ms: 1_000,
            retry_max_delay_ms: 30_000,
            queue_strategy: QueueStrategy::Channel,
            thread_stack_size: 2 * 1024 * 1024,
        }
    }
}

impl WorkerPoolConfig {
    /// Configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker count (`0` = CPU count).
    #[must_use]
    pub const fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the queue capacity.
    #[must_use]
    pub const fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the per-attempt timeout.
    #[must_use]
    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout_ms = duration_ms(timeout);
        self
    }

    /// Set the retry budget.
    #[must_use]
    pub const fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the base retry delay.
    #[must_use]
    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay_ms = duration_ms(delay);
        self
    }

    /// Set the retry delay cap.
    #[must_use]
    pub fn with_retry_max_delay(mut self, delay: Duration) -> Self {
        self.retry_max_delay_ms = duration_ms(delay);
        self
    }

    /// Select the queue strategy.
    #[must_use]
    pub const fn with_queue_strategy(mut self, strategy: QueueStrategy) -> Self {
        self.queue_strategy = strategy;
        self
    }

    /// Set the worker thread stack size.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = bytes;
        self
    }

    /// Worker count after resolving `0` to the CPU count.
    #[must_use]
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get().max(1)
        } else {
            self.workers
        }
    }

    /// Per-attempt timeout.
    #[must_use]
    pub const fn job_timeout(&self) -> Duration {
        Duration::from_millis(self.job_timeout_ms)
    }

    /// Base retry delay.
    #[must_use]
    pub const fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    /// Retry delay cap.
    #[must_use]
    pub const fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.queue_capacity == 0 {
            return Err("queue_capacity must be greater than 0".into());
        }
        if self.job_timeout_ms == 0 {
            return Err("job_timeout_ms must be greater than 0".into());
        }
        if self.retry_max_delay_ms < self.retry_base_delay_ms {
            return Err("retry_max_delay_ms must be at least retry_base_delay_ms".into());
        }
        if self.thread_stack_size < 64 * 1024 {
            return Err("thread_stack_size must be at least 64 KiB".into());
        }
        Ok(())
    }
}

pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
