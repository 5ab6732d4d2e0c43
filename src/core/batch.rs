//! Submit a set of jobs and collect their results with progress reporting.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::core::{Job, JobError, JobResult, WorkerPool};

/// Progress callback invoked with `(completed, total)` after every result.
pub type ProgressFn = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Progress of the current batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchState {
    /// Jobs in the batch.
    pub total: usize,
    /// Results collected so far.
    pub completed: usize,
}

/// Runs batches of jobs on a shared [`WorkerPool`].
///
/// Results are returned in completion order. The processor assumes it is the
/// only consumer of the pool's result channel while a batch runs.
pub struct BatchProcessor {
    pool: Arc<WorkerPool>,
    state: Mutex<BatchState>,
    on_progress: Option<ProgressFn>,
}

impl BatchProcessor {
    /// Processor over a started pool.
    #[must_use]
    pub fn new(pool: Arc<WorkerPool>) -> Self {
        Self {
            pool,
            state: Mutex::new(BatchState::default()),
            on_progress: None,
        }
    }

    /// Invoke `callback` with `(completed, total)` after every result.
    #[must_use]
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    /// Submit every job and wait for all of their results.
    ///
    /// If a submission fails, a single `JobError::Rejected` result is returned
    /// instead of a partial batch. Results of jobs submitted before the
    /// failure stay in the pool's result channel.
    pub fn process_batch(&self, jobs: Vec<Arc<dyn Job>>) -> Vec<JobResult> {
        let total = jobs.len();
        *self.state.lock() = BatchState { total, completed: 0 };
        info!(total, "processing batch");

        for job in jobs {
            if let Err(e) = self.pool.submit(Arc::clone(&job)) {
                warn!(error = %e, job = job.name(), "batch submission failed");
                return vec![JobResult::rejected(job, JobError::Rejected(e))];
            }
        }

        let results = self.pool.results();
        let mut collected = Vec::with_capacity(total);
        while collected.len() < total {
            let Ok(result) = results.recv() else {
                warn!(
                    collected = collected.len(),
                    total, "result channel closed before batch completed"
                );
                break;
            };

            let completed = {
                let mut state = self.state.lock();
                state.completed += 1;
                state.completed
            };
            debug!(job_id = %result.id(), completed, total, "batch result");
            collected.push(result);

            if let Some(callback) = &self.on_progress {
                callback(completed, total);
            }
        }

        info!(
            total,
            failed = collected.iter().filter(|r| !r.is_success()).count(),
            "batch finished"
        );
        collected
    }

    /// `(completed, total)` of the current or last batch.
    #[must_use]
    pub fn progress(&self) -> (usize, usize) {
        let state = self.state.lock();
        (state.completed, state.total)
    }
}
