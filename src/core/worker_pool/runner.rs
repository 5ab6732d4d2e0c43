//! Worker thread loop: timeout, retry and result delivery for each job.
//!
//! Each worker is a dedicated OS thread driving its own single-threaded tokio
//! runtime, so async job bodies never run on the caller's runtime.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use futures::FutureExt;
use tracing::{debug, error, trace, warn};

use super::PoolShared;
use crate::core::{JobContext, JobError, JobResult, QueuedJob};

/// Spawn worker `worker_id`.
pub(super) fn spawn_worker(
    worker_id: usize,
    shared: Arc<PoolShared>,
    results: Sender<JobResult>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("te-worker-{worker_id}"))
        .stack_size(shared.config.thread_stack_size)
        .spawn(move || worker_loop(worker_id, &shared, &results))
}

fn worker_loop(worker_id: usize, shared: &PoolShared, results: &Sender<JobResult>) {
    debug!(worker_id, "worker thread started");

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => Some(rt),
        Err(e) => {
            // Keep draining so every accepted job still yields a result.
            error!(worker_id, error = %e, "failed to create worker runtime");
            None
        }
    };

    while let Some(queued) = shared.dispatch.pop(worker_id) {
        shared.counters.active_jobs.fetch_add(1, Ordering::Relaxed);
        trace!(worker_id, job_id = %queued.id(), waited = ?queued.waited(), "dequeued job");

        let result = match &rt {
            Some(_) if shared.root.is_cancelled() => {
                JobResult::new(&queued, Some(JobError::Cancelled), 0, Duration::ZERO)
            }
            Some(rt) => rt.block_on(run_job(worker_id, &queued, shared)),
            None => JobResult::new(
                &queued,
                Some(JobError::fatal("worker runtime unavailable")),
                0,
                Duration::ZERO,
            ),
        };

        shared.counters.active_jobs.fetch_sub(1, Ordering::Relaxed);
        shared.record(&result);

        if results.send(result).is_err() {
            trace!(worker_id, "result receiver dropped");
        }
    }

    debug!(worker_id, "worker thread exiting");
}

/// Execute one job to a terminal outcome.
async fn run_job(worker_id: usize, queued: &QueuedJob, shared: &PoolShared) -> JobResult {
    let job = queued.job();
    let timeout = shared.config.job_timeout();
    let started = Instant::now();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let ctx = JobContext::new(
            queued.id(),
            attempt,
            worker_id,
            timeout,
            shared.root.child_token(),
        );
        debug!(worker_id, job_id = %queued.id(), job = job.name(), attempt, "executing job");

        let execution = AssertUnwindSafe(job.execute(&ctx)).catch_unwind();
        let outcome = match tokio::time::timeout(timeout, execution).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(panic)) => Err(JobError::Panicked(panic_message(panic.as_ref()))),
            Err(_) => {
                ctx.token().cancel();
                Err(JobError::Timeout(timeout))
            }
        };

        let error = match outcome {
            Ok(()) => {
                debug!(worker_id, job_id = %queued.id(), attempt, "job completed");
                return JobResult::new(queued, None, attempt, started.elapsed());
            }
            Err(error) => error,
        };

        let retry = attempt <= shared.config.max_retries
            && !error.is_cancelled()
            && !shared.root.is_cancelled()
            && job.is_recoverable(&error);
        if !retry {
            if !error.is_cancelled() {
                warn!(
                    worker_id,
                    job_id = %queued.id(),
                    job = job.name(),
                    attempts = attempt,
                    error = %error,
                    "job failed"
                );
            }
            return JobResult::new(queued, Some(error), attempt, started.elapsed());
        }

        let delay = job.backoff().delay(
            shared.config.retry_base_delay(),
            attempt,
            shared.config.retry_max_delay(),
        );
        shared.counters.retried_attempts.fetch_add(1, Ordering::Relaxed);
        shared.metrics.job_retried(attempt);
        debug!(
            worker_id,
            job_id = %queued.id(),
            attempt,
            delay = ?delay,
            error = %error,
            "retrying job after backoff"
        );

        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = shared.root.cancelled() => {
                return JobResult::new(queued, Some(JobError::Cancelled), attempt, started.elapsed());
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}
