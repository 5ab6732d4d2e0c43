//! The unit of schedulable work and its outcome.
//!
//! A [`Job`] is anything with an async `execute` entry point. The engine is
//! agnostic to what a job does (upload, download, list, delete); it only
//! schedules, times out, retries and reports.
//!
//! ```rust,ignore
//! use transfer_engine::core::{job_fn, JobError};
//!
//! let job = job_fn("delete-object", |ctx| async move {
//!     if ctx.is_cancelled() {
//!         return Err(JobError::Cancelled);
//!     }
//!     // issue the request...
//!     Ok(())
//! });
//! let id = pool.submit(job)?;
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::JobError;

/// Identifier assigned to every accepted submission.
pub type JobId = Uuid;

/// Delay growth between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backoff {
    /// `base * attempt`.
    Linear,
    /// `base * 2^(attempt - 1)`.
    #[default]
    Exponential,
}

impl Backoff {
    /// Delay to sleep after the given failed attempt (1-based), capped at `max`.
    #[must_use]
    pub fn delay(self, base: Duration, attempt: u32, max: Duration) -> Duration {
        let attempt = attempt.max(1);
        let raw = match self {
            Self::Linear => base.saturating_mul(attempt),
            Self::Exponential => base.saturating_mul(2u32.saturating_pow(attempt - 1)),
        };
        raw.min(max)
    }
}

/// Per-attempt execution context handed to [`Job::execute`].
///
/// The cancellation token is a child of the pool's root token, so pool
/// shutdown and external cancellation both reach the job through it.
#[derive(Debug, Clone)]
pub struct JobContext {
    id: JobId,
    attempt: u32,
    worker_id: usize,
    deadline: Option<Instant>,
    token: CancellationToken,
}

impl JobContext {
    /// Build a context for one attempt.
    #[must_use]
    pub fn new(
        id: JobId,
        attempt: u32,
        worker_id: usize,
        timeout: Duration,
        token: CancellationToken,
    ) -> Self {
        Self {
            id,
            attempt,
            worker_id,
            deadline: Instant::now().checked_add(timeout),
            token,
        }
    }

    /// Identifier of the submission this attempt belongs to.
    #[must_use]
    pub const fn id(&self) -> JobId {
        self.id
    }

    /// Attempt number, starting at 1.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Index of the worker running the attempt.
    #[must_use]
    pub const fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// Instant after which the attempt is timed out.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// The underlying cancellation token, for handing to nested operations.
    #[must_use]
    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// A unit of schedulable work.
///
/// Implementations must honor cancellation signaled through the context and
/// must tolerate being executed more than once, because the pool retries
/// recoverable failures.
#[async_trait]
pub trait Job: Send + Sync + 'static {
    /// Run one attempt of the job.
    async fn execute(&self, ctx: &JobContext) -> Result<(), JobError>;

    /// Label used in logs.
    fn name(&self) -> &str {
        "job"
    }

    /// Backoff curve between retries.
    fn backoff(&self) -> Backoff {
        Backoff::default()
    }

    /// Whether a failure should be retried.
    fn is_recoverable(&self, error: &JobError) -> bool {
        error.is_recoverable()
    }
}

/// Adapter turning an async closure into a [`Job`].
pub struct FnJob<F> {
    name: String,
    backoff: Backoff,
    f: F,
}

impl<F> FnJob<F> {
    /// Wrap a closure under a log label.
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            backoff: Backoff::default(),
            f,
        }
    }

    /// Select the retry backoff curve.
    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }
}

#[async_trait]
impl<F, Fut> Job for FnJob<F>
where
    F: Fn(JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), JobError>> + Send + 'static,
{
    async fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        (self.f)(ctx.clone()).await
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn backoff(&self) -> Backoff {
        self.backoff
    }
}

/// Shorthand for `Arc::new(FnJob::new(name, f))`.
pub fn job_fn<F, Fut>(name: impl Into<String>, f: F) -> Arc<dyn Job>
where
    F: Fn(JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), JobError>> + Send + 'static,
{
    Arc::new(FnJob::new(name, f))
}

/// A job waiting in a queue.
pub struct QueuedJob {
    id: JobId,
    job: Arc<dyn Job>,
    enqueued_at: Instant,
}

impl QueuedJob {
    /// Wrap a job under a fresh identifier.
    #[must_use]
    pub fn new(job: Arc<dyn Job>) -> Self {
        Self {
            id: Uuid::new_v4(),
            job,
            enqueued_at: Instant::now(),
        }
    }

    /// Submission identifier.
    #[must_use]
    pub const fn id(&self) -> JobId {
        self.id
    }

    /// The wrapped job.
    #[must_use]
    pub const fn job(&self) -> &Arc<dyn Job> {
        &self.job
    }

    /// How long the job has been waiting.
    #[must_use]
    pub fn waited(&self) -> Duration {
        self.enqueued_at.elapsed()
    }
}

impl fmt::Debug for QueuedJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedJob")
            .field("id", &self.id)
            .field("job", &self.job.name())
            .finish_non_exhaustive()
    }
}

/// Outcome of a job: the original job paired with an optional error.
#[derive(Clone)]
pub struct JobResult {
    id: JobId,
    job: Arc<dyn Job>,
    error: Option<JobError>,
    attempts: u32,
    elapsed: Duration,
}

impl JobResult {
    pub(crate) fn new(
        queued: &QueuedJob,
        error: Option<JobError>,
        attempts: u32,
        elapsed: Duration,
    ) -> Self {
        Self {
            id: queued.id,
            job: Arc::clone(&queued.job),
            error,
            attempts,
            elapsed,
        }
    }

    pub(crate) fn rejected(job: Arc<dyn Job>, error: JobError) -> Self {
        Self {
            id: Uuid::nil(),
            job,
            error: Some(error),
            attempts: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// Submission identifier (nil for rejected submissions).
    #[must_use]
    pub const fn id(&self) -> JobId {
        self.id
    }

    /// The job this result belongs to.
    #[must_use]
    pub const fn job(&self) -> &Arc<dyn Job> {
        &self.job
    }

    /// Terminal error, `None` on success.
    #[must_use]
    pub const fn error(&self) -> Option<&JobError> {
        self.error.as_ref()
    }

    /// Number of `execute` calls made.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Wall time from first attempt to terminal outcome.
    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Whether the job succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Convert into a plain `Result`.
    ///
    /// # Errors
    ///
    /// Returns the terminal job error if the job failed.
    pub fn into_result(self) -> Result<(), JobError> {
        self.error.map_or(Ok(()), Err)
    }
}

impl fmt::Debug for JobResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobResult")
            .field("id", &self.id)
            .field("job", &self.job.name())
            .field("error", &self.error)
            .field("attempts", &self.attempts)
            .field("elapsed", &self.elapsed)
            .finish()
    }
}
