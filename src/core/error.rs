//! Error types for pool, job and connection operations.

use std::time::Duration;

use thiserror::Error;

/// Errors returned synchronously by `WorkerPool` operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// The pool has begun shutdown and no longer accepts work.
    #[error("worker pool is closed")]
    PoolClosed,
    /// The bounded queue has no room for a non-blocking submission.
    #[error("job queue is full")]
    QueueFull,
    /// `submit` was called before `start`.
    #[error("worker pool has not been started")]
    NotStarted,
    /// `start` was called on a pool that already left the created state.
    #[error("worker pool already started")]
    AlreadyStarted,
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The OS refused to spawn a worker thread.
    #[error("failed to spawn worker: {0}")]
    WorkerSpawn(String),
}

/// Failure of a single job execution, delivered through the result channel.
#[derive(Debug, Clone, Error)]
pub enum JobError {
    /// The job reported a failure of its own.
    #[error("{message}")]
    Failed {
        /// Human readable reason.
        message: String,
        /// Whether the pool may retry the job.
        recoverable: bool,
    },
    /// The attempt exceeded the configured job timeout.
    #[error("job timed out after {0:?}")]
    Timeout(Duration),
    /// The job context was cancelled (pool shutdown or external cancellation).
    #[error("job cancelled")]
    Cancelled,
    /// The job panicked while executing.
    #[error("job panicked: {0}")]
    Panicked(String),
    /// The job never ran because submission failed.
    #[error("job rejected: {0}")]
    Rejected(#[from] PoolError),
}

impl JobError {
    /// A failure the pool may retry.
    pub fn recoverable(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            recoverable: true,
        }
    }

    /// A failure the pool must not retry.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            recoverable: false,
        }
    }

    /// Default retry classification: tagged recoverable failures and timeouts.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::Failed { recoverable, .. } => *recoverable,
            Self::Timeout(_) => true,
            Self::Cancelled | Self::Panicked(_) | Self::Rejected(_) => false,
        }
    }

    /// Whether this error is a cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Errors produced by the connection pool and connection factories.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// The pool has been closed.
    #[error("connection pool is closed")]
    PoolClosed,
    /// The caller's context was cancelled while waiting.
    #[error("connection acquire cancelled")]
    Cancelled,
    /// The factory failed to create a connection.
    #[error("failed to create connection: {0}")]
    Create(String),
    /// The factory rejected a connection during validation.
    #[error("connection validation failed: {0}")]
    Validation(String),
    /// The factory failed to close a connection.
    #[error("failed to close connection: {0}")]
    Close(String),
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
