//! # Transfer Engine
//!
//! Concurrent job-execution core for an object-storage transfer tool.
//!
//! Upload, download, list and delete operations are expressed as [`Job`]s and
//! run on a fixed pool of worker threads with per-attempt timeouts, bounded
//! retries and cooperative cancellation. Connections to the remote store are
//! borrowed from a health-checked [`ConnectionPool`].
//!
//! ## Components
//!
//! - **Job / Result**: [`Job`] is the single capability a schedulable
//!   operation implements; every accepted job yields exactly one
//!   [`JobResult`].
//! - **Worker Pool**: [`WorkerPool`] runs dedicated OS threads, each driving
//!   its own single-threaded tokio runtime, so job bodies never block the
//!   caller's runtime.
//! - **Queues**: the pool schedules against the [`JobQueue`] capability.
//!   Three strategies ship with the crate: a bounded channel (default), a
//!   Michael & Scott lock-free queue and a work-stealing scheduler over
//!   power-of-two ring buffers.
//! - **Connection Pool**: [`ConnectionPool`] bounds live connections, parks
//!   waiters, and retires stale connections from a background monitor.
//! - **Batch Processor**: [`BatchProcessor`] submits a set of jobs and
//!   reports `(completed, total)` progress.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use transfer_engine::config::WorkerPoolConfig;
//! use transfer_engine::core::{job_fn, BatchProcessor, WorkerPool};
//!
//! let pool = Arc::new(WorkerPool::new(WorkerPoolConfig::new().with_workers(4))?);
//! pool.start()?;
//!
//! let batch = BatchProcessor::new(Arc::clone(&pool))
//!     .with_progress(|done, total| println!("{done}/{total}"));
//! let jobs = (0..8)
//!     .map(|i| job_fn(format!("upload-{i}"), |_ctx| async { Ok(()) }))
//!     .collect();
//! let results = batch.process_batch(jobs);
//!
//! pool.stop();
//! ```
//!
//! [`Job`]: core::Job
//! [`JobResult`]: core::JobResult
//! [`JobQueue`]: core::JobQueue
//! [`WorkerPool`]: core::WorkerPool
//! [`ConnectionPool`]: core::ConnectionPool
//! [`BatchProcessor`]: core::BatchProcessor

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Jobs, pools, queue capability and error taxonomy.
pub mod core;
/// Configuration models for the worker and connection pools.
pub mod config;
/// Builders to construct engine components from configuration.
pub mod builders;
/// Queue strategies backing the worker pool.
pub mod infra;
/// Shared utilities.
pub mod util;
