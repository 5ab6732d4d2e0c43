//! Work-stealing scheduler over per-worker ring buffers.
//!
//! Each worker owns one [`RingBuffer`]. Submission prefers the target
//! worker's buffer and spills over to the others round-robin; an idle worker
//! drains its own buffer first and then steals from the others, starting at a
//! rotating cursor so steals spread across victims. Ordering is FIFO per
//! buffer only; there is no global order.

use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::trace;

use super::RingBuffer;
use crate::core::JobQueue;

/// Per-worker ring buffers with cross-worker stealing.
#[derive(Debug)]
pub struct WorkStealingScheduler<T> {
    buffers: Box<[RingBuffer<T>]>,
    steal_cursor: AtomicUsize,
}

impl<T> WorkStealingScheduler<T> {
    /// Create `workers` buffers (at least one) of `capacity_per_worker` each,
    /// rounded up to a power of two.
    #[must_use]
    pub fn new(workers: usize, capacity_per_worker: usize) -> Self {
        let buffers = (0..workers.max(1))
            .map(|_| RingBuffer::new(capacity_per_worker))
            .collect();
        Self {
            buffers,
            steal_cursor: AtomicUsize::new(0),
        }
    }

    /// Place a job, preferring `worker_id`'s buffer.
    ///
    /// # Errors
    ///
    /// Returns the job when every buffer is full.
    pub fn submit_job(&self, job: T, worker_id: usize) -> Result<(), T> {
        let count = self.buffers.len();
        let own = worker_id % count;
        let mut job = match self.buffers[own].put(job) {
            Ok(()) => return Ok(()),
            Err(job) => job,
        };
        for offset in 1..count {
            match self.buffers[(own + offset) % count].put(job) {
                Ok(()) => return Ok(()),
                Err(back) => job = back,
            }
        }
        Err(job)
    }

    /// Take the next job for `worker_id`, stealing when its buffer is empty.
    pub fn get_job(&self, worker_id: usize) -> Option<T> {
        let count = self.buffers.len();
        let own = worker_id % count;
        if let Some(job) = self.buffers[own].get() {
            return Some(job);
        }
        let start = self.steal_cursor.fetch_add(1, Ordering::Relaxed);
        for offset in 0..count {
            let victim = start.wrapping_add(offset) % count;
            if victim == own {
                continue;
            }
            if let Some(job) = self.buffers[victim].get() {
                trace!(worker_id = own, victim, "stole job");
                return Some(job);
            }
        }
        None
    }

    /// Total queued jobs across all buffers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffers.iter().map(RingBuffer::len).sum()
    }

    /// Whether all buffers appear empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffers.iter().all(RingBuffer::is_empty)
    }

    /// Sum of all buffer capacities.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buffers.iter().map(RingBuffer::capacity).sum()
    }

    /// Number of per-worker buffers.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.buffers.len()
    }
}

impl<T: Send> JobQueue<T> for WorkStealingScheduler<T> {
    fn push(&self, item: T, hint: usize) -> Result<(), T> {
        self.submit_job(item, hint)
    }

    fn pop(&self, worker_id: usize) -> Option<T> {
        self.get_job(worker_id)
    }

    fn len(&self) -> usize {
        Self::len(self)
    }

    fn capacity(&self) -> Option<usize> {
        Some(Self::capacity(self))
    }

    fn name(&self) -> &'static str {
        "work_stealing"
    }
}
