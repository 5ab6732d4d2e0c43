//! Blocking front-end over a non-blocking [`JobQueue`].
//!
//! The queue strategies never block. Idle workers and producers waiting for
//! room park on a `parking_lot::Condvar`; the mutex only guards parking and is
//! taken on the fast path only when somebody is actually parked.

use std::sync::atomic::{fence, AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::core::{JobQueue, PoolError, QueuedJob};

/// Upper bound on a single park. Wake-ups are signaled, the timeout only
/// bounds the cost of a missed signal.
const PARK_TIMEOUT: Duration = Duration::from_millis(50);

/// Decrements the in-flight submission count on every exit path.
struct SubmitGuard<'a>(&'a AtomicUsize);

impl<'a> SubmitGuard<'a> {
    fn enter(count: &'a AtomicUsize) -> Self {
        count.fetch_add(1, Ordering::SeqCst);
        Self(count)
    }
}

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub(crate) struct Dispatch {
    queue: Box<dyn JobQueue<QueuedJob>>,
    closed: AtomicBool,
    /// Submissions between their closed-check and their push.
    submitting: AtomicUsize,
    next_hint: AtomicUsize,
    idle_workers: AtomicUsize,
    waiting_producers: AtomicUsize,
    lock: Mutex<()>,
    job_ready: Condvar,
    space_ready: Condvar,
}

impl Dispatch {
    pub(crate) fn new(queue: Box<dyn JobQueue<QueuedJob>>) -> Self {
        Self {
            queue,
            closed: AtomicBool::new(false),
            submitting: AtomicUsize::new(0),
            next_hint: AtomicUsize::new(0),
            idle_workers: AtomicUsize::new(0),
            waiting_producers: AtomicUsize::new(0),
            lock: Mutex::new(()),
            job_ready: Condvar::new(),
            space_ready: Condvar::new(),
        }
    }

    pub(crate) fn queue(&self) -> &dyn JobQueue<QueuedJob> {
        self.queue.as_ref()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Enqueue without waiting.
    pub(crate) fn try_push(&self, job: QueuedJob) -> Result<(), PoolError> {
        let _guard = SubmitGuard::enter(&self.submitting);
        if self.is_closed() {
            return Err(PoolError::PoolClosed);
        }
        let hint = self.next_hint.fetch_add(1, Ordering::Relaxed);
        match self.queue.push(job, hint) {
            Ok(()) => {
                self.notify_job();
                Ok(())
            }
            Err(_) => Err(PoolError::QueueFull),
        }
    }

    /// Enqueue, waiting for room while the queue is full.
    pub(crate) fn push(&self, mut job: QueuedJob) -> Result<(), PoolError> {
        let _guard = SubmitGuard::enter(&self.submitting);
        let hint = self.next_hint.fetch_add(1, Ordering::Relaxed);
        loop {
            if self.is_closed() {
                return Err(PoolError::PoolClosed);
            }
            match self.queue.push(job, hint) {
                Ok(()) => {
                    self.notify_job();
                    return Ok(());
                }
                Err(back) => job = back,
            }

            let mut guard = self.lock.lock();
            self.waiting_producers.fetch_add(1, Ordering::SeqCst);
            fence(Ordering::SeqCst);
            let full = self
                .queue
                .capacity()
                .is_some_and(|capacity| self.queue.len() >= capacity);
            if full && !self.is_closed() {
                let _ = self.space_ready.wait_for(&mut guard, PARK_TIMEOUT);
            }
            self.waiting_producers.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Next job for `worker_id`; `None` once closed and fully drained.
    pub(crate) fn pop(&self, worker_id: usize) -> Option<QueuedJob> {
        loop {
            if let Some(job) = self.queue.pop(worker_id) {
                self.notify_space();
                return Some(job);
            }
            // After `closed` is observed with no submission in flight, the
            // queue contents are final.
            if self.is_closed() && self.submitting.load(Ordering::SeqCst) == 0 {
                let last = self.queue.pop(worker_id);
                if last.is_some() {
                    self.notify_space();
                }
                return last;
            }

            let mut guard = self.lock.lock();
            self.idle_workers.fetch_add(1, Ordering::SeqCst);
            fence(Ordering::SeqCst);
            if self.queue.is_empty() && !self.is_closed() {
                let _ = self.job_ready.wait_for(&mut guard, PARK_TIMEOUT);
            }
            self.idle_workers.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Stop accepting pushes and wake everybody parked.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let _guard = self.lock.lock();
        self.job_ready.notify_all();
        self.space_ready.notify_all();
    }

    fn notify_job(&self) {
        fence(Ordering::SeqCst);
        if self.idle_workers.load(Ordering::SeqCst) > 0 {
            let _guard = self.lock.lock();
            self.job_ready.notify_one();
        }
    }

    fn notify_space(&self) {
        fence(Ordering::SeqCst);
        if self.waiting_producers.load(Ordering::SeqCst) > 0 {
            let _guard = self.lock.lock();
            self.space_ready.notify_one();
        }
    }
}
