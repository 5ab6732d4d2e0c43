//! Queue capability the worker pool schedules against.

/// Abstraction for job queue backends.
///
/// All methods take `&self`: implementations are shared between submitting
/// threads and worker loops and synchronize internally. `push` hands the item
/// back when the queue has no room so callers can retry or report backpressure.
pub trait JobQueue<T>: Send + Sync {
    /// Enqueue an item. `hint` names the preferred worker for per-worker
    /// strategies and is ignored by shared queues.
    ///
    /// # Errors
    ///
    /// Returns the item when the queue is full.
    fn push(&self, item: T, hint: usize) -> Result<(), T>;

    /// Dequeue the next item for `worker_id`, if any.
    fn pop(&self, worker_id: usize) -> Option<T>;

    /// Current depth. May be approximate under concurrent mutation.
    fn len(&self) -> usize;

    /// Whether the queue currently appears empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum depth, `None` when unbounded.
    fn capacity(&self) -> Option<usize>;

    /// Strategy name for stats and logs.
    fn name(&self) -> &'static str;
}
