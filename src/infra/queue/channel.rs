//! Bounded channel queue, the default backing store for the worker pool.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::core::JobQueue;

/// Bounded MPMC queue backed by a `crossbeam-channel`.
///
/// Both ends live inside the queue, so the channel never disconnects; the
/// worker pool tracks closure separately.
#[derive(Debug)]
pub struct ChannelQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    capacity: usize,
}

impl<T> ChannelQueue<T> {
    /// Create a channel queue holding at most `capacity` items (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = bounded(capacity);
        Self { tx, rx, capacity }
    }
}

impl<T: Send> JobQueue<T> for ChannelQueue<T> {
    fn push(&self, item: T, _hint: usize) -> Result<(), T> {
        self.tx.try_send(item).map_err(|err| match err {
            TrySendError::Full(item) | TrySendError::Disconnected(item) => item,
        })
    }

    fn pop(&self, _worker_id: usize) -> Option<T> {
        self.rx.try_recv().ok()
    }

    fn len(&self) -> usize {
        self.rx.len()
    }

    fn capacity(&self) -> Option<usize> {
        Some(self.capacity)
    }

    fn name(&self) -> &'static str {
        "channel"
    }
}
