//! Unbounded multi-producer/multi-consumer FIFO queue (Michael & Scott).
//!
//! # Design
//!
//! A singly linked list with a permanent dummy head (the sentinel). `tail`
//! may lag the true last node by one link; both `enqueue` and `dequeue` help
//! advance it before retrying. Every CAS loop iteration re-reads `head`,
//! `tail` and `next` from the shared atomics, never from a snapshot taken in
//! an earlier iteration.
//!
//! # Reclamation
//!
//! Nodes are managed with `crossbeam-epoch`. Each operation pins the current
//! thread; a node unlinked by a successful head CAS is retired through
//! `defer_destroy` and freed only once every thread that could still hold a
//! pointer to it has unpinned. This rules out use-after-free and the ABA
//! reuse of a freed node address while another thread sits mid-CAS.
//!
//! # Ownership of the payload
//!
//! The dequeuer that wins the head CAS moves the payload out of the new
//! sentinel. The payload is never read before the CAS because moving a `T`
//! out speculatively would duplicate ownership; the epoch guard is what keeps
//! the node readable after the CAS.

#![allow(unsafe_code)]

use std::fmt;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicIsize, Ordering};

use crossbeam_epoch::{self as epoch, Atomic, Owned, Shared};
use crossbeam_utils::CachePadded;

use crate::core::JobQueue;

struct Node<T> {
    /// Uninitialized in the sentinel, initialized in every linked node after it.
    data: MaybeUninit<T>,
    next: Atomic<Node<T>>,
}

/// Lock-free unbounded MPMC queue.
///
/// `len()` is a best-effort counter for observability only. An optional soft
/// limit turns it into a bounded [`JobQueue`]; the limit is checked before
/// linking, so concurrent producers may overshoot it slightly.
pub struct LockFreeQueue<T> {
    head: CachePadded<Atomic<Node<T>>>,
    tail: CachePadded<Atomic<Node<T>>>,
    size: CachePadded<AtomicIsize>,
    limit: Option<usize>,
}

// SAFETY: payloads move between threads by value and are only ever accessed by
// the single thread that wins the head CAS, so `T: Send` is sufficient.
unsafe impl<T: Send> Send for LockFreeQueue<T> {}
// SAFETY: see above; all shared state is atomics.
unsafe impl<T: Send> Sync for LockFreeQueue<T> {}

impl<T> LockFreeQueue<T> {
    /// Create an empty, unbounded queue.
    #[must_use]
    pub fn new() -> Self {
        let queue = Self {
            head: CachePadded::new(Atomic::null()),
            tail: CachePadded::new(Atomic::null()),
            size: CachePadded::new(AtomicIsize::new(0)),
            limit: None,
        };
        let sentinel = Owned::new(Node {
            data: MaybeUninit::uninit(),
            next: Atomic::null(),
        });
        // SAFETY: the queue is not shared yet, so no other thread can observe
        // the sentinel before both pointers are set.
        let guard = unsafe { epoch::unprotected() };
        let sentinel = sentinel.into_shared(guard);
        queue.head.store(sentinel, Ordering::Relaxed);
        queue.tail.store(sentinel, Ordering::Relaxed);
        queue
    }

    /// Create a queue that reports full once `limit` items are queued.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        let mut queue = Self::new();
        queue.limit = Some(limit);
        queue
    }

    /// Append an item at the tail.
    pub fn enqueue(&self, item: T) {
        let guard = &epoch::pin();
        let new = Owned::new(Node {
            data: MaybeUninit::new(item),
            next: Atomic::null(),
        })
        .into_shared(guard);

        loop {
            let tail = self.tail.load(Ordering::Acquire, guard);
            // SAFETY: tail is never null after construction and the pinned
            // guard keeps the node alive even if it has been unlinked.
            let tail_ref = unsafe { tail.deref() };
            let next = tail_ref.next.load(Ordering::Acquire, guard);

            if !next.is_null() {
                // Stale tail: help advance it and retry with fresh pointers.
                let _ = self.tail.compare_exchange(
                    tail,
                    next,
                    Ordering::Release,
                    Ordering::Relaxed,
                    guard,
                );
                continue;
            }

            if tail_ref
                .next
                .compare_exchange(
                    Shared::null(),
                    new,
                    Ordering::Release,
                    Ordering::Relaxed,
                    guard,
                )
                .is_ok()
            {
                // Best effort: a failed swing is finished by the next operation.
                let _ = self.tail.compare_exchange(
                    tail,
                    new,
                    Ordering::Release,
                    Ordering::Relaxed,
                    guard,
                );
                self.size.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
    }

    /// Remove the item at the head, `None` when empty.
    pub fn dequeue(&self) -> Option<T> {
        let guard = &epoch::pin();
        loop {
            let head = self.head.load(Ordering::Acquire, guard);
            let tail = self.tail.load(Ordering::Acquire, guard);
            // SAFETY: head is never null and is protected by the guard.
            let next = unsafe { head.deref() }.next.load(Ordering::Acquire, guard);

            if head == tail {
                if next.is_null() {
                    return None;
                }
                let _ = self.tail.compare_exchange(
                    tail,
                    next,
                    Ordering::Release,
                    Ordering::Relaxed,
                    guard,
                );
                continue;
            }

            // SAFETY: protected by the guard; null only if head moved under us.
            let Some(next_ref) = (unsafe { next.as_ref() }) else {
                continue;
            };

            if self
                .head
                .compare_exchange(head, next, Ordering::Release, Ordering::Relaxed, guard)
                .is_ok()
            {
                self.size.fetch_sub(1, Ordering::Relaxed);
                // SAFETY: winning the head CAS makes this thread the only one
                // allowed to read `next.data`; `next` is now the sentinel and
                // its payload is treated as uninitialized from here on.
                let item = unsafe { next_ref.data.assume_init_read() };
                // SAFETY: the old sentinel is unlinked, so no new references
                // can be created; existing ones are covered by their guards.
                unsafe { guard.defer_destroy(head) };
                return Some(item);
            }
        }
    }

    /// Approximate number of queued items.
    #[must_use]
    pub fn len(&self) -> usize {
        usize::try_from(self.size.load(Ordering::Relaxed)).unwrap_or(0)
    }

    /// Whether the queue appears empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for LockFreeQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for LockFreeQueue<T> {
    fn drop(&mut self) {
        while self.dequeue().is_some() {}
        // SAFETY: `&mut self` guarantees exclusive access; the remaining
        // sentinel holds no initialized payload.
        unsafe {
            let guard = epoch::unprotected();
            let sentinel = self.head.load(Ordering::Relaxed, guard);
            drop(sentinel.into_owned());
        }
    }
}

impl<T> fmt::Debug for LockFreeQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockFreeQueue")
            .field("len", &self.len())
            .field("limit", &self.limit)
            .finish()
    }
}

impl<T: Send> JobQueue<T> for LockFreeQueue<T> {
    fn push(&self, item: T, _hint: usize) -> Result<(), T> {
        if self.limit.is_some_and(|limit| Self::len(self) >= limit) {
            return Err(item);
        }
        self.enqueue(item);
        Ok(())
    }

    fn pop(&self, _worker_id: usize) -> Option<T> {
        self.dequeue()
    }

    fn len(&self) -> usize {
        Self::len(self)
    }

    fn capacity(&self) -> Option<usize> {
        self.limit
    }

    fn name(&self) -> &'static str {
        "lock_free"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fifo_single_producer_single_consumer() {
        let q = LockFreeQueue::new();
        for i in 0..100 {
            q.enqueue(i);
        }
        assert_eq!(q.len(), 100);
        for i in 0..100 {
            assert_eq!(q.dequeue(), Some(i));
        }
        assert!(q.dequeue().is_none());
        assert!(q.is_empty());
    }

    #[test]
    fn test_interleaved_enqueue_dequeue() {
        let q = LockFreeQueue::new();
        q.enqueue("a");
        q.enqueue("b");
        assert_eq!(q.dequeue(), Some("a"));
        q.enqueue("c");
        assert_eq!(q.dequeue(), Some("b"));
        assert_eq!(q.dequeue(), Some("c"));
        assert_eq!(q.dequeue(), None);
    }

    #[test]
    fn test_limit_reports_full() {
        let q = LockFreeQueue::with_limit(2);
        assert!(q.push(1, 0).is_ok());
        assert!(q.push(2, 0).is_ok());
        assert_eq!(q.push(3, 0), Err(3));
        assert_eq!(q.pop(0), Some(1));
        assert!(q.push(3, 0).is_ok());
        assert_eq!(JobQueue::capacity(&q), Some(2));
    }

    #[test]
    fn test_drop_releases_queued_items() {
        let marker = Arc::new(());
        {
            let q = LockFreeQueue::new();
            for _ in 0..10 {
                q.enqueue(Arc::clone(&marker));
            }
            let _ = q.dequeue();
        }
        assert_eq!(Arc::strong_count(&marker), 1);
    }

    #[test]
    fn test_concurrent_producers_consumers_lose_nothing() {
        const PRODUCERS: usize = 4;
        const PER_PRODUCER: usize = 2_000;

        let q = Arc::new(LockFreeQueue::new());
        let consumed = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let done = Arc::new(std::sync::atomic::AtomicBool::new(false));

        thread::scope(|s| {
            let producers: Vec<_> = (0..PRODUCERS)
                .map(|p| {
                    let q = Arc::clone(&q);
                    s.spawn(move || {
                        for i in 0..PER_PRODUCER {
                            q.enqueue(p * PER_PRODUCER + i);
                        }
                    })
                })
                .collect();

            for _ in 0..4 {
                let q = Arc::clone(&q);
                let consumed = Arc::clone(&consumed);
                let done = Arc::clone(&done);
                s.spawn(move || {
                    let mut local = Vec::new();
                    loop {
                        match q.dequeue() {
                            Some(v) => local.push(v),
                            None if done.load(Ordering::Acquire) => {
                                // Producers finished; drain what is left.
                                while let Some(v) = q.dequeue() {
                                    local.push(v);
                                }
                                break;
                            }
                            None => thread::yield_now(),
                        }
                    }
                    consumed.lock().extend(local);
                });
            }

            for p in producers {
                p.join().expect("producer panicked");
            }
            done.store(true, Ordering::Release);
        });

        let consumed = consumed.lock();
        assert_eq!(consumed.len(), PRODUCERS * PER_PRODUCER);
        let unique: HashSet<_> = consumed.iter().copied().collect();
        assert_eq!(unique.len(), PRODUCERS * PER_PRODUCER);
        assert!(q.is_empty());
    }

    #[test]
    fn test_per_producer_order_preserved() {
        let q = Arc::new(LockFreeQueue::new());
        thread::scope(|s| {
            for p in 0..3usize {
                let q = Arc::clone(&q);
                s.spawn(move || {
                    for i in 0..500usize {
                        q.enqueue((p, i));
                    }
                });
            }
        });
        let mut last = [None::<usize>; 3];
        while let Some((p, i)) = q.dequeue() {
            if let Some(prev) = last[p] {
                assert!(i > prev, "producer {p} reordered: {prev} then {i}");
            }
            last[p] = Some(i);
        }
        assert_eq!(last, [Some(499); 3]);
    }
}
