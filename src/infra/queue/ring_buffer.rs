//! Bounded lock-free MPMC ring buffer with power-of-two capacity.
//!
//! # Invariants
//! - Capacity is a power of two; indices are `counter & mask`.
//! - `head` (next put position) and `tail` (next get position) only grow.
//! - `head - tail <= capacity` at every point in time.
//!
//! # Slot protocol
//!
//! Each slot carries a stamp. A slot is free for the put at position `p`
//! when `stamp == 2p`, and holds a value for the get at position `p` when
//! `stamp == 2p + 1`. After a get the slot is recycled to `2(p + capacity)`.
//! Doubling keeps the free and full states of consecutive positions apart
//! even when every position maps to the same slot (capacity 1). A producer
//! claims position `p` by CAS-advancing `head` only when the slot reports
//! free, which is exactly the `head - tail < capacity` condition; the value
//! is then written and published with a release store of the stamp. A
//! consumer symmetrically CAS-advances `tail` only once the value is
//! published, so a claimed slot is never read half-written.

#![allow(unsafe_code)]

use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;

use crate::core::JobQueue;

struct Slot<T> {
    stamp: AtomicUsize,
    value: UnsafeCell<MaybeUninit<T>>,
}

/// Fixed-capacity lock-free ring buffer.
pub struct RingBuffer<T> {
    slots: Box<[Slot<T>]>,
    mask: usize,
    head: CachePadded<AtomicUsize>,
    tail: CachePadded<AtomicUsize>,
}

// SAFETY: a value is accessed only by the producer that claimed its slot and
// then by the single consumer that claimed it; the stamp hands it
// over with release/acquire ordering.
unsafe impl<T: Send> Send for RingBuffer<T> {}
// SAFETY: see above.
unsafe impl<T: Send> Sync for RingBuffer<T> {}

/// Stamp of a slot that is free for the put at `pos`.
const fn free_stamp(pos: usize) -> usize {
    pos.wrapping_mul(2)
}

/// Stamp of a slot holding the value for the get at `pos`.
const fn full_stamp(pos: usize) -> usize {
    pos.wrapping_mul(2).wrapping_add(1)
}

impl<T> RingBuffer<T> {
    /// Create a buffer holding at least `capacity` items (rounded up to the
    /// next power of two, minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1).next_power_of_two();
        let slots = (0..capacity)
            .map(|i| Slot {
                stamp: AtomicUsize::new(free_stamp(i)),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect();
        Self {
            slots,
            mask: capacity - 1,
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    /// Store an item.
    ///
    /// # Errors
    ///
    /// Returns the item when the buffer is full.
    pub fn put(&self, item: T) -> Result<(), T> {
        let mut pos = self.head.load(Ordering::Relaxed);
        loop {
            let slot = &self.slots[pos & self.mask];
            let stamp = slot.stamp.load(Ordering::Acquire);
            #[allow(clippy::cast_possible_wrap)]
            let diff = stamp.wrapping_sub(free_stamp(pos)) as isize;

            if diff == 0 {
                match self.head.compare_exchange_weak(
                    pos,
                    pos.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // SAFETY: the CAS gave this thread exclusive write
                        // access to the slot until the stamp is published.
                        unsafe { (*slot.value.get()).write(item) };
                        slot.stamp.store(full_stamp(pos), Ordering::Release);
                        return Ok(());
                    }
                    Err(current) => pos = current,
                }
            } else if diff < 0 {
                // Slot still holds the value from the previous lap: full.
                return Err(item);
            } else {
                pos = self.head.load(Ordering::Relaxed);
            }
        }
    }

    /// Take the oldest item, `None` when empty.
    pub fn get(&self) -> Option<T> {
        let mut pos = self.tail.load(Ordering::Relaxed);
        loop {
            let slot = &self.slots[pos & self.mask];
            let stamp = slot.stamp.load(Ordering::Acquire);
            #[allow(clippy::cast_possible_wrap)]
            let diff = stamp.wrapping_sub(full_stamp(pos)) as isize;

            if diff == 0 {
                match self.tail.compare_exchange_weak(
                    pos,
                    pos.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // SAFETY: the stamp check proved the value is
                        // initialized and the CAS made this thread its only
                        // reader.
                        let item = unsafe { (*slot.value.get()).assume_init_read() };
                        slot.stamp.store(
                            free_stamp(pos.wrapping_add(self.mask + 1)),
                            Ordering::Release,
                        );
                        return Some(item);
                    }
                    Err(current) => pos = current,
                }
            } else if diff < 0 {
                return None;
            } else {
                pos = self.tail.load(Ordering::Relaxed);
            }
        }
    }

    /// Number of claimed-but-not-taken positions.
    #[must_use]
    pub fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        head.wrapping_sub(tail).min(self.capacity())
    }

    /// Whether the buffer appears empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the buffer appears full.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    /// Slot count (a power of two).
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.mask + 1
    }
}

impl<T> Drop for RingBuffer<T> {
    fn drop(&mut self) {
        while self.get().is_some() {}
    }
}

impl<T> fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingBuffer")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

impl<T: Send> JobQueue<T> for RingBuffer<T> {
    fn push(&self, item: T, _hint: usize) -> Result<(), T> {
        self.put(item)
    }

    fn pop(&self, _worker_id: usize) -> Option<T> {
        self.get()
    }

    fn len(&self) -> usize {
        Self::len(self)
    }

    fn capacity(&self) -> Option<usize> {
        Some(Self::capacity(self))
    }

    fn name(&self) -> &'static str {
        "ring_buffer"
    }
}
