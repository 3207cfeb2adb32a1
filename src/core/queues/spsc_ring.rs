//! Bounded single-producer/single-consumer ring buffer.
//!
//! Capacity must be a power of two so index wrapping is a mask. The
//! producer owns `head`, the consumer owns `tail`; each lives on its own
//! cache line. Empty is `head == tail`, full is `(head + 1) & mask == tail`,
//! so one slot is always sacrificed and a ring of capacity `C` holds at
//! most `C - 1` items.
//!
//! The single-producer/single-consumer contract is enforced by
//! construction: [`spsc_ring`] hands out exactly one [`SpscProducer`] and
//! one [`SpscConsumer`]. Neither handle is `Clone`.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_utils::CachePadded;

struct RingInner<T> {
    buffer: Box<[UnsafeCell<MaybeUninit<T>>]>,
    mask: usize,
    /// Next slot the producer will write. Producer-owned.
    head: CachePadded<AtomicUsize>,
    /// Next slot the consumer will read. Consumer-owned.
    tail: CachePadded<AtomicUsize>,
}

// The ring is shared between exactly two threads; slot access is
// handed over through the release/acquire pair on head and tail.
unsafe impl<T: Send> Sync for RingInner<T> {}
unsafe impl<T: Send> Send for RingInner<T> {}

impl<T> RingInner<T> {
    fn used(&self) -> usize {
        // Best-effort snapshot: both loads acquire, but the pair is not
        // atomic as a whole.
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        head.wrapping_sub(tail) & self.mask
    }
}

impl<T> Drop for RingInner<T> {
    fn drop(&mut self) {
        let head = *self.head.get_mut();
        let mut tail = *self.tail.get_mut();
        while tail != head {
            unsafe {
                (*self.buffer[tail].get()).assume_init_drop();
            }
            tail = (tail + 1) & self.mask;
        }
    }
}

/// Producer half of the ring. Must stay on one thread at a time.
pub struct SpscProducer<T> {
    inner: Arc<RingInner<T>>,
}

/// Consumer half of the ring. Must stay on one thread at a time.
pub struct SpscConsumer<T> {
    inner: Arc<RingInner<T>>,
}

/// Create a ring of the given power-of-two capacity and hand out its two
/// endpoints.
///
/// # Panics
/// Panics if `capacity` is zero or not a power of two; capacities are
/// static configuration, so this is a startup-time programming error.
pub fn spsc_ring<T>(capacity: usize) -> (SpscProducer<T>, SpscConsumer<T>) {
    assert!(
        capacity.is_power_of_two() && capacity > 1,
        "ring capacity must be a power of two > 1"
    );
    let buffer = (0..capacity)
        .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
        .collect::<Vec<_>>()
        .into_boxed_slice();
    let inner = Arc::new(RingInner {
        buffer,
        mask: capacity - 1,
        head: CachePadded::new(AtomicUsize::new(0)),
        tail: CachePadded::new(AtomicUsize::new(0)),
    });
    (
        SpscProducer {
            inner: Arc::clone(&inner),
        },
        SpscConsumer { inner },
    )
}

impl<T> SpscProducer<T> {
    /// Push an item. Returns the item back when the ring is full.
    pub fn push(&self, item: T) -> Result<(), T> {
        let inner = &self.inner;
        let head = inner.head.load(Ordering::Relaxed);
        let next = (head + 1) & inner.mask;
        if next == inner.tail.load(Ordering::Acquire) {
            return Err(item);
        }
        unsafe {
            (*inner.buffer[head].get()).write(item);
        }
        inner.head.store(next, Ordering::Release);
        Ok(())
    }

    /// Best-effort count of occupied slots.
    pub fn used(&self) -> usize {
        self.inner.used()
    }

    pub fn capacity(&self) -> usize {
        self.inner.mask + 1
    }
}

impl<T> SpscConsumer<T> {
    /// Pop the oldest item, or `None` when the ring is empty.
    pub fn pop(&self) -> Option<T> {
        let inner = &self.inner;
        let tail = inner.tail.load(Ordering::Relaxed);
        if tail == inner.head.load(Ordering::Acquire) {
            return None;
        }
        let item = unsafe { (*inner.buffer[tail].get()).assume_init_read() };
        inner.tail.store((tail + 1) & inner.mask, Ordering::Release);
        Some(item)
    }

    /// Best-effort count of occupied slots.
    pub fn used(&self) -> usize {
        self.inner.used()
    }

    pub fn capacity(&self) -> usize {
        self.inner.mask + 1
    }
}
