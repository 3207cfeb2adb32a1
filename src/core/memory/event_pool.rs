//! Pre-allocated event reuse pool.
//!
//! A pool pre-constructs `capacity` boxed events and hands them out as
//! [`PooledEvent`] guards. Dropping a guard returns the box to the
//! originating pool in O(1); events acquired while the pool was empty are
//! plain heap allocations that are freed on drop. The free list is a
//! lock-free `ArrayQueue` so the final release may happen on any thread
//! (processors drop events far from the ingester that created them), while
//! acquisition stays with the single owning producer thread.
//!
//! A release that finds the free list already full is the double-release /
//! foreign-event case: the box is treated as heap-origin and freed.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crossbeam_queue::ArrayQueue;
use tracing::debug;

use crate::core::event::Event;

pub struct EventPool {
    free: ArrayQueue<Box<Event>>,
    capacity: usize,
}

impl EventPool {
    pub fn new(capacity: usize) -> Arc<Self> {
        let free = ArrayQueue::new(capacity);
        for _ in 0..capacity {
            // Pre-allocation cannot fail: the queue was sized to capacity.
            let _ = free.push(Box::new(Event::default()));
        }
        Arc::new(Self { free, capacity })
    }

    /// Take an event slot. Falls back to a fresh heap allocation when the
    /// pool is exhausted; the fallback is tagged non-pooled and freed on
    /// drop instead of returned.
    pub fn acquire(self: &Arc<Self>) -> PooledEvent {
        match self.free.pop() {
            Some(mut slot) => {
                slot.reset();
                PooledEvent {
                    event: Some(slot),
                    origin: Some(Arc::clone(self)),
                }
            }
            None => {
                debug!(capacity = self.capacity, "event pool exhausted, heap fallback");
                PooledEvent {
                    event: Some(Box::new(Event::default())),
                    origin: None,
                }
            }
        }
    }

    fn release(&self, slot: Box<Event>) {
        // A full free list means this box cannot be pool-origin (or is a
        // double release); let it drop as a heap allocation.
        if self.free.push(slot).is_err() {
            debug!("release with full free list, freeing heap-origin event");
        }
    }

    /// Slots currently available for acquisition.
    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Pool-origin events currently held by the pipeline.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.free.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Owning handle to an event. The pipeline moves this value through the
/// dispatcher inbox, the bus queues and into a processor; wherever it is
/// finally dropped, the underlying slot flows back to the pool it came
/// from.
pub struct PooledEvent {
    event: Option<Box<Event>>,
    origin: Option<Arc<EventPool>>,
}

impl PooledEvent {
    /// Wrap an event that does not belong to any pool.
    pub fn detached(event: Event) -> Self {
        Self {
            event: Some(Box::new(event)),
            origin: None,
        }
    }

    pub fn is_pooled(&self) -> bool {
        self.origin.is_some()
    }

    /// Move the event value out, consuming the handle. The pool slot (if
    /// any) is recycled immediately with a fresh default event.
    pub fn into_event(mut self) -> Event {
        let mut slot = self.event.take().expect("event present until drop");
        let event = std::mem::take(&mut *slot);
        if let Some(pool) = self.origin.take() {
            pool.release(slot);
        }
        event
    }
}

impl Deref for PooledEvent {
    type Target = Event;

    fn deref(&self) -> &Event {
        self.event.as_ref().expect("event present until drop")
    }
}

impl DerefMut for PooledEvent {
    fn deref_mut(&mut self) -> &mut Event {
        self.event.as_mut().expect("event present until drop")
    }
}

impl fmt::Debug for PooledEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledEvent")
            .field("id", &self.header.id)
            .field("topic", &self.topic)
            .field("pooled", &self.is_pooled())
            .finish()
    }
}

impl Drop for PooledEvent {
    fn drop(&mut self) {
        if let Some(slot) = self.event.take() {
            if let Some(pool) = self.origin.take() {
                pool.release(slot);
            }
        }
    }
}
