//! Multi-producer/single-consumer intrusive queue (Vyukov algorithm).
//!
//! Producers swap themselves onto `tail` and then publish the previous
//! tail's `next` pointer with release ordering. The consumer walks
//! `head.next`; a null `next` covers both "empty" and the transient window
//! where a producer has swapped `tail` but not yet linked, so the consumer
//! simply re-polls. A relaxed `len` counter gates admission against the
//! configured capacity; the bound is approximate under contention, which
//! is acceptable for an inbox guard.

use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use crossbeam::utils::CachePadded;

struct Node<T> {
    next: AtomicPtr<Node<T>>,
    value: Option<T>,
}

impl<T> Node<T> {
    fn new(value: Option<T>) -> *mut Node<T> {
        Box::into_raw(Box::new(Node {
            next: AtomicPtr::new(ptr::null_mut()),
            value,
        }))
    }
}

/// Lock-free inbox used by the dispatcher. Any number of producer threads
/// may `push`; exactly one thread may `pop`.
pub struct MpscQueue<T> {
    /// Consumer side: always points at the current stub node.
    head: CachePadded<AtomicPtr<Node<T>>>,
    /// Producer side: last linked node.
    tail: CachePadded<AtomicPtr<Node<T>>>,
    len: CachePadded<AtomicUsize>,
    capacity: usize,
}

unsafe impl<T: Send> Send for MpscQueue<T> {}
unsafe impl<T: Send> Sync for MpscQueue<T> {}

impl<T> MpscQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let stub = Node::new(None);
        Self {
            head: CachePadded::new(AtomicPtr::new(stub)),
            tail: CachePadded::new(AtomicPtr::new(stub)),
            len: CachePadded::new(AtomicUsize::new(0)),
            capacity,
        }
    }

    /// Push from any thread. Returns the value back when the queue is at
    /// capacity.
    pub fn push(&self, value: T) -> Result<(), T> {
        if self.len.load(Ordering::Relaxed) >= self.capacity {
            return Err(value);
        }
        let node = Node::new(Some(value));
        let prev = self.tail.swap(node, Ordering::AcqRel);
        // Publish the link; the consumer's acquire load of `next` pairs
        // with this store.
        unsafe {
            (*prev).next.store(node, Ordering::Release);
        }
        self.len.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Pop the oldest value. Single consumer only; `None` covers both an
    /// empty queue and a producer mid-link, so callers re-poll.
    pub fn pop(&self) -> Option<T> {
        let head = self.head.load(Ordering::Relaxed);
        let next = unsafe { (*head).next.load(Ordering::Acquire) };
        if next.is_null() {
            return None;
        }
        // The next node becomes the new stub; the old stub is freed.
        let value = unsafe { (*next).value.take() };
        self.head.store(next, Ordering::Relaxed);
        unsafe {
            drop(Box::from_raw(head));
        }
        self.len.fetch_sub(1, Ordering::Relaxed);
        value
    }

    /// Approximate number of queued items.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        let head = self.head.load(Ordering::Relaxed);
        unsafe { (*head).next.load(Ordering::Acquire).is_null() }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> Drop for MpscQueue<T> {
    fn drop(&mut self) {
        while self.pop().is_some() {}
        let stub = self.head.load(Ordering::Relaxed);
        unsafe {
            drop(Box::from_raw(stub));
        }
    }
}
