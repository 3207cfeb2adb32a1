//! Three-queue priority event bus.
//!
//! The queues deliberately differ in structure:
//! - REALTIME is a lock-free SPSC ring (the dispatcher is the only pusher,
//!   the realtime worker the only popper) with DROP_OLD overflow.
//! - TRANSACTIONAL is a mutex+condvar deque with BLOCK_PRODUCER overflow:
//!   correctness can afford a bounded wait to avoid drops.
//! - BATCH is a mutex+condvar deque with DROP_NEW overflow: batch data is
//!   drop-safe, so the simplest structure wins.
//!
//! All overflow and drop paths divert through the shared [`DeadLetterQueue`]
//! and update the "EventBus" metric counters.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use tracing::{debug, warn};

use super::dead_letter::DeadLetterQueue;
use crate::core::metrics::{names, ComponentMetrics, MetricsRegistry};
use crate::core::memory::PooledEvent;
use crate::core::queues::{spsc_ring, SpscConsumer, SpscProducer};
use crate::core::util::clock::now_ns;

/// How many events a control-plane batch drop extracts at most.
pub const DROP_BATCH_SIZE: usize = 256;

/// How long a BLOCK_PRODUCER push waits for capacity before failing.
pub const BLOCK_PRODUCER_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueId {
    Realtime,
    Transactional,
    Batch,
}

impl QueueId {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueId::Realtime => "REALTIME",
            QueueId::Transactional => "TRANSACTIONAL",
            QueueId::Batch => "BATCH",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Evict the eldest entry to the DLQ, then admit the new one.
    DropOld,
    /// Wait up to [`BLOCK_PRODUCER_TIMEOUT`] for capacity, then fail.
    BlockProducer,
    /// Divert the incoming event to the DLQ.
    DropNew,
}

/// Outcome of a push attempt. Ownership of the event is explicit: a
/// refused push hands the event back so the caller can retry or divert it;
/// a diverted push has already sent the event to the DLQ.
#[derive(Debug)]
pub enum PushOutcome {
    /// The event is in the queue.
    Accepted,
    /// The queue stayed full past the block timeout; the event is returned
    /// to the caller.
    Refused(PooledEvent),
    /// The overflow policy consumed the event into the DLQ.
    Diverted,
}

impl PushOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, PushOutcome::Accepted)
    }
}

/// Derived fill level of the realtime queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum PressureLevel {
    Normal = 0,
    High = 1,
    Critical = 2,
}

impl PressureLevel {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => PressureLevel::High,
            2 => PressureLevel::Critical,
            _ => PressureLevel::Normal,
        }
    }
}

/// Queue capacities, fixed at construction.
#[derive(Debug, Clone)]
pub struct BusCapacities {
    pub realtime: usize,
    pub transactional: usize,
    pub batch: usize,
}

impl Default for BusCapacities {
    fn default() -> Self {
        Self {
            realtime: 16384,
            transactional: 131072,
            batch: 32768,
        }
    }
}

struct DequeQueue {
    capacity: usize,
    policy: OverflowPolicy,
    state: Mutex<VecDeque<PooledEvent>>,
    not_full: Condvar,
    not_empty: Condvar,
}

impl DequeQueue {
    fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            capacity,
            policy,
            state: Mutex::new(VecDeque::new()),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        }
    }

    fn len(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

pub struct EventBus {
    realtime_tx: SpscProducer<PooledEvent>,
    // The consumer handle behind a mutex keeps the ring's single-consumer
    // contract intact while DROP_OLD eviction (dispatcher thread) and
    // worker pops share the tail side. Uncontended in steady state.
    realtime_rx: Mutex<SpscConsumer<PooledEvent>>,
    pressure: AtomicU8,
    pressure_high: usize,
    pressure_critical: usize,
    transactional: DequeQueue,
    batch: DequeQueue,
    dlq: Arc<DeadLetterQueue>,
    metrics: Arc<ComponentMetrics>,
    registry: Arc<MetricsRegistry>,
}

impl EventBus {
    pub fn new(
        capacities: BusCapacities,
        dlq: Arc<DeadLetterQueue>,
        registry: Arc<MetricsRegistry>,
    ) -> Self {
        let (realtime_tx, realtime_rx) = spsc_ring(capacities.realtime);
        // 12000/14000 at the default 16384 capacity, scaled proportionally
        // for non-default capacities.
        let pressure_high = capacities.realtime * 12000 / 16384;
        let pressure_critical = capacities.realtime * 14000 / 16384;
        let metrics = registry.metrics(names::EVENT_BUS);
        Self {
            realtime_tx,
            realtime_rx: Mutex::new(realtime_rx),
            pressure: AtomicU8::new(PressureLevel::Normal as u8),
            pressure_high,
            pressure_critical,
            transactional: DequeQueue::new(capacities.transactional, OverflowPolicy::BlockProducer),
            batch: DequeQueue::new(capacities.batch, OverflowPolicy::DropNew),
            dlq,
            metrics,
            registry,
        }
    }

    pub fn dlq(&self) -> &Arc<DeadLetterQueue> {
        &self.dlq
    }

    /// Push an event to a queue, applying that queue's overflow policy on
    /// overflow.
    pub fn push(&self, queue: QueueId, event: PooledEvent) -> PushOutcome {
        match queue {
            QueueId::Realtime => self.push_realtime(event),
            QueueId::Transactional => self.push_deque(&self.transactional, queue, event),
            QueueId::Batch => self.push_deque(&self.batch, queue, event),
        }
    }

    fn push_realtime(&self, event: PooledEvent) -> PushOutcome {
        let used = self.realtime_tx.used();
        self.metrics.queue_depth.store(used as u64, Ordering::Relaxed);
        self.update_pressure(used);

        let event = match self.realtime_tx.push(event) {
            Ok(()) => {
                self.metrics.enqueued.fetch_add(1, Ordering::Relaxed);
                self.registry.update_event_timestamp(names::EVENT_BUS);
                return PushOutcome::Accepted;
            }
            Err(event) => event,
        };

        // Ring full: DROP_OLD evicts the eldest to make room.
        let evicted = self
            .realtime_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop();
        if let Some(old) = evicted {
            self.dlq.push(&old);
            self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
            self.metrics.overflow_drops.fetch_add(1, Ordering::Relaxed);
            warn!(evicted = old.header.id, "REALTIME overflow, evicted eldest to DLQ");
        }
        match self.realtime_tx.push(event) {
            Ok(()) => {
                self.metrics.enqueued.fetch_add(1, Ordering::Relaxed);
                self.registry.update_event_timestamp(names::EVENT_BUS);
                PushOutcome::Accepted
            }
            Err(event) => {
                self.dlq.push(&event);
                self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
                self.metrics.overflow_drops.fetch_add(1, Ordering::Relaxed);
                warn!(id = event.header.id, "REALTIME overflow, dropped incoming event to DLQ");
                PushOutcome::Diverted
            }
        }
    }

    fn push_deque(&self, q: &DequeQueue, queue: QueueId, event: PooledEvent) -> PushOutcome {
        let mut guard = q.state.lock().unwrap_or_else(|e| e.into_inner());
        if guard.len() >= q.capacity {
            match q.policy {
                OverflowPolicy::BlockProducer => {
                    let (g, _timeout) = q
                        .not_full
                        .wait_timeout_while(guard, BLOCK_PRODUCER_TIMEOUT, |d| {
                            d.len() >= q.capacity
                        })
                        .unwrap_or_else(|e| e.into_inner());
                    guard = g;
                    if guard.len() >= q.capacity {
                        drop(guard);
                        self.metrics.blocked.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            queue = queue.as_str(),
                            id = event.header.id,
                            "queue full, producer block timed out"
                        );
                        return PushOutcome::Refused(event);
                    }
                }
                OverflowPolicy::DropNew => {
                    drop(guard);
                    self.dlq.push(&event);
                    self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
                    self.metrics.overflow_drops.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        queue = queue.as_str(),
                        id = event.header.id,
                        "queue overflow, dropped incoming event to DLQ"
                    );
                    return PushOutcome::Diverted;
                }
                OverflowPolicy::DropOld => {
                    if let Some(old) = guard.pop_front() {
                        self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
                        self.metrics.overflow_drops.fetch_add(1, Ordering::Relaxed);
                        self.dlq.push(&old);
                    }
                }
            }
        }
        guard.push_back(event);
        drop(guard);
        self.metrics.enqueued.fetch_add(1, Ordering::Relaxed);
        self.registry.update_event_timestamp(names::EVENT_BUS);
        q.not_empty.notify_one();
        PushOutcome::Accepted
    }

    /// Pop from a queue. Non-blocking for REALTIME; blocks up to `timeout`
    /// for the deque queues. Stamps `dequeue_ns` on the returned event.
    pub fn pop(&self, queue: QueueId, timeout: Duration) -> Option<PooledEvent> {
        match queue {
            QueueId::Realtime => {
                let mut event = self
                    .realtime_rx
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .pop()?;
                event.dequeue_ns = now_ns();
                self.metrics.dequeued.fetch_add(1, Ordering::Relaxed);
                Some(event)
            }
            QueueId::Transactional => self.pop_deque(&self.transactional, timeout),
            QueueId::Batch => self.pop_deque(&self.batch, timeout),
        }
    }

    fn pop_deque(&self, q: &DequeQueue, timeout: Duration) -> Option<PooledEvent> {
        let mut guard = q.state.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_empty() {
            let (g, _timeout) = q
                .not_empty
                .wait_timeout_while(guard, timeout, |d| d.is_empty())
                .unwrap_or_else(|e| e.into_inner());
            guard = g;
        }
        let popped = guard.pop_front();
        drop(guard);
        popped.map(|mut event| {
            event.dequeue_ns = now_ns();
            self.metrics.dequeued.fetch_add(1, Ordering::Relaxed);
            q.not_full.notify_one();
            event
        })
    }

    pub fn size(&self, queue: QueueId) -> usize {
        match queue {
            QueueId::Realtime => self.realtime_tx.used(),
            QueueId::Transactional => self.transactional.len(),
            QueueId::Batch => self.batch.len(),
        }
    }

    pub fn realtime_pressure(&self) -> PressureLevel {
        PressureLevel::from_u8(self.pressure.load(Ordering::Relaxed))
    }

    /// Atomically extract up to [`DROP_BATCH_SIZE`] events from the front
    /// of a deque queue and divert them to the DLQ. Returns the number
    /// dropped. The REALTIME ring is excluded: draining it from a control
    /// thread would break the single-consumer contract, and the control
    /// plane's drop action only targets BATCH.
    pub fn drop_batch_from(&self, queue: QueueId) -> usize {
        let q = match queue {
            QueueId::Realtime => {
                debug!("batch drop requested for REALTIME, ignored");
                return 0;
            }
            QueueId::Transactional => &self.transactional,
            QueueId::Batch => &self.batch,
        };
        let batch: Vec<PooledEvent> = {
            let mut guard = q.state.lock().unwrap_or_else(|e| e.into_inner());
            let to_drop = DROP_BATCH_SIZE.min(guard.len());
            guard.drain(..to_drop).collect()
        };
        let dropped = batch.len();
        if dropped > 0 {
            q.not_full.notify_all();
            self.dlq.push_batch(&batch);
            self.metrics.dropped.fetch_add(dropped as u64, Ordering::Relaxed);
            warn!(queue = queue.as_str(), dropped, "batch drop diverted events to DLQ");
        }
        dropped
    }

    fn update_pressure(&self, used: usize) {
        let level = if used >= self.pressure_critical {
            PressureLevel::Critical
        } else if used >= self.pressure_high {
            PressureLevel::High
        } else {
            PressureLevel::Normal
        };
        self.pressure.store(level as u8, Ordering::Relaxed);
    }
}
