//! Transactional processor: at-least-once, idempotent within a window.
//!
//! A delivery is retried up to `max_retries` with linearly growing sleeps;
//! success records the event id in the dedup set so a redelivery inside
//! the idempotency window is skipped silently. Only a successful handle
//! marks the id, which is what keeps failed deliveries retryable later.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::observer::ObserverRegistry;
use super::{HandleFn, Processor};
use crate::core::bus::DeadLetterQueue;
use crate::core::event::Event;
use crate::core::memory::PooledEvent;
use crate::core::metrics::{names, ComponentMetrics, LatencyHistogram, MetricsRegistry};
use crate::core::queues::DedupSet;
use crate::core::storage::StorageEngine;
use crate::core::util::clock::{now_ms, now_ns};

/// Default retry budget per delivery.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default gate between opportunistic dedup cleanups.
pub const DEFAULT_CLEANUP_INTERVAL_MS: u64 = 10_000;

pub struct TransactionalProcessor {
    storage: Option<Arc<dyn StorageEngine>>,
    dlq: Arc<DeadLetterQueue>,
    observers: Arc<ObserverRegistry>,
    metrics: Arc<ComponentMetrics>,
    registry: Arc<MetricsRegistry>,
    dedup: DedupSet,
    latency: Arc<LatencyHistogram>,
    paused: AtomicBool,
    last_cleanup_ms: AtomicU64,
    cleanup_interval_ms: u64,
    max_retries: u32,
    handle_hook: Mutex<Option<Arc<HandleFn>>>,
}

impl TransactionalProcessor {
    pub fn new(
        storage: Option<Arc<dyn StorageEngine>>,
        dlq: Arc<DeadLetterQueue>,
        observers: Arc<ObserverRegistry>,
        registry: Arc<MetricsRegistry>,
        dedup_window_ms: u64,
        cleanup_interval_ms: u64,
        max_retries: u32,
    ) -> Arc<Self> {
        let metrics = registry.metrics(names::TRANSACTIONAL);
        Arc::new(Self {
            storage,
            dlq,
            observers,
            metrics,
            registry,
            dedup: DedupSet::new(dedup_window_ms),
            latency: Arc::new(LatencyHistogram::new()),
            paused: AtomicBool::new(false),
            last_cleanup_ms: AtomicU64::new(0),
            cleanup_interval_ms,
            max_retries,
            handle_hook: Mutex::new(None),
        })
    }

    /// Control-plane pause flag. A paused processor diverts incoming
    /// deliveries to the DLQ instead of executing them.
    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Release);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Replace the built-in business logic. Tests use this to force
    /// failures.
    pub fn set_handle_hook(&self, hook: Arc<HandleFn>) {
        *self.handle_hook.lock().unwrap_or_else(|e| e.into_inner()) = Some(hook);
    }

    pub fn latency_histogram(&self) -> &Arc<LatencyHistogram> {
        &self.latency
    }

    pub fn dedup(&self) -> &DedupSet {
        &self.dedup
    }

    /// At most one caller per interval wins the CAS and runs cleanup; the
    /// rest skip. Keeps eviction out of the steady-state hot path.
    fn maybe_cleanup(&self, now: u64) {
        let last = self.last_cleanup_ms.load(Ordering::Acquire);
        if last != 0 && now.saturating_sub(last) <= self.cleanup_interval_ms {
            return;
        }
        if self
            .last_cleanup_ms
            .compare_exchange(last, now, Ordering::Release, Ordering::Acquire)
            .is_ok()
        {
            debug!(now_ms = now, "running idempotency table cleanup");
            self.dedup.cleanup(now);
        }
    }

    fn handle(&self, event: &Event) -> bool {
        if event.topic.contains("payment") {
            debug!(id = event.header.id, "processing payment transaction");
            return true;
        }
        if event.topic.contains("audit") {
            debug!(id = event.header.id, "recording audit log entry");
            return true;
        }
        if event.topic.contains("state") {
            debug!(id = event.header.id, "applying state mutation");
            return true;
        }
        debug!(id = event.header.id, topic = %event.topic, "transactional processing");
        true
    }
}

impl Processor for TransactionalProcessor {
    fn name(&self) -> &'static str {
        names::TRANSACTIONAL
    }

    fn start(&self) {
        info!(
            max_retries = self.max_retries,
            dedup_window_ms = self.dedup.window_ms(),
            storage = self.storage.is_some(),
            "transactional processor started"
        );
    }

    fn stop(&self) {
        if let Some(storage) = &self.storage {
            if let Err(e) = storage.flush() {
                error!(error = %e, "storage flush failed on transactional stop");
            }
        }
        info!("transactional processor stopped");
    }

    fn process(&self, event: PooledEvent) {
        if self.is_paused() {
            debug!(id = event.header.id, "processor paused, diverting event");
            self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
            self.dlq.push(&event);
            self.observers
                .notify_dropped(&event, self.name(), "processor_paused");
            return;
        }

        let now = now_ms();

        if self.dedup.is_duplicate(event.header.id, now) {
            debug!(id = event.header.id, "duplicate delivery, skipping");
            self.metrics.skipped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        self.maybe_cleanup(now);

        let hook = self
            .handle_hook
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let mut success = false;
        for attempt in 1..=self.max_retries {
            let handled = match &hook {
                Some(hook) => hook(&event),
                None => self.handle(&event),
            };
            if handled {
                success = true;
                break;
            }
            if attempt < self.max_retries {
                self.metrics.retries.fetch_add(1, Ordering::Relaxed);
                warn!(
                    id = event.header.id,
                    attempt,
                    max_retries = self.max_retries,
                    "transactional handling failed, retrying"
                );
                thread::sleep(Duration::from_millis(10 * attempt as u64));
            }
        }

        if success {
            if !self.dedup.insert(event.header.id, now) {
                warn!(id = event.header.id, "concurrent duplicate insert detected");
            }
            self.metrics.processed.fetch_add(1, Ordering::Relaxed);

            if let Some(storage) = &self.storage {
                if let Err(e) = storage.store_event(&event) {
                    self.metrics.errors.fetch_add(1, Ordering::Relaxed);
                    error!(id = event.header.id, error = %e, "durable write failed");
                }
            }

            if event.dequeue_ns > 0 {
                let latency_ns = now_ns().saturating_sub(event.dequeue_ns);
                self.latency.record(latency_ns);
                self.metrics.record_processing_ns(latency_ns);
            }

            self.registry.update_event_timestamp(self.name());
            self.observers.notify_processed(&event, self.name());
        } else {
            error!(
                id = event.header.id,
                retries = self.max_retries,
                "delivery failed after all retries, diverting to DLQ"
            );
            self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
            self.dlq.push(&event);
            self.observers
                .notify_dropped(&event, self.name(), "max_retries_exceeded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::control::thresholds::ControlThresholds;
    use crate::core::event::{EventHeader, EventPriority};
    use std::sync::atomic::AtomicU32;

    fn processor(max_retries: u32) -> (Arc<TransactionalProcessor>, Arc<MetricsRegistry>) {
        let registry = MetricsRegistry::new(ControlThresholds::default());
        let proc = TransactionalProcessor::new(
            None,
            Arc::new(DeadLetterQueue::new()),
            ObserverRegistry::new(),
            Arc::clone(&registry),
            60_000,
            10_000,
            max_retries,
        );
        (proc, registry)
    }

    fn event(id: u64, topic: &str) -> PooledEvent {
        let mut evt = Event::new(
            EventHeader {
                id,
                priority: EventPriority::Medium,
                ..Default::default()
            },
            topic.to_string(),
            vec![],
            Default::default(),
        );
        evt.dequeue_ns = now_ns();
        PooledEvent::detached(evt)
    }

    #[test]
    fn duplicate_delivery_is_silently_skipped() {
        let (proc, registry) = processor(3);
        proc.process(event(42, "payment/txn"));
        proc.process(event(42, "payment/txn"));

        let snap = registry.snapshot_one(names::TRANSACTIONAL).unwrap();
        assert_eq!(snap.processed, 1);
        assert_eq!(snap.skipped, 1);
        assert_eq!(snap.dropped, 0);
        assert_eq!(proc.dlq.total_dropped(), 0);
    }

    #[test]
    fn transient_failure_is_retried_to_success() {
        let (proc, registry) = processor(3);
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);
        proc.set_handle_hook(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::Relaxed) >= 1
        }));
        proc.process(event(7, "payment/txn"));

        assert_eq!(attempts.load(Ordering::Relaxed), 2);
        let snap = registry.snapshot_one(names::TRANSACTIONAL).unwrap();
        assert_eq!(snap.processed, 1);
        assert_eq!(snap.retries, 1);
    }

    #[test]
    fn exhausted_retries_divert_to_dlq_and_stay_retryable() {
        let (proc, registry) = processor(2);
        proc.set_handle_hook(Arc::new(|_| false));
        proc.process(event(9, "payment/txn"));

        let snap = registry.snapshot_one(names::TRANSACTIONAL).unwrap();
        assert_eq!(snap.processed, 0);
        assert_eq!(snap.dropped, 1);
        assert_eq!(proc.dlq.total_dropped(), 1);
        // A failed delivery never enters the dedup table.
        assert!(!proc.dedup().is_duplicate(9, now_ms()));
    }

    #[test]
    fn paused_processor_diverts_deliveries() {
        let (proc, registry) = processor(3);
        proc.set_paused(true);
        proc.process(event(5, "payment/txn"));
        let snap = registry.snapshot_one(names::TRANSACTIONAL).unwrap();
        assert_eq!(snap.dropped, 1);
        assert_eq!(proc.dlq.total_dropped(), 1);

        proc.set_paused(false);
        proc.process(event(5, "payment/txn"));
        let snap = registry.snapshot_one(names::TRANSACTIONAL).unwrap();
        assert_eq!(snap.processed, 1);
    }

    #[test]
    fn success_records_queue_latency() {
        let (proc, _registry) = processor(3);
        proc.process(event(11, "audit/login"));
        assert_eq!(proc.latency_histogram().total_count(), 1);
    }
}
