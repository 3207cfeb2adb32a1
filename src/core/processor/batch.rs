//! Batch processor: per-topic tumbling window aggregation.
//!
//! Events accumulate in a per-topic bucket; once the window elapses the
//! bucket is flushed as a single aggregate (count, byte total, id range),
//! each event is appended to storage, and the bucket restarts. Buckets are
//! `Arc`'d behind the map lock so a flush never races a rehash. `stop`
//! flushes everything that remains.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use super::observer::ObserverRegistry;
use super::Processor;
use crate::core::bus::{DeadLetterQueue, EventBus, QueueId};
use crate::core::memory::PooledEvent;
use crate::core::metrics::{names, ComponentMetrics, MetricsRegistry};
use crate::core::storage::StorageEngine;

/// Default tumbling window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(5);

#[derive(Default)]
struct TopicBucket {
    events: Vec<PooledEvent>,
    last_flush: Option<Instant>,
}

pub struct BatchProcessor {
    window: Duration,
    bus: Option<Arc<EventBus>>,
    buckets: Mutex<HashMap<String, Arc<Mutex<TopicBucket>>>>,
    drop_events: AtomicBool,
    storage: Option<Arc<dyn StorageEngine>>,
    dlq: Arc<DeadLetterQueue>,
    observers: Arc<ObserverRegistry>,
    metrics: Arc<ComponentMetrics>,
    registry: Arc<MetricsRegistry>,
}

impl BatchProcessor {
    pub fn new(
        window: Duration,
        bus: Option<Arc<EventBus>>,
        storage: Option<Arc<dyn StorageEngine>>,
        dlq: Arc<DeadLetterQueue>,
        observers: Arc<ObserverRegistry>,
        registry: Arc<MetricsRegistry>,
    ) -> Arc<Self> {
        let metrics = registry.metrics(names::BATCH);
        Arc::new(Self {
            window,
            bus,
            buckets: Mutex::new(HashMap::new()),
            drop_events: AtomicBool::new(false),
            storage,
            dlq,
            observers,
            metrics,
            registry,
        })
    }

    /// Control-plane drop flag. While set, incoming events go straight to
    /// the DLQ and each arrival also triggers a batch drop from the bus
    /// queue.
    pub fn set_drop_events(&self, drop: bool) {
        self.drop_events.store(drop, Ordering::Release);
    }

    pub fn is_dropping(&self) -> bool {
        self.drop_events.load(Ordering::Acquire)
    }

    /// Flush one topic's bucket immediately, regardless of window state.
    pub fn flush_topic(&self, topic: &str) {
        let bucket = {
            let buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
            buckets.get(topic).cloned()
        };
        if let Some(bucket) = bucket {
            let mut bucket = bucket.lock().unwrap_or_else(|e| e.into_inner());
            self.flush_bucket_locked(&mut bucket, topic);
        }
    }

    fn flush_bucket_locked(&self, bucket: &mut TopicBucket, topic: &str) {
        if bucket.events.is_empty() {
            return;
        }
        let count = bucket.events.len();
        let mut total_bytes = 0u64;
        let mut min_id = u64::MAX;
        let mut max_id = 0u64;
        for event in &bucket.events {
            total_bytes += event.body.len() as u64;
            min_id = min_id.min(event.header.id);
            max_id = max_id.max(event.header.id);
        }
        info!(
            topic,
            count,
            total_bytes,
            min_id,
            max_id,
            window_ms = self.window.as_millis() as u64,
            "batch window flush"
        );

        if let Some(storage) = &self.storage {
            for event in &bucket.events {
                if let Err(e) = storage.store_event(event) {
                    self.metrics.errors.fetch_add(1, Ordering::Relaxed);
                    error!(id = event.header.id, error = %e, "batch store failed");
                }
            }
            if let Err(e) = storage.flush() {
                self.metrics.errors.fetch_add(1, Ordering::Relaxed);
                error!(error = %e, "batch storage flush failed");
            }
        }

        for event in &bucket.events {
            self.observers.notify_processed(event, names::BATCH);
        }
        bucket.events.clear();
    }
}

impl Processor for BatchProcessor {
    fn name(&self) -> &'static str {
        names::BATCH
    }

    fn start(&self) {
        info!(
            window_ms = self.window.as_millis() as u64,
            storage = self.storage.is_some(),
            "batch processor started"
        );
    }

    fn stop(&self) {
        let buckets: Vec<(String, Arc<Mutex<TopicBucket>>)> = {
            let map = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
            map.iter().map(|(k, v)| (k.clone(), Arc::clone(v))).collect()
        };
        for (topic, bucket) in buckets {
            let mut bucket = bucket.lock().unwrap_or_else(|e| e.into_inner());
            self.flush_bucket_locked(&mut bucket, &topic);
        }
        if let Some(storage) = &self.storage {
            if let Err(e) = storage.flush() {
                error!(error = %e, "storage flush failed on batch stop");
            }
        }
        info!("batch processor stopped");
    }

    fn process(&self, event: PooledEvent) {
        if self.is_dropping() {
            self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
            self.dlq.push(&event);
            if let Some(bus) = &self.bus {
                let dropped = bus.drop_batch_from(QueueId::Batch);
                if dropped > 0 {
                    warn!(dropped, "batch drop triggered on bus queue");
                }
            }
            self.observers
                .notify_dropped(&event, self.name(), "control_plane_drop");
            return;
        }

        let now = Instant::now();
        let bucket = {
            let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(
                buckets
                    .entry(event.topic.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(TopicBucket::default()))),
            )
        };

        let topic = event.topic.clone();
        let mut bucket = bucket.lock().unwrap_or_else(|e| e.into_inner());
        bucket.events.push(event);
        self.metrics.processed.fetch_add(1, Ordering::Relaxed);

        match bucket.last_flush {
            None => {
                bucket.last_flush = Some(now);
            }
            Some(last_flush) if now.duration_since(last_flush) >= self.window => {
                self.flush_bucket_locked(&mut bucket, &topic);
                bucket.last_flush = Some(now);
            }
            Some(_) => {}
        }
        self.registry.update_event_timestamp(self.name());
    }
}
