//! Process-wide metric counters keyed by component name.
//!
//! The registry is an explicitly constructed, `Arc`-shared handle injected
//! into every component at build time. The name map grows under a mutex;
//! counter updates go through `Arc<ComponentMetrics>` with relaxed atomics
//! and never touch the map lock. `snapshot` materializes plain structs and
//! derives health from the configured thresholds.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_utils::CachePadded;

use crate::core::control::thresholds::ControlThresholds;
use crate::core::util::clock::{now_ms, now_ns};

/// Component names used across the pipeline.
pub mod names {
    pub const EVENT_BUS: &str = "EventBus";
    pub const DISPATCHER: &str = "Dispatcher";
    pub const REALTIME: &str = "RealtimeProcessor";
    pub const TRANSACTIONAL: &str = "TransactionalProcessor";
    pub const BATCH: &str = "BatchProcessor";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HealthStatus {
    Healthy = 0,
    Degraded = 1,
    Unhealthy = 2,
}

impl HealthStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => HealthStatus::Degraded,
            2 => HealthStatus::Unhealthy,
            _ => HealthStatus::Healthy,
        }
    }
}

/// Lock-free counters for one named component. All updates are relaxed.
pub struct ComponentMetrics {
    pub processed: CachePadded<AtomicU64>,
    pub dropped: CachePadded<AtomicU64>,
    pub errors: CachePadded<AtomicU64>,
    pub skipped: CachePadded<AtomicU64>,
    pub retries: CachePadded<AtomicU64>,
    pub enqueued: CachePadded<AtomicU64>,
    pub dequeued: CachePadded<AtomicU64>,
    pub blocked: CachePadded<AtomicU64>,
    pub overflow_drops: CachePadded<AtomicU64>,
    pub total_processing_ns: CachePadded<AtomicU64>,
    pub max_processing_ns: CachePadded<AtomicU64>,
    pub count_for_avg: CachePadded<AtomicU64>,
    pub last_event_ms: AtomicU64,
    pub queue_depth: AtomicU64,
    pub health: AtomicU8,
}

impl ComponentMetrics {
    fn new() -> Self {
        Self {
            processed: CachePadded::new(AtomicU64::new(0)),
            dropped: CachePadded::new(AtomicU64::new(0)),
            errors: CachePadded::new(AtomicU64::new(0)),
            skipped: CachePadded::new(AtomicU64::new(0)),
            retries: CachePadded::new(AtomicU64::new(0)),
            enqueued: CachePadded::new(AtomicU64::new(0)),
            dequeued: CachePadded::new(AtomicU64::new(0)),
            blocked: CachePadded::new(AtomicU64::new(0)),
            overflow_drops: CachePadded::new(AtomicU64::new(0)),
            total_processing_ns: CachePadded::new(AtomicU64::new(0)),
            max_processing_ns: CachePadded::new(AtomicU64::new(0)),
            count_for_avg: CachePadded::new(AtomicU64::new(0)),
            last_event_ms: AtomicU64::new(0),
            queue_depth: AtomicU64::new(0),
            health: AtomicU8::new(HealthStatus::Healthy as u8),
        }
    }

    /// Accumulate one processing duration into the average/max trackers.
    pub fn record_processing_ns(&self, elapsed_ns: u64) {
        self.total_processing_ns.fetch_add(elapsed_ns, Ordering::Relaxed);
        self.count_for_avg.fetch_add(1, Ordering::Relaxed);
        let mut current = self.max_processing_ns.load(Ordering::Relaxed);
        while elapsed_ns > current {
            match self.max_processing_ns.compare_exchange_weak(
                current,
                elapsed_ns,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }
}

/// Plain-value copy of one component's counters plus derived health.
#[derive(Debug, Clone)]
pub struct MetricSnapshot {
    pub processed: u64,
    pub dropped: u64,
    pub errors: u64,
    pub skipped: u64,
    pub retries: u64,
    pub enqueued: u64,
    pub dequeued: u64,
    pub blocked: u64,
    pub overflow_drops: u64,
    pub total_processing_ns: u64,
    pub max_processing_ns: u64,
    pub count_for_avg: u64,
    pub last_event_ms: u64,
    pub queue_depth: u64,
    pub health: HealthStatus,
}

impl MetricSnapshot {
    pub fn avg_latency_ns(&self) -> u64 {
        if self.count_for_avg == 0 {
            0
        } else {
            self.total_processing_ns / self.count_for_avg
        }
    }

    pub fn drop_rate_percent(&self) -> f64 {
        let total = self.processed + self.dropped;
        if total == 0 {
            0.0
        } else {
            self.dropped as f64 * 100.0 / total as f64
        }
    }

    pub fn is_stale(&self, stale_threshold_ms: u64, now: u64) -> bool {
        now.saturating_sub(self.last_event_ms) > stale_threshold_ms
    }
}

pub struct MetricsRegistry {
    components: Mutex<HashMap<String, Arc<ComponentMetrics>>>,
    thresholds: Mutex<ControlThresholds>,
}

impl MetricsRegistry {
    pub fn new(thresholds: ControlThresholds) -> Arc<Self> {
        Arc::new(Self {
            components: Mutex::new(HashMap::new()),
            thresholds: Mutex::new(thresholds),
        })
    }

    /// Counter handle for a named component, created on first use. Hold the
    /// returned `Arc` on hot paths so updates never touch the map lock.
    pub fn metrics(&self, name: &str) -> Arc<ComponentMetrics> {
        let mut map = self.components.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            map.entry(name.to_string())
                .or_insert_with(|| Arc::new(ComponentMetrics::new())),
        )
    }

    pub fn set_thresholds(&self, thresholds: ControlThresholds) {
        *self.thresholds.lock().unwrap_or_else(|e| e.into_inner()) = thresholds;
    }

    pub fn thresholds(&self) -> ControlThresholds {
        self.thresholds.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn snapshot(&self) -> HashMap<String, MetricSnapshot> {
        let thresholds = self.thresholds();
        let map = self.components.lock().unwrap_or_else(|e| e.into_inner());
        map.iter()
            .map(|(name, metrics)| (name.clone(), Self::build_snapshot(metrics, &thresholds)))
            .collect()
    }

    pub fn snapshot_one(&self, name: &str) -> Option<MetricSnapshot> {
        let thresholds = self.thresholds();
        let map = self.components.lock().unwrap_or_else(|e| e.into_inner());
        map.get(name).map(|m| Self::build_snapshot(m, &thresholds))
    }

    /// Stamp "component saw an event now". Hot-path sensitive: per-thread
    /// batching skips the update unless 1 ms has passed for this name.
    pub fn update_event_timestamp(&self, name: &str) {
        const UPDATE_INTERVAL_NS: u64 = 1_000_000;

        thread_local! {
            static LAST_UPDATE: RefCell<(String, u64)> = RefCell::new((String::new(), 0));
        }

        let now = now_ns();
        let skip = LAST_UPDATE.with(|cell| {
            let mut last = cell.borrow_mut();
            if last.0 == name && now.saturating_sub(last.1) < UPDATE_INTERVAL_NS {
                true
            } else {
                last.0.clear();
                last.0.push_str(name);
                last.1 = now;
                false
            }
        });
        if skip {
            return;
        }
        self.metrics(name).last_event_ms.store(now_ms(), Ordering::Relaxed);
    }

    fn build_snapshot(metrics: &ComponentMetrics, thresholds: &ControlThresholds) -> MetricSnapshot {
        let processed = metrics.processed.load(Ordering::Relaxed);
        let dropped = metrics.dropped.load(Ordering::Relaxed);
        let queue_depth = metrics.queue_depth.load(Ordering::Relaxed);

        let total = processed + dropped;
        let drop_rate = if total > 0 {
            dropped as f64 * 100.0 / total as f64
        } else {
            0.0
        };
        let health = if queue_depth > thresholds.max_queue_depth
            || drop_rate > thresholds.max_drop_rate_pct
        {
            HealthStatus::Unhealthy
        } else {
            HealthStatus::Healthy
        };
        metrics.health.store(health as u8, Ordering::Relaxed);

        MetricSnapshot {
            processed,
            dropped,
            errors: metrics.errors.load(Ordering::Relaxed),
            skipped: metrics.skipped.load(Ordering::Relaxed),
            retries: metrics.retries.load(Ordering::Relaxed),
            enqueued: metrics.enqueued.load(Ordering::Relaxed),
            dequeued: metrics.dequeued.load(Ordering::Relaxed),
            blocked: metrics.blocked.load(Ordering::Relaxed),
            overflow_drops: metrics.overflow_drops.load(Ordering::Relaxed),
            total_processing_ns: metrics.total_processing_ns.load(Ordering::Relaxed),
            max_processing_ns: metrics.max_processing_ns.load(Ordering::Relaxed),
            count_for_avg: metrics.count_for_avg.load(Ordering::Relaxed),
            last_event_ms: metrics.last_event_ms.load(Ordering::Relaxed),
            queue_depth,
            health: HealthStatus::from_u8(metrics.health.load(Ordering::Relaxed)),
        }
    }
}
