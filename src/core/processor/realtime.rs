//! Realtime processor: low-latency detection and alerting.
//!
//! At-most-once semantics with a hard per-event wall-clock budget. An
//! event that fails its handler or blows the SLA is counted as dropped,
//! diverted to the DLQ and reported through the alert/observer hooks;
//! everything else is processed exactly once within budget.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::{error, info};

use super::alert::{Alert, AlertHandler, AlertLevel};
use super::observer::ObserverRegistry;
use super::{HandleFn, Processor};
use crate::core::bus::DeadLetterQueue;
use crate::core::event::Event;
use crate::core::memory::PooledEvent;
use crate::core::metrics::{names, ComponentMetrics, MetricsRegistry};
use crate::core::storage::StorageEngine;
use crate::core::util::clock::now_ns;

/// Default per-event wall-clock budget in milliseconds.
pub const DEFAULT_MAX_PROCESSING_MS: u64 = 5;

pub struct RealtimeProcessor {
    alert_handler: Arc<dyn AlertHandler>,
    storage: Option<Arc<dyn StorageEngine>>,
    dlq: Arc<DeadLetterQueue>,
    observers: Arc<ObserverRegistry>,
    metrics: Arc<ComponentMetrics>,
    registry: Arc<MetricsRegistry>,
    max_processing_ms: u64,
    handle_hook: Mutex<Option<Arc<HandleFn>>>,
}

impl RealtimeProcessor {
    pub fn new(
        alert_handler: Arc<dyn AlertHandler>,
        storage: Option<Arc<dyn StorageEngine>>,
        dlq: Arc<DeadLetterQueue>,
        observers: Arc<ObserverRegistry>,
        registry: Arc<MetricsRegistry>,
        max_processing_ms: u64,
    ) -> Arc<Self> {
        let metrics = registry.metrics(names::REALTIME);
        Arc::new(Self {
            alert_handler,
            storage,
            dlq,
            observers,
            metrics,
            registry,
            max_processing_ms,
            handle_hook: Mutex::new(None),
        })
    }

    /// Replace the built-in detection rules. Intended for wiring custom
    /// domain logic and for tests that need a slow or failing handler.
    pub fn set_handle_hook(&self, hook: Arc<HandleFn>) {
        *self.handle_hook.lock().unwrap_or_else(|e| e.into_inner()) = Some(hook);
    }

    fn emit_alert(&self, level: AlertLevel, message: String, event: &Event) {
        let alert = Alert {
            level,
            message,
            source: event.topic.clone(),
            event_id: event.header.id,
            timestamp_ns: now_ns(),
            context: event.body.clone(),
        };
        self.alert_handler.on_alert(&alert);
    }

    /// Built-in detection rules over sensor topics and payload size.
    fn handle(&self, event: &Event) -> bool {
        if event.body.len() > 1024 {
            self.emit_alert(
                AlertLevel::Warning,
                format!("Large payload: {} bytes", event.body.len()),
                event,
            );
            return true;
        }

        if event.topic == "sensor/temperature" && !event.body.is_empty() {
            let temp = event.body[0];
            if temp > 100 {
                self.emit_alert(
                    AlertLevel::Critical,
                    format!("Temperature critical: {temp}"),
                    event,
                );
                return true;
            } else if temp > 80 {
                self.emit_alert(
                    AlertLevel::Warning,
                    format!("Temperature warning: {temp}"),
                    event,
                );
                return true;
            }
        }

        if event.topic == "sensor/pressure" && !event.body.is_empty() {
            let pressure = event.body[0];
            if pressure > 200 {
                self.emit_alert(
                    AlertLevel::Emergency,
                    format!("Pressure emergency: {pressure} bar"),
                    event,
                );
                return true;
            }
        }

        true
    }
}

impl Processor for RealtimeProcessor {
    fn name(&self) -> &'static str {
        names::REALTIME
    }

    fn start(&self) {
        info!(
            sla_ms = self.max_processing_ms,
            alert_handler = self.alert_handler.name(),
            storage = self.storage.is_some(),
            "realtime processor started"
        );
    }

    fn stop(&self) {
        if let Some(storage) = &self.storage {
            if let Err(e) = storage.flush() {
                error!(error = %e, "storage flush failed on realtime stop");
            }
        }
        info!("realtime processor stopped");
    }

    fn process(&self, event: PooledEvent) {
        let start = Instant::now();

        let hook = self
            .handle_hook
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let handled = match hook {
            Some(hook) => hook(&event),
            None => self.handle(&event),
        };

        if !handled {
            self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
            error!(id = event.header.id, "realtime handler rejected event");
            self.dlq.push(&event);
            self.observers
                .notify_dropped(&event, self.name(), "processing_failed");
            return;
        }

        let elapsed = start.elapsed();
        let elapsed_ms = elapsed.as_millis() as u64;
        if elapsed_ms > self.max_processing_ms {
            self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
            self.emit_alert(
                AlertLevel::Warning,
                format!("SLA breach: {elapsed_ms}ms > {}ms", self.max_processing_ms),
                &event,
            );
            self.dlq.push(&event);
            self.observers.notify_dropped(&event, self.name(), "sla_breach");
            return;
        }

        self.metrics.processed.fetch_add(1, Ordering::Relaxed);
        self.metrics.record_processing_ns(elapsed.as_nanos() as u64);
        self.registry.update_event_timestamp(self.name());

        if let Some(storage) = &self.storage {
            if let Err(e) = storage.store_event(&event) {
                self.metrics.errors.fetch_add(1, Ordering::Relaxed);
                error!(id = event.header.id, error = %e, "audit store failed");
            }
        }

        self.observers.notify_processed(&event, self.name());
    }
}
