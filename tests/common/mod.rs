//! Shared harness for end-to-end pipeline tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use eventstream_rust::core::config::EngineConfig;
use eventstream_rust::core::event::{Event, EventPriority, EventSourceType};
use eventstream_rust::core::processor::{
    AlertHandler, CollectingAlertHandler, ProcessedEventObserver,
};
use eventstream_rust::core::storage::{CollectingStorage, StorageEngine};
use eventstream_rust::core::EventStreamEngine;

/// Observer that records every processed/dropped notification.
#[derive(Default)]
pub struct RecordingObserver {
    processed: Mutex<Vec<(u64, String)>>,
    dropped: Mutex<Vec<(u64, String, String)>>,
}

impl RecordingObserver {
    pub fn processed(&self) -> Vec<(u64, String)> {
        self.processed.lock().unwrap().clone()
    }

    pub fn dropped(&self) -> Vec<(u64, String, String)> {
        self.dropped.lock().unwrap().clone()
    }
}

impl ProcessedEventObserver for RecordingObserver {
    fn on_processed(&self, event: &Event, processor: &str) {
        self.processed
            .lock()
            .unwrap()
            .push((event.header.id, processor.to_string()));
    }

    fn on_dropped(&self, event: &Event, processor: &str, reason: &str) {
        self.dropped.lock().unwrap().push((
            event.header.id,
            processor.to_string(),
            reason.to_string(),
        ));
    }
}

/// A fully wired engine with collecting sinks, started on construction.
pub struct PipelineRunner {
    pub engine: EventStreamEngine,
    pub alerts: Arc<CollectingAlertHandler>,
    pub storage: Arc<CollectingStorage>,
    pub observer: Arc<RecordingObserver>,
}

impl PipelineRunner {
    pub fn new(config: EngineConfig) -> Self {
        let alerts = Arc::new(CollectingAlertHandler::new());
        let storage = Arc::new(CollectingStorage::new());
        let observer = Arc::new(RecordingObserver::default());
        let engine = EventStreamEngine::builder(config)
            .alert_handler(Arc::clone(&alerts) as Arc<dyn AlertHandler>)
            .storage(Arc::clone(&storage) as Arc<dyn StorageEngine>)
            .observer(Arc::clone(&observer) as Arc<dyn ProcessedEventObserver>)
            .build()
            .expect("engine builds");
        engine.start();
        Self {
            engine,
            alerts,
            storage,
            observer,
        }
    }

    /// A compact config suitable for fast tests.
    pub fn small_config() -> EngineConfig {
        EngineConfig {
            realtime_capacity: 1024,
            transactional_capacity: 256,
            batch_capacity: 256,
            inbox_capacity: 512,
            ingest_pool_size: 64,
            batch_window_secs: 1,
            realtime_sla_ms: 1000,
            ..Default::default()
        }
    }

    pub fn send(&self, priority: EventPriority, topic: &str, body: Vec<u8>) -> bool {
        self.engine.ingest(
            EventSourceType::Internal,
            priority,
            topic.to_string(),
            body,
            HashMap::new(),
        )
    }

    /// Poll until the predicate holds or the timeout elapses.
    pub fn wait_until(&self, timeout: Duration, mut predicate: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if predicate() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    pub fn shutdown(self) -> EventStreamEngine {
        self.engine.stop();
        self.engine
    }
}
