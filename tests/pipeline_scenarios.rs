//! End-to-end pipeline scenarios with default-shaped configs.

#[path = "common/mod.rs"]
mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use eventstream_rust::core::processor::Processor;

use common::PipelineRunner;
use serial_test::serial;

use eventstream_rust::core::bus::{BusCapacities, DeadLetterQueue, EventBus, QueueId, TopicTable};
use eventstream_rust::core::control::{ControlThresholds, PipelineStateManager};
use eventstream_rust::core::dispatch::Dispatcher;
use eventstream_rust::core::event::{Event, EventHeader, EventPriority, EventSourceType};
use eventstream_rust::core::memory::PooledEvent;
use eventstream_rust::core::metrics::{names, MetricsRegistry};
use eventstream_rust::core::processor::{
    AlertHandler, AlertLevel, CollectingAlertHandler, ObserverRegistry, RealtimeProcessor,
    TransactionalProcessor,
};

fn detached(id: u64, priority: EventPriority, topic: &str, body: Vec<u8>) -> PooledEvent {
    let mut event = Event::new(
        EventHeader {
            source: EventSourceType::Internal,
            priority,
            id,
            ..Default::default()
        },
        topic.to_string(),
        body,
        Default::default(),
    );
    event.dequeue_ns = 1;
    PooledEvent::detached(event)
}

#[test]
fn critical_event_routes_to_realtime() {
    let runner = PipelineRunner::new(PipelineRunner::small_config());
    assert!(runner.send(EventPriority::Critical, "sensor/health", vec![1, 2, 3]));

    let registry = Arc::clone(runner.engine.registry());
    assert!(runner.wait_until(Duration::from_secs(2), || {
        registry
            .snapshot_one(names::REALTIME)
            .map(|s| s.processed == 1)
            .unwrap_or(false)
    }));
    let engine = runner.shutdown();
    assert_eq!(engine.dlq().total_dropped(), 0);
}

#[test]
fn topic_table_upgrade_reroutes_low_priority() {
    let runner = PipelineRunner::new(PipelineRunner::small_config());
    runner.engine.topic_table().insert("billing", EventPriority::High);

    assert!(runner.send(EventPriority::Low, "billing", vec![9]));

    let registry = Arc::clone(runner.engine.registry());
    assert!(runner.wait_until(Duration::from_secs(2), || {
        registry
            .snapshot_one(names::REALTIME)
            .map(|s| s.processed == 1)
            .unwrap_or(false)
    }));
    // Nothing reached the transactional side.
    let tx = registry.snapshot_one(names::TRANSACTIONAL).unwrap();
    assert_eq!(tx.processed, 0);
    runner.shutdown();
}

#[test]
#[serial]
fn critical_realtime_pressure_downgrades_high_traffic() {
    // Component-level: the realtime queue must stay full, so no worker
    // drains it here.
    let registry = MetricsRegistry::new(ControlThresholds::default());
    let bus = Arc::new(EventBus::new(
        BusCapacities::default(),
        Arc::new(DeadLetterQueue::new()),
        Arc::clone(&registry),
    ));
    for id in 0..14001 {
        bus.push(QueueId::Realtime, detached(id, EventPriority::High, "x", vec![]));
    }

    let dispatcher = Dispatcher::new(
        Arc::clone(&bus),
        Arc::new(TopicTable::new()),
        Arc::new(PipelineStateManager::new()),
        registry,
        64,
    );
    dispatcher.start();
    assert!(dispatcher.try_push(detached(99999, EventPriority::High, "x", vec![])));

    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while bus.size(QueueId::Transactional) < 1 && std::time::Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    dispatcher.stop();

    // The HIGH event was demoted to MEDIUM and landed transactional.
    assert_eq!(bus.size(QueueId::Transactional), 1);
    let demoted = bus.pop(QueueId::Transactional, Duration::ZERO).unwrap();
    assert_eq!(demoted.header.priority, EventPriority::Medium);
}

#[test]
#[serial]
fn sla_breach_drops_alerts_and_fills_dlq() {
    let alerts = Arc::new(CollectingAlertHandler::new());
    let registry = MetricsRegistry::new(ControlThresholds::default());
    let dlq = Arc::new(DeadLetterQueue::new());
    let processor = RealtimeProcessor::new(
        Arc::clone(&alerts) as Arc<dyn AlertHandler>,
        None,
        Arc::clone(&dlq),
        ObserverRegistry::new(),
        Arc::clone(&registry),
        5,
    );
    processor.set_handle_hook(Arc::new(|_| {
        thread::sleep(Duration::from_millis(10));
        true
    }));

    processor.process(detached(1, EventPriority::Critical, "sensor/health", vec![1]));

    let snap = registry.snapshot_one(names::REALTIME).unwrap();
    assert_eq!(snap.dropped, 1);
    assert_eq!(snap.processed, 0);
    assert_eq!(dlq.total_dropped(), 1);
    let collected = alerts.alerts();
    assert_eq!(collected.len(), 1);
    assert_eq!(collected[0].level, AlertLevel::Warning);
    assert!(collected[0].message.contains("SLA breach"));
}

#[test]
fn duplicate_id_within_window_is_processed_once() {
    let registry = MetricsRegistry::new(ControlThresholds::default());
    let dlq = Arc::new(DeadLetterQueue::new());
    let processor = TransactionalProcessor::new(
        None,
        Arc::clone(&dlq),
        ObserverRegistry::new(),
        Arc::clone(&registry),
        60_000,
        10_000,
        3,
    );

    processor.process(detached(42, EventPriority::Medium, "payment/txn", vec![1]));
    processor.process(detached(42, EventPriority::Medium, "payment/txn", vec![1]));

    let snap = registry.snapshot_one(names::TRANSACTIONAL).unwrap();
    assert_eq!(snap.processed, 1);
    assert_eq!(snap.skipped, 1);
    assert_eq!(snap.dropped, 0);
    assert_eq!(dlq.total_dropped(), 0);
}

#[test]
#[serial]
fn batch_window_flushes_one_aggregate() {
    let runner = PipelineRunner::new(PipelineRunner::small_config());
    for i in 0..7u8 {
        assert!(runner.send(EventPriority::Batch, "metrics.x", vec![i; 8]));
    }

    let registry = Arc::clone(runner.engine.registry());
    assert!(runner.wait_until(Duration::from_secs(2), || {
        registry
            .snapshot_one(names::BATCH)
            .map(|s| s.processed == 7)
            .unwrap_or(false)
    }));
    // Let the 1 s window elapse, then shut down; the bucket flushes once.
    thread::sleep(Duration::from_millis(1100));
    let storage = Arc::clone(&runner.storage);
    let observer = Arc::clone(&runner.observer);
    runner.shutdown();

    assert_eq!(storage.stored().len(), 7);
    assert!(storage.flushes() >= 1);
    let batch_notified = observer
        .processed()
        .iter()
        .filter(|(_, name)| name == names::BATCH)
        .count();
    assert_eq!(batch_notified, 7);
}

#[test]
fn paused_transactions_divert_to_dlq() {
    let runner = PipelineRunner::new(PipelineRunner::small_config());
    runner.engine.processes().pause_transactions();
    assert!(runner.send(EventPriority::Medium, "payment/txn", vec![1]));

    let dlq = Arc::clone(runner.engine.dlq());
    assert!(runner.wait_until(Duration::from_secs(2), || dlq.total_dropped() == 1));
    let dropped = runner.observer.dropped();
    runner.shutdown();
    assert!(dropped
        .iter()
        .any(|(_, name, reason)| name == names::TRANSACTIONAL && reason == "processor_paused"));
}
