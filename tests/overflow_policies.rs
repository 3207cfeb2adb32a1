//! Boundary behaviors of the overflow policies and dispatcher
//! backpressure.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serial_test::serial;

use eventstream_rust::core::bus::{
    BusCapacities, DeadLetterQueue, EventBus, PushOutcome, QueueId, TopicTable,
};
use eventstream_rust::core::control::{ControlThresholds, PipelineStateManager};
use eventstream_rust::core::dispatch::Dispatcher;
use eventstream_rust::core::event::{Event, EventHeader, EventPriority};
use eventstream_rust::core::memory::PooledEvent;
use eventstream_rust::core::metrics::MetricsRegistry;

fn detached(id: u64, priority: EventPriority) -> PooledEvent {
    PooledEvent::detached(Event::new(
        EventHeader {
            id,
            priority,
            ..Default::default()
        },
        "boundary".to_string(),
        vec![],
        Default::default(),
    ))
}

fn bus(capacities: BusCapacities) -> (Arc<EventBus>, Arc<MetricsRegistry>) {
    let registry = MetricsRegistry::new(ControlThresholds::default());
    let bus = Arc::new(EventBus::new(
        capacities,
        Arc::new(DeadLetterQueue::new()),
        Arc::clone(&registry),
    ));
    (bus, registry)
}

#[test]
fn realtime_at_capacity_evicts_exactly_once_per_push() {
    let (bus, _registry) = bus(BusCapacities {
        realtime: 16,
        transactional: 8,
        batch: 8,
    });
    // Usable capacity is 15.
    for id in 0..15 {
        assert!(bus.push(QueueId::Realtime, detached(id, EventPriority::High)).is_accepted());
    }
    for (i, id) in (100..105).enumerate() {
        assert!(bus.push(QueueId::Realtime, detached(id, EventPriority::High)).is_accepted());
        assert_eq!(bus.dlq().total_dropped(), (i + 1) as u64);
        assert_eq!(bus.size(QueueId::Realtime), 15);
    }
    // The evicted events are the five eldest, in order.
    let evicted: Vec<u64> = bus.dlq().recent(5).iter().map(|e| e.header.id).collect();
    assert_eq!(evicted, vec![4, 3, 2, 1, 0]);
}

#[test]
#[serial]
fn transactional_block_waits_at_most_100ms() {
    let (bus, registry) = bus(BusCapacities {
        realtime: 16,
        transactional: 1,
        batch: 8,
    });
    assert!(bus.push(QueueId::Transactional, detached(1, EventPriority::Medium)).is_accepted());

    let start = Instant::now();
    let outcome = bus.push(QueueId::Transactional, detached(2, EventPriority::Medium));
    let waited = start.elapsed();
    assert!(matches!(outcome, PushOutcome::Refused(_)));
    assert!(waited >= Duration::from_millis(100));
    assert!(waited < Duration::from_millis(400));
    assert_eq!(
        registry
            .snapshot_one(eventstream_rust::core::metrics::names::EVENT_BUS)
            .unwrap()
            .blocked,
        1
    );
}

#[test]
#[serial]
fn dispatcher_retries_then_diverts_to_dlq() {
    let registry = MetricsRegistry::new(ControlThresholds::default());
    let bus = Arc::new(EventBus::new(
        BusCapacities {
            realtime: 16,
            transactional: 2,
            batch: 8,
        },
        Arc::new(DeadLetterQueue::new()),
        Arc::clone(&registry),
    ));
    let dispatcher = Dispatcher::new(
        Arc::clone(&bus),
        Arc::new(TopicTable::new()),
        Arc::new(PipelineStateManager::new()),
        Arc::clone(&registry),
        16,
    );
    dispatcher.start();

    // No consumer pops the transactional queue, so the third event is
    // refused three times (100 ms block each) and finally diverted.
    for id in 0..3 {
        assert!(dispatcher.try_push(detached(id, EventPriority::Medium)));
    }
    let deadline = Instant::now() + Duration::from_secs(3);
    while bus.dlq().total_dropped() < 1 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    dispatcher.stop();

    assert_eq!(bus.dlq().total_dropped(), 1);
    assert_eq!(bus.dlq().recent(1)[0].header.id, 2);
    assert_eq!(bus.size(QueueId::Transactional), 2);
    let snap = registry
        .snapshot_one(eventstream_rust::core::metrics::names::DISPATCHER)
        .unwrap();
    assert_eq!(snap.dropped, 1);
    assert_eq!(snap.retries, 3);
}

#[test]
fn batch_drop_new_keeps_the_queue_and_diverts_arrivals() {
    let (bus, _registry) = bus(BusCapacities {
        realtime: 16,
        transactional: 8,
        batch: 3,
    });
    for id in 0..3 {
        assert!(bus.push(QueueId::Batch, detached(id, EventPriority::Batch)).is_accepted());
    }
    for id in 10..13 {
        assert!(matches!(
            bus.push(QueueId::Batch, detached(id, EventPriority::Batch)),
            PushOutcome::Diverted
        ));
    }
    assert_eq!(bus.size(QueueId::Batch), 3);
    assert_eq!(bus.dlq().total_dropped(), 3);
    // The queue still holds the original three.
    let head = bus.pop(QueueId::Batch, Duration::ZERO).unwrap();
    assert_eq!(head.header.id, 0);
}
