//! Dispatcher: MPSC inbox, routing policy and backpressure.
//!
//! Ingesters push into the lock-free inbox from any thread; a single
//! worker drains it, routes each event to one of the three bus queues and
//! propagates bus backpressure upstream through bounded retries. While the
//! pipeline is PAUSED or DRAINING the worker leaves the inbox untouched so
//! upstream senders feel the pressure.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::core::bus::{EventBus, PressureLevel, PushOutcome, QueueId, TopicTable};
use crate::core::control::pipeline_state::{PipelineState, PipelineStateManager};
use crate::core::event::{Event, EventPriority};
use crate::core::memory::PooledEvent;
use crate::core::metrics::{names, ComponentMetrics, MetricsRegistry};
use crate::core::queues::MpscQueue;

/// Default inbox capacity.
pub const DEFAULT_INBOX_CAPACITY: usize = 65536;

/// Sleep between retry attempts when the bus refuses a push.
const RETRY_BACKOFF_US: [u64; 3] = [10, 100, 1000];

/// Idle sleep when the inbox is empty.
const IDLE_SLEEP: Duration = Duration::from_micros(100);

/// Holdoff while the pipeline is PAUSED or DRAINING.
const PAUSED_SLEEP: Duration = Duration::from_millis(100);

/// Optional replacement for the canonical routing policy.
pub type RoutingFn = Arc<dyn Fn(&Event) -> QueueId + Send + Sync>;

pub struct Dispatcher {
    inbox: Arc<MpscQueue<PooledEvent>>,
    bus: Arc<EventBus>,
    topic_table: Arc<TopicTable>,
    pipeline_state: Arc<PipelineStateManager>,
    routing_override: Mutex<Option<RoutingFn>>,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    metrics: Arc<ComponentMetrics>,
    registry: Arc<MetricsRegistry>,
}

impl Dispatcher {
    pub fn new(
        bus: Arc<EventBus>,
        topic_table: Arc<TopicTable>,
        pipeline_state: Arc<PipelineStateManager>,
        registry: Arc<MetricsRegistry>,
        inbox_capacity: usize,
    ) -> Arc<Self> {
        let metrics = registry.metrics(names::DISPATCHER);
        Arc::new(Self {
            inbox: Arc::new(MpscQueue::new(inbox_capacity)),
            bus,
            topic_table,
            pipeline_state,
            routing_override: Mutex::new(None),
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
            metrics,
            registry,
        })
    }

    /// Replace the canonical routing policy. Intended for startup wiring;
    /// takes effect on the next dispatched event.
    pub fn set_routing_fn(&self, routing: RoutingFn) {
        *self.routing_override.lock().unwrap_or_else(|e| e.into_inner()) = Some(routing);
    }

    /// Offer an event from an ingester. Returns `false` when the inbox is
    /// at capacity; the caller must expect refusal.
    pub fn try_push(&self, event: PooledEvent) -> bool {
        match self.inbox.push(event) {
            Ok(()) => true,
            Err(_refused) => {
                self.metrics.blocked.fetch_add(1, Ordering::Relaxed);
                warn!("dispatcher inbox full, refusing event");
                false
            }
        }
    }

    /// Approximate inbox depth.
    pub fn inbox_len(&self) -> usize {
        self.inbox.len()
    }

    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }
        let this = Arc::clone(self);
        let handle = thread::Builder::new()
            .name("dispatcher".to_string())
            .spawn(move || this.dispatch_loop())
            .expect("spawn dispatcher worker");
        *self.worker.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        info!("dispatcher started");
    }

    /// Idempotent; unblocks the worker and joins it.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take() {
            let _ = handle.join();
        }
        info!("dispatcher stopped");
    }

    fn dispatch_loop(&self) {
        info!("dispatch loop started");
        while self.running.load(Ordering::Acquire) {
            // Respect admin decisions: a paused or draining pipeline keeps
            // the inbox intact so backpressure reaches the ingesters.
            match self.pipeline_state.state() {
                PipelineState::Paused | PipelineState::Draining => {
                    thread::sleep(PAUSED_SLEEP);
                    continue;
                }
                _ => {}
            }

            let Some(mut event) = self.inbox.pop() else {
                thread::sleep(IDLE_SLEEP);
                continue;
            };
            self.metrics
                .queue_depth
                .store(self.inbox.len() as u64, Ordering::Relaxed);

            let queue = self.route(&mut event);
            self.push_with_backpressure(queue, event);
        }
        info!("dispatch loop stopped");
    }

    /// Canonical routing policy.
    ///
    /// The topic table only ever upgrades: an unknown topic keeps the
    /// event's carried priority unchanged (no MEDIUM cap; see DESIGN.md).
    /// Under realtime pressure HIGH is demoted to MEDIUM; CRITICAL is
    /// never downgraded.
    fn route(&self, event: &mut PooledEvent) -> QueueId {
        if let Some(routing) = self
            .routing_override
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
        {
            return routing(event);
        }

        if let Some(table_priority) = self.topic_table.lookup(&event.topic) {
            if event.header.priority < table_priority {
                debug!(
                    id = event.header.id,
                    topic = %event.topic,
                    from = event.header.priority.as_str(),
                    to = table_priority.as_str(),
                    "topic table upgraded event priority"
                );
                event.header.priority = table_priority;
            }
        }

        self.adapt_to_pressure(event);

        match event.header.priority {
            EventPriority::Critical | EventPriority::High => QueueId::Realtime,
            EventPriority::Medium | EventPriority::Low => QueueId::Transactional,
            EventPriority::Batch => QueueId::Batch,
        }
    }

    fn adapt_to_pressure(&self, event: &mut PooledEvent) {
        match self.bus.realtime_pressure() {
            PressureLevel::Critical | PressureLevel::High => {
                if event.header.priority == EventPriority::High {
                    debug!(
                        id = event.header.id,
                        "realtime pressure, downgrading HIGH event to MEDIUM"
                    );
                    event.header.priority = EventPriority::Medium;
                }
                // CRITICAL events are never downgraded.
            }
            PressureLevel::Normal => {}
        }
    }

    fn push_with_backpressure(&self, queue: QueueId, event: PooledEvent) {
        let mut event = event;
        for (attempt, backoff_us) in RETRY_BACKOFF_US.iter().enumerate() {
            match self.bus.push(queue, event) {
                PushOutcome::Accepted => {
                    self.metrics.processed.fetch_add(1, Ordering::Relaxed);
                    self.registry.update_event_timestamp(names::DISPATCHER);
                    return;
                }
                PushOutcome::Diverted => {
                    // The bus already counted the drop and fed the DLQ.
                    self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                PushOutcome::Refused(refused) => {
                    event = refused;
                    self.metrics.retries.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        queue = queue.as_str(),
                        id = event.header.id,
                        attempt = attempt + 1,
                        "bus refused push, backing off"
                    );
                    thread::sleep(Duration::from_micros(*backoff_us));
                }
            }
        }
        self.bus.dlq().push(&event);
        self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
        warn!(
            queue = queue.as_str(),
            id = event.header.id,
            retries = RETRY_BACKOFF_US.len(),
            "push failed after retries, diverted event to DLQ"
        );
    }
}
