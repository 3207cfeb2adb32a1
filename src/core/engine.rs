//! Engine assembly: builds and owns the whole data plane.
//!
//! Construction wires the registry, DLQ, bus, processors, dispatcher and
//! admin together from one [`EngineConfig`]; collaborators that live
//! outside the core (alert sinks, storage, observers) are injected through
//! the builder. `start`/`stop` manage all worker threads.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::core::admin::Admin;
use crate::core::bus::{BusCapacities, DeadLetterQueue, EventBus, TopicTable};
use crate::core::config::EngineConfig;
use crate::core::control::{ControlPlane, PipelineStateManager};
use crate::core::dispatch::Dispatcher;
use crate::core::event::{EventPriority, EventSourceType};
use crate::core::exception::EventStreamResult;
use crate::core::ingest::parse_frame;
use crate::core::memory::IngestPools;
use crate::core::metrics::MetricsRegistry;
use crate::core::processor::{
    AlertHandler, BatchProcessor, LoggingAlertHandler, ObserverRegistry, ProcessManager,
    ProcessedEventObserver, RealtimeProcessor, TransactionalProcessor,
};
use crate::core::storage::{FileStorageEngine, StorageEngine};

pub struct EngineBuilder {
    config: EngineConfig,
    alert_handler: Option<Arc<dyn AlertHandler>>,
    storage: Option<Arc<dyn StorageEngine>>,
    observers: Vec<Arc<dyn ProcessedEventObserver>>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            alert_handler: None,
            storage: None,
            observers: Vec::new(),
        }
    }

    pub fn alert_handler(mut self, handler: Arc<dyn AlertHandler>) -> Self {
        self.alert_handler = Some(handler);
        self
    }

    pub fn storage(mut self, storage: Arc<dyn StorageEngine>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn ProcessedEventObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn build(self) -> EventStreamResult<EventStreamEngine> {
        let config = self.config;
        config.validate()?;

        let registry = MetricsRegistry::new(config.thresholds.clone());

        let dlq = Arc::new(match &config.dlq_spill_path {
            Some(path) => DeadLetterQueue::with_spill(path)?,
            None => DeadLetterQueue::new(),
        });

        let bus = Arc::new(EventBus::new(
            BusCapacities {
                realtime: config.realtime_capacity,
                transactional: config.transactional_capacity,
                batch: config.batch_capacity,
            },
            Arc::clone(&dlq),
            Arc::clone(&registry),
        ));

        let topic_table = Arc::new(TopicTable::new());
        if let Some(path) = &config.topic_table_path {
            topic_table.load_file(path)?;
        }

        let observers = ObserverRegistry::new();
        for observer in self.observers {
            observers.register(observer);
        }

        let storage: Option<Arc<dyn StorageEngine>> = match (self.storage, &config.storage_path) {
            (Some(storage), _) => Some(storage),
            (None, Some(path)) => Some(Arc::new(FileStorageEngine::new(path)?)),
            (None, None) => None,
        };

        let alert_handler = self
            .alert_handler
            .unwrap_or_else(|| Arc::new(LoggingAlertHandler));

        let realtime = RealtimeProcessor::new(
            alert_handler,
            storage.clone(),
            Arc::clone(&dlq),
            Arc::clone(&observers),
            Arc::clone(&registry),
            config.realtime_sla_ms,
        );
        let transactional = TransactionalProcessor::new(
            storage.clone(),
            Arc::clone(&dlq),
            Arc::clone(&observers),
            Arc::clone(&registry),
            config.dedup_window_ms,
            config.dedup_cleanup_interval_ms,
            config.transactional_max_retries,
        );
        let batch = BatchProcessor::new(
            Duration::from_secs(config.batch_window_secs),
            Some(Arc::clone(&bus)),
            storage,
            Arc::clone(&dlq),
            Arc::clone(&observers),
            Arc::clone(&registry),
        );

        let processes = ProcessManager::new(
            Arc::clone(&bus),
            realtime,
            transactional,
            batch,
        );
        if let Some(cores) = &config.worker_cores {
            processes.set_core_ids(cores.clone());
        }

        let state = Arc::new(PipelineStateManager::new());
        let dispatcher = Dispatcher::new(
            Arc::clone(&bus),
            Arc::clone(&topic_table),
            Arc::clone(&state),
            Arc::clone(&registry),
            config.inbox_capacity,
        );

        let admin = Admin::new(
            Arc::clone(&registry),
            ControlPlane::new(config.thresholds.clone()),
            Arc::clone(&state),
            Arc::clone(&processes),
            Duration::from_secs(config.admin_tick_secs),
        );

        let pools = IngestPools::new(config.ingest_pool_size);

        Ok(EventStreamEngine {
            config,
            registry,
            dlq,
            bus,
            state,
            topic_table,
            dispatcher,
            processes,
            admin,
            pools,
            observers,
        })
    }
}

pub struct EventStreamEngine {
    config: EngineConfig,
    registry: Arc<MetricsRegistry>,
    dlq: Arc<DeadLetterQueue>,
    bus: Arc<EventBus>,
    state: Arc<PipelineStateManager>,
    topic_table: Arc<TopicTable>,
    dispatcher: Arc<Dispatcher>,
    processes: Arc<ProcessManager>,
    admin: Arc<Admin>,
    pools: IngestPools,
    observers: Arc<ObserverRegistry>,
}

impl EventStreamEngine {
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    pub fn new(config: EngineConfig) -> EventStreamResult<Self> {
        EngineBuilder::new(config).build()
    }

    pub fn start(&self) {
        self.processes.start();
        self.dispatcher.start();
        self.admin.start();
        info!("event stream engine started");
    }

    /// Idempotent full shutdown: dispatcher first so the inbox drains no
    /// further, then the processors (flushing buffered work), then admin.
    pub fn stop(&self) {
        self.dispatcher.stop();
        self.processes.stop();
        self.admin.stop();
        info!("event stream engine stopped");
    }

    /// Ingest a pre-parsed event. Returns `false` when the dispatcher
    /// inbox refused it.
    pub fn ingest(
        &self,
        source: EventSourceType,
        priority: EventPriority,
        topic: String,
        body: Vec<u8>,
        metadata: HashMap<String, String>,
    ) -> bool {
        let event = self.pools.acquire(source, priority, topic, body, metadata);
        self.dispatcher.try_push(event)
    }

    /// Ingest one wire frame (length prefix included). Parse failures are
    /// surfaced to the caller; the refusal flag mirrors [`ingest`].
    ///
    /// [`ingest`]: Self::ingest
    pub fn ingest_frame(
        &self,
        frame: &[u8],
        source: EventSourceType,
    ) -> EventStreamResult<bool> {
        let parsed = parse_frame(frame)?;
        Ok(self.ingest(
            source,
            parsed.priority,
            parsed.topic,
            parsed.payload,
            HashMap::new(),
        ))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<MetricsRegistry> {
        &self.registry
    }

    pub fn dlq(&self) -> &Arc<DeadLetterQueue> {
        &self.dlq
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn pipeline_state(&self) -> &Arc<PipelineStateManager> {
        &self.state
    }

    pub fn topic_table(&self) -> &Arc<TopicTable> {
        &self.topic_table
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn processes(&self) -> &Arc<ProcessManager> {
        &self.processes
    }

    pub fn observers(&self) -> &Arc<ObserverRegistry> {
        &self.observers
    }
}

impl Drop for EventStreamEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
