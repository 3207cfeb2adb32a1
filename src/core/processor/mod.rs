//! Processor semantics and worker orchestration.
//!
//! `Processor` is a capability set, not a hierarchy: three concrete
//! variants with different delivery guarantees, dispatched one-of-N and
//! known at startup.

pub mod alert;
pub mod batch;
pub mod manager;
pub mod observer;
pub mod realtime;
pub mod transactional;

use crate::core::event::Event;
use crate::core::memory::PooledEvent;

/// Pluggable domain logic shared by the realtime and transactional
/// processors. Returns `false` when handling failed.
pub type HandleFn = dyn Fn(&Event) -> bool + Send + Sync;

pub trait Processor: Send + Sync {
    fn name(&self) -> &'static str;

    fn start(&self);

    /// Flush any buffered work. Idempotent.
    fn stop(&self);

    /// Consume one event. Errors are handled internally (logged, counted,
    /// diverted); the worker loop never stops on a bad event.
    fn process(&self, event: PooledEvent);
}

pub use alert::{
    Alert, AlertHandler, AlertLevel, CallbackAlertHandler, CollectingAlertHandler,
    CompositeAlertHandler, LoggingAlertHandler, NullAlertHandler,
};
pub use batch::{BatchProcessor, DEFAULT_WINDOW};
pub use manager::ProcessManager;
pub use observer::{ObserverRegistry, ProcessedEventObserver};
pub use realtime::{RealtimeProcessor, DEFAULT_MAX_PROCESSING_MS};
pub use transactional::{
    TransactionalProcessor, DEFAULT_CLEANUP_INTERVAL_MS, DEFAULT_MAX_RETRIES,
};
