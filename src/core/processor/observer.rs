//! Processed/dropped event observers.
//!
//! Observers are the hook point for layers outside the data plane
//! (replication, gateways, test harnesses). They must be non-blocking;
//! panics are contained and swallowed so a misbehaving observer cannot
//! take a processor worker down.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use tracing::error;

use crate::core::event::Event;

pub trait ProcessedEventObserver: Send + Sync {
    fn on_processed(&self, event: &Event, processor: &str);

    fn on_dropped(&self, event: &Event, processor: &str, reason: &str);
}

/// Fan-out registry shared by all processors. Injected at construction,
/// not a global.
pub struct ObserverRegistry {
    observers: RwLock<Vec<Arc<dyn ProcessedEventObserver>>>,
}

impl ObserverRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            observers: RwLock::new(Vec::new()),
        })
    }

    pub fn register(&self, observer: Arc<dyn ProcessedEventObserver>) {
        self.observers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(observer);
    }

    pub fn notify_processed(&self, event: &Event, processor: &str) {
        let observers = self.observers.read().unwrap_or_else(|e| e.into_inner());
        for observer in observers.iter() {
            if catch_unwind(AssertUnwindSafe(|| observer.on_processed(event, processor))).is_err() {
                error!(processor, "processed-event observer panicked");
            }
        }
    }

    pub fn notify_dropped(&self, event: &Event, processor: &str, reason: &str) {
        let observers = self.observers.read().unwrap_or_else(|e| e.into_inner());
        for observer in observers.iter() {
            if catch_unwind(AssertUnwindSafe(|| observer.on_dropped(event, processor, reason)))
                .is_err()
            {
                error!(processor, reason, "dropped-event observer panicked");
            }
        }
    }
}
