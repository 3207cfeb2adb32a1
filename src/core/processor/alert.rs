//! Alert dispatch for the realtime processor.
//!
//! Handlers must be non-blocking and tolerate invocation from any
//! processor thread. The logging handler is the default; a composite
//! handler fans out to many.

use std::fmt;
use std::sync::Mutex;

use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
    Emergency,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Info => "INFO",
            AlertLevel::Warning => "WARNING",
            AlertLevel::Critical => "CRITICAL",
            AlertLevel::Emergency => "EMERGENCY",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Alert {
    pub level: AlertLevel,
    pub message: String,
    /// Topic that triggered the alert.
    pub source: String,
    pub event_id: u64,
    pub timestamp_ns: u64,
    /// Original event payload for context.
    pub context: Vec<u8>,
}

pub trait AlertHandler: Send + Sync {
    /// Handle an alert. Must not block.
    fn on_alert(&self, alert: &Alert);

    fn name(&self) -> &'static str;
}

/// Default handler: routes alerts into the log at a level matching their
/// severity.
pub struct LoggingAlertHandler;

impl AlertHandler for LoggingAlertHandler {
    fn on_alert(&self, alert: &Alert) {
        match alert.level {
            AlertLevel::Info => {
                info!(source = %alert.source, event_id = alert.event_id, "[ALERT] {}", alert.message)
            }
            AlertLevel::Warning => {
                warn!(source = %alert.source, event_id = alert.event_id, "[ALERT] {}", alert.message)
            }
            AlertLevel::Critical => {
                error!(source = %alert.source, event_id = alert.event_id, "[ALERT] {}", alert.message)
            }
            AlertLevel::Emergency => {
                error!(source = %alert.source, event_id = alert.event_id, "[EMERGENCY ALERT] {}", alert.message)
            }
        }
    }

    fn name(&self) -> &'static str {
        "LoggingAlertHandler"
    }
}

/// Invokes a user-provided callback for every alert.
pub struct CallbackAlertHandler {
    callback: Box<dyn Fn(&Alert) + Send + Sync>,
    name: &'static str,
}

impl CallbackAlertHandler {
    pub fn new(callback: impl Fn(&Alert) + Send + Sync + 'static) -> Self {
        Self {
            callback: Box::new(callback),
            name: "CallbackAlertHandler",
        }
    }

    pub fn named(name: &'static str, callback: impl Fn(&Alert) + Send + Sync + 'static) -> Self {
        Self {
            callback: Box::new(callback),
            name,
        }
    }
}

impl AlertHandler for CallbackAlertHandler {
    fn on_alert(&self, alert: &Alert) {
        (self.callback)(alert);
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for CallbackAlertHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackAlertHandler").field("name", &self.name).finish()
    }
}

/// Fans one alert out to many handlers. A panicking handler is contained
/// and logged; the remaining handlers still run.
pub struct CompositeAlertHandler {
    handlers: Vec<std::sync::Arc<dyn AlertHandler>>,
}

impl CompositeAlertHandler {
    pub fn new() -> Self {
        Self { handlers: Vec::new() }
    }

    pub fn add_handler(&mut self, handler: std::sync::Arc<dyn AlertHandler>) {
        self.handlers.push(handler);
    }
}

impl Default for CompositeAlertHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertHandler for CompositeAlertHandler {
    fn on_alert(&self, alert: &Alert) {
        for handler in &self.handlers {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                handler.on_alert(alert)
            }));
            if outcome.is_err() {
                error!(handler = handler.name(), "alert handler panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "CompositeAlertHandler"
    }
}

/// Discards all alerts. For tests and benchmarks.
pub struct NullAlertHandler;

impl AlertHandler for NullAlertHandler {
    fn on_alert(&self, _alert: &Alert) {}

    fn name(&self) -> &'static str {
        "NullAlertHandler"
    }
}

/// Collects alerts into memory. Test helper.
pub struct CollectingAlertHandler {
    alerts: Mutex<Vec<Alert>>,
}

impl CollectingAlertHandler {
    pub fn new() -> Self {
        Self {
            alerts: Mutex::new(Vec::new()),
        }
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Default for CollectingAlertHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertHandler for CollectingAlertHandler {
    fn on_alert(&self, alert: &Alert) {
        self.alerts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(alert.clone());
    }

    fn name(&self) -> &'static str {
        "CollectingAlertHandler"
    }
}
