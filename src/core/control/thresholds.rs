//! Thresholds driving control-plane decisions.

use serde::{Deserialize, Serialize};

/// Boundaries between health levels, consumed by the control plane and the
/// metrics registry's derived health computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlThresholds {
    /// Queue depth at which action is taken.
    pub max_queue_depth: u64,
    /// Drop rate (percent) at which action is taken.
    pub max_drop_rate_pct: f64,
    /// Latency ceiling in milliseconds.
    pub max_latency_ms: u64,
    /// Minimum processed+dropped before the drop rate is trusted; avoids
    /// false positives during startup.
    pub min_events_for_evaluation: u64,
    /// Hysteresis factor: recovery requires metrics below
    /// `threshold * recovery_factor`.
    pub recovery_factor: f64,
}

impl Default for ControlThresholds {
    fn default() -> Self {
        Self {
            max_queue_depth: 5000,
            max_drop_rate_pct: 2.0,
            max_latency_ms: 100,
            min_events_for_evaluation: 1000,
            recovery_factor: 0.8,
        }
    }
}
