//! Control plane: turns metric summaries into pipeline actions.
//!
//! The decision table is evaluated in severity order; recovery back to
//! RUNNING is gated by the hysteresis factor so the pipeline does not flap
//! around a threshold.

use tracing::{debug, warn};

use super::pipeline_state::{PipelineState, PipelineStateManager};
use super::thresholds::ControlThresholds;
use crate::core::processor::ProcessManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    None,
    PauseProcessor,
    DropBatch,
    PushDlq,
    Drain,
    Resume,
}

impl ControlAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlAction::None => "NONE",
            ControlAction::PauseProcessor => "PAUSE_PROCESSOR",
            ControlAction::DropBatch => "DROP_BATCH",
            ControlAction::PushDlq => "PUSH_DLQ",
            ControlAction::Drain => "DRAIN",
            ControlAction::Resume => "RESUME",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthLevel {
    Healthy,
    Degraded,
    Critical,
}

impl HealthLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthLevel::Healthy => "HEALTHY",
            HealthLevel::Degraded => "DEGRADED",
            HealthLevel::Critical => "CRITICAL",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ControlDecision {
    pub action: ControlAction,
    pub health: HealthLevel,
    pub details: String,
}

pub struct ControlPlane {
    thresholds: ControlThresholds,
    /// Set while the last evaluation was non-healthy; gates recovery.
    degraded: bool,
}

impl ControlPlane {
    pub fn new(thresholds: ControlThresholds) -> Self {
        debug!(
            max_queue_depth = thresholds.max_queue_depth,
            max_drop_rate_pct = thresholds.max_drop_rate_pct,
            "control plane initialized"
        );
        Self {
            thresholds,
            degraded: false,
        }
    }

    pub fn thresholds(&self) -> &ControlThresholds {
        &self.thresholds
    }

    pub fn set_thresholds(&mut self, thresholds: ControlThresholds) {
        self.thresholds = thresholds;
    }

    /// Evaluate one metrics summary. Rules are applied in order; the drop
    /// rate only participates once enough events have been seen.
    pub fn evaluate(
        &mut self,
        queue_depth: u64,
        processed: u64,
        dropped: u64,
        _latency_ms: u64,
    ) -> ControlDecision {
        let t = &self.thresholds;
        let total = processed + dropped;
        let drop_rate = if total >= t.min_events_for_evaluation && total > 0 {
            dropped as f64 * 100.0 / total as f64
        } else {
            0.0
        };
        let depth = queue_depth as f64;

        if depth > t.max_queue_depth as f64 * 1.5 || drop_rate >= 10.0 {
            self.degraded = true;
            warn!(queue_depth, drop_rate, "control decision: emergency overload");
            return ControlDecision {
                action: ControlAction::PushDlq,
                health: HealthLevel::Critical,
                details: format!("emergency overload: queue={queue_depth} drop_rate={drop_rate:.1}%"),
            };
        }
        if queue_depth >= t.max_queue_depth || drop_rate >= t.max_drop_rate_pct {
            self.degraded = true;
            warn!(queue_depth, drop_rate, "control decision: overload");
            return ControlDecision {
                action: ControlAction::PauseProcessor,
                health: HealthLevel::Critical,
                details: format!("overload: queue={queue_depth} drop_rate={drop_rate:.1}%"),
            };
        }
        if depth >= t.max_queue_depth as f64 * 0.75 || drop_rate >= t.max_drop_rate_pct * 0.5 {
            self.degraded = true;
            warn!(queue_depth, drop_rate, "control decision: pressure building");
            return ControlDecision {
                action: ControlAction::DropBatch,
                health: HealthLevel::Degraded,
                details: format!("pressure building: queue={queue_depth} drop_rate={drop_rate:.1}%"),
            };
        }

        if self.degraded {
            // Hysteresis: resume only once metrics fall clearly below the
            // first action threshold.
            let recovery_depth = t.max_queue_depth as f64 * 0.75 * t.recovery_factor;
            let recovery_drop = t.max_drop_rate_pct * 0.5 * t.recovery_factor;
            if depth < recovery_depth && drop_rate < recovery_drop {
                self.degraded = false;
            } else {
                debug!(queue_depth, drop_rate, "control decision: holding for recovery");
                return ControlDecision {
                    action: ControlAction::None,
                    health: HealthLevel::Degraded,
                    details: format!(
                        "holding: queue={queue_depth} below action threshold but above recovery point"
                    ),
                };
            }
        }

        debug!(queue_depth, drop_rate, "control decision: healthy");
        ControlDecision {
            action: ControlAction::Resume,
            health: HealthLevel::Healthy,
            details: "system healthy".to_string(),
        }
    }

    /// Apply a decision: advance the state machine and toggle the
    /// processor flags.
    pub fn execute_decision(
        &self,
        decision: &ControlDecision,
        state: &PipelineStateManager,
        processes: &ProcessManager,
    ) {
        match decision.action {
            ControlAction::PauseProcessor => {
                state.set_state(PipelineState::Paused);
                processes.pause_transactions();
                warn!("control action: paused transactional processing");
            }
            ControlAction::DropBatch => {
                state.set_state(PipelineState::Dropping);
                processes.drop_batch_events();
                warn!("control action: dropping batch events");
            }
            ControlAction::PushDlq => {
                state.set_state(PipelineState::Emergency);
                processes.drop_batch_events();
                processes.pause_transactions();
                warn!("control action: emergency, batch drop + transactions paused");
            }
            ControlAction::Drain => {
                state.set_state(PipelineState::Draining);
            }
            ControlAction::Resume => {
                state.set_state(PipelineState::Running);
                processes.resume_transactions();
                processes.resume_batch_events();
            }
            ControlAction::None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plane() -> ControlPlane {
        ControlPlane::new(ControlThresholds {
            max_queue_depth: 1000,
            max_drop_rate_pct: 2.0,
            min_events_for_evaluation: 100,
            recovery_factor: 0.8,
            ..Default::default()
        })
    }

    #[test]
    fn healthy_metrics_resume() {
        let mut plane = plane();
        let decision = plane.evaluate(10, 1000, 0, 0);
        assert_eq!(decision.action, ControlAction::Resume);
        assert_eq!(decision.health, HealthLevel::Healthy);
    }

    #[test]
    fn decision_table_orders_by_severity() {
        let mut plane = plane();
        // queue > 1.5x -> emergency
        let decision = plane.evaluate(1501, 1000, 0, 0);
        assert_eq!(decision.action, ControlAction::PushDlq);
        assert_eq!(decision.health, HealthLevel::Critical);

        // >= 1x -> pause
        let decision = plane.evaluate(1000, 1000, 0, 0);
        assert_eq!(decision.action, ControlAction::PauseProcessor);

        // >= 0.75x -> drop batch
        let decision = plane.evaluate(750, 1000, 0, 0);
        assert_eq!(decision.action, ControlAction::DropBatch);
        assert_eq!(decision.health, HealthLevel::Degraded);
    }

    #[test]
    fn drop_rate_triggers_independent_of_depth() {
        let mut plane = plane();
        // 10% dropped -> emergency path
        let decision = plane.evaluate(0, 900, 100, 0);
        assert_eq!(decision.action, ControlAction::PushDlq);

        let mut plane = self::plane();
        // 2% -> pause
        let decision = plane.evaluate(0, 980, 20, 0);
        assert_eq!(decision.action, ControlAction::PauseProcessor);

        let mut plane = self::plane();
        // 1% -> drop batch
        let decision = plane.evaluate(0, 990, 10, 0);
        assert_eq!(decision.action, ControlAction::DropBatch);
    }

    #[test]
    fn drop_rate_ignored_below_min_events() {
        let mut plane = plane();
        // 50% drop rate but only 10 events seen: not evaluated.
        let decision = plane.evaluate(0, 5, 5, 0);
        assert_eq!(decision.action, ControlAction::Resume);
    }

    #[test]
    fn recovery_is_gated_by_hysteresis() {
        let mut plane = plane();
        assert_eq!(plane.evaluate(800, 1000, 0, 0).action, ControlAction::DropBatch);

        // Below the action threshold (750) but above the recovery point
        // (750 * 0.8 = 600): hold.
        let decision = plane.evaluate(700, 1000, 0, 0);
        assert_eq!(decision.action, ControlAction::None);
        assert_eq!(decision.health, HealthLevel::Degraded);

        // Below the recovery point: resume.
        let decision = plane.evaluate(500, 1000, 0, 0);
        assert_eq!(decision.action, ControlAction::Resume);

        // Once recovered, a depth inside the hold band no longer holds.
        let decision = plane.evaluate(700, 1000, 0, 0);
        assert_eq!(decision.action, ControlAction::Resume);
    }
}
