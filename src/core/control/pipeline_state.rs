//! Global pipeline state machine.
//!
//! Exactly one writer (the admin loop) mutates the state; the dispatcher
//! and processors read it. Transitions are published with release stores
//! and observed with acquire loads, so a reader sees a transition within
//! one loop iteration of the write.

use std::sync::atomic::{AtomicU8, Ordering};

use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PipelineState {
    Running = 0,
    Paused = 1,
    Draining = 2,
    Dropping = 3,
    Emergency = 4,
}

impl PipelineState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => PipelineState::Paused,
            2 => PipelineState::Draining,
            3 => PipelineState::Dropping,
            4 => PipelineState::Emergency,
            _ => PipelineState::Running,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Running => "RUNNING",
            PipelineState::Paused => "PAUSED",
            PipelineState::Draining => "DRAINING",
            PipelineState::Dropping => "DROPPING",
            PipelineState::Emergency => "EMERGENCY",
        }
    }
}

pub struct PipelineStateManager {
    state: AtomicU8,
}

impl PipelineStateManager {
    pub fn new() -> Self {
        info!(state = PipelineState::Running.as_str(), "pipeline state manager initialized");
        Self {
            state: AtomicU8::new(PipelineState::Running as u8),
        }
    }

    /// Transition to a new state. Setting the current state again is a
    /// logged no-op.
    pub fn set_state(&self, new_state: PipelineState) {
        let old_state = self.state();
        if old_state == new_state {
            debug!(state = new_state.as_str(), "state unchanged");
            return;
        }
        self.state.store(new_state as u8, Ordering::Release);
        warn!(
            from = old_state.as_str(),
            to = new_state.as_str(),
            "pipeline state transition"
        );
    }

    pub fn state(&self) -> PipelineState {
        PipelineState::from_u8(self.state.load(Ordering::Acquire))
    }
}

impl Default for PipelineStateManager {
    fn default() -> Self {
        Self::new()
    }
}
