//! Admin loop: periodic health evaluation and pipeline supervision.
//!
//! Every tick the admin snapshots all component metrics, sums the headline
//! numbers, asks the control plane for a decision, executes it and renders
//! a human-readable report. The tick sleep is a condvar wait so `stop`
//! wakes it immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{error, info, warn};

use crate::core::control::{
    ControlDecision, ControlPlane, HealthLevel, PipelineStateManager,
};
use crate::core::metrics::{HealthStatus, MetricSnapshot, MetricsRegistry};
use crate::core::processor::ProcessManager;

/// Default evaluation interval.
pub const DEFAULT_TICK: Duration = Duration::from_secs(10);

/// Consecutive unhealthy ticks before log severity escalates.
const UNHEALTHY_ESCALATION: u32 = 3;

pub struct Admin {
    registry: Arc<MetricsRegistry>,
    control_plane: Mutex<ControlPlane>,
    state: Arc<PipelineStateManager>,
    processes: Arc<ProcessManager>,
    tick: Duration,
    running: Arc<AtomicBool>,
    sleeper: Arc<(Mutex<()>, Condvar)>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Admin {
    pub fn new(
        registry: Arc<MetricsRegistry>,
        control_plane: ControlPlane,
        state: Arc<PipelineStateManager>,
        processes: Arc<ProcessManager>,
        tick: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            control_plane: Mutex::new(control_plane),
            state,
            processes,
            tick,
            running: Arc::new(AtomicBool::new(false)),
            sleeper: Arc::new((Mutex::new(()), Condvar::new())),
            worker: Mutex::new(None),
        })
    }

    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }
        let this = Arc::clone(self);
        let handle = thread::Builder::new()
            .name("admin".to_string())
            .spawn(move || this.run())
            .expect("spawn admin worker");
        *self.worker.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        info!(tick_secs = self.tick.as_secs(), "admin loop started");
    }

    /// Idempotent; wakes the sleeping worker and joins it.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        self.sleeper.1.notify_all();
        if let Some(handle) = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take() {
            let _ = handle.join();
        }
        info!("admin loop stopped");
    }

    fn run(&self) {
        let mut consecutive_unhealthy: u32 = 0;
        while self.running.load(Ordering::Acquire) {
            // Interruptible sleep: stop() wakes this immediately.
            {
                let (lock, cv) = &*self.sleeper;
                let guard = lock.lock().unwrap_or_else(|e| e.into_inner());
                let _unused = cv
                    .wait_timeout_while(guard, self.tick, |_| {
                        self.running.load(Ordering::Acquire)
                    })
                    .unwrap_or_else(|e| e.into_inner());
            }
            if !self.running.load(Ordering::Acquire) {
                break;
            }
            self.tick_once(&mut consecutive_unhealthy);
        }
    }

    /// One evaluation cycle. Also invoked directly by tests to avoid
    /// waiting out the tick interval.
    pub fn tick_once(&self, consecutive_unhealthy: &mut u32) {
        let snapshots = self.registry.snapshot();

        let mut total_queue = 0u64;
        let mut total_processed = 0u64;
        let mut total_dropped = 0u64;
        for snap in snapshots.values() {
            total_queue += snap.queue_depth;
            total_processed += snap.processed;
            total_dropped += snap.dropped;
        }

        let decision = {
            let mut plane = self.control_plane.lock().unwrap_or_else(|e| e.into_inner());
            let decision = plane.evaluate(total_queue, total_processed, total_dropped, 0);
            plane.execute_decision(&decision, &self.state, &self.processes);
            decision
        };

        if decision.health == HealthLevel::Healthy {
            if *consecutive_unhealthy > 0 {
                info!(
                    cycles = *consecutive_unhealthy,
                    "system recovered after unhealthy cycles"
                );
            }
            *consecutive_unhealthy = 0;
        } else {
            *consecutive_unhealthy += 1;
            if *consecutive_unhealthy >= UNHEALTHY_ESCALATION {
                error!(
                    cycles = *consecutive_unhealthy,
                    "system unhealthy for consecutive cycles"
                );
            }
        }

        self.report(&snapshots, &decision);
    }

    fn report(
        &self,
        snapshots: &std::collections::HashMap<String, MetricSnapshot>,
        decision: &ControlDecision,
    ) {
        let healthy = decision.health == HealthLevel::Healthy;
        let mut total_processed = 0u64;
        let mut total_dropped = 0u64;
        let mut total_queue = 0u64;
        let mut ok = 0usize;
        let mut alerting = 0usize;

        let mut names: Vec<&String> = snapshots.keys().collect();
        names.sort();
        for name in names {
            let snap = &snapshots[name];
            total_processed += snap.processed;
            total_dropped += snap.dropped;
            total_queue += snap.queue_depth;
            if snap.health == HealthStatus::Healthy {
                ok += 1;
            } else {
                alerting += 1;
            }
            let line = format!(
                "{:24} proc={:<8} drop={:<6} ({:4.1}%) queue={:<6} {}",
                name,
                snap.processed,
                snap.dropped,
                snap.drop_rate_percent(),
                snap.queue_depth,
                if snap.health == HealthStatus::Healthy { "ok" } else { "ALERT" },
            );
            if healthy {
                info!("{line}");
            } else {
                warn!("{line}");
            }
        }

        let total = total_processed + total_dropped;
        let total_drop_rate = if total > 0 {
            total_dropped as f64 * 100.0 / total as f64
        } else {
            0.0
        };
        let summary = format!(
            "pipeline={} decision={} health={} components_ok={} alerts={} queue_total={} drop_rate={:.1}%",
            self.state.state().as_str(),
            decision.action.as_str(),
            decision.health.as_str(),
            ok,
            alerting,
            total_queue,
            total_drop_rate,
        );
        if healthy {
            info!("{summary}");
        } else {
            warn!("{summary}");
        }
    }
}
