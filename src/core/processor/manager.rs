//! Worker orchestration: one long-lived thread per processor queue.
//!
//! The manager binds each processor to its bus queue, owns the worker
//! threads and exposes the control-plane knobs (pause transactions, drop
//! batch events). Workers observe the shared running flag with acquire
//! loads every iteration; all waits are bounded, so `stop` joins promptly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::info;

use super::batch::BatchProcessor;
use super::realtime::RealtimeProcessor;
use super::transactional::TransactionalProcessor;
use super::Processor;
use crate::core::bus::{EventBus, QueueId};
use crate::core::util::affinity;

/// Pop timeout for the blocking queues.
const DEQUE_POP_TIMEOUT: Duration = Duration::from_millis(50);

/// Idle sleep for the realtime worker's non-blocking pops.
const REALTIME_IDLE: Duration = Duration::from_millis(10);

pub struct ProcessManager {
    bus: Arc<EventBus>,
    realtime: Arc<RealtimeProcessor>,
    transactional: Arc<TransactionalProcessor>,
    batch: Arc<BatchProcessor>,
    running: Arc<AtomicBool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    core_ids: Mutex<Option<Vec<usize>>>,
}

impl ProcessManager {
    pub fn new(
        bus: Arc<EventBus>,
        realtime: Arc<RealtimeProcessor>,
        transactional: Arc<TransactionalProcessor>,
        batch: Arc<BatchProcessor>,
    ) -> Arc<Self> {
        Arc::new(Self {
            bus,
            realtime,
            transactional,
            batch,
            running: Arc::new(AtomicBool::new(false)),
            workers: Mutex::new(Vec::new()),
            core_ids: Mutex::new(None),
        })
    }

    /// Optionally pin the three workers (realtime, transactional, batch in
    /// that order) to cores. Must be called before `start`.
    pub fn set_core_ids(&self, cores: Vec<usize>) {
        *self.core_ids.lock().unwrap_or_else(|e| e.into_inner()) = Some(cores);
    }

    pub fn start(&self) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }
        self.realtime.start();
        self.transactional.start();
        self.batch.start();

        let cores = self.core_ids.lock().unwrap_or_else(|e| e.into_inner()).clone();
        let core_for = |idx: usize| cores.as_ref().and_then(|c| c.get(idx).copied());

        let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
        workers.push(self.spawn_worker(
            "realtime-worker",
            QueueId::Realtime,
            Arc::clone(&self.realtime) as Arc<dyn Processor>,
            core_for(0),
        ));
        workers.push(self.spawn_worker(
            "transactional-worker",
            QueueId::Transactional,
            Arc::clone(&self.transactional) as Arc<dyn Processor>,
            core_for(1),
        ));
        workers.push(self.spawn_worker(
            "batch-worker",
            QueueId::Batch,
            Arc::clone(&self.batch) as Arc<dyn Processor>,
            core_for(2),
        ));
        info!("process manager started three workers");
    }

    fn spawn_worker(
        &self,
        name: &str,
        queue: QueueId,
        processor: Arc<dyn Processor>,
        core: Option<usize>,
    ) -> JoinHandle<()> {
        let bus = Arc::clone(&self.bus);
        let running = Arc::clone(&self.running);
        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                if let Some(core) = core {
                    affinity::bind_current_thread(core);
                }
                let timeout = match queue {
                    QueueId::Realtime => Duration::ZERO,
                    _ => DEQUE_POP_TIMEOUT,
                };
                while running.load(Ordering::Acquire) {
                    match bus.pop(queue, timeout) {
                        Some(event) => processor.process(event),
                        None => {
                            if queue == QueueId::Realtime {
                                thread::sleep(REALTIME_IDLE);
                            }
                        }
                    }
                }
            })
            .expect("spawn processor worker")
    }

    /// Idempotent: clears the running flag, joins workers, stops the
    /// processors (which flush their storage).
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        let workers: Vec<JoinHandle<()>> = {
            let mut guard = self.workers.lock().unwrap_or_else(|e| e.into_inner());
            guard.drain(..).collect()
        };
        for worker in workers {
            let _ = worker.join();
        }
        self.realtime.stop();
        self.transactional.stop();
        self.batch.stop();
        info!("process manager stopped");
    }

    pub fn pause_transactions(&self) {
        self.transactional.set_paused(true);
    }

    pub fn resume_transactions(&self) {
        self.transactional.set_paused(false);
    }

    pub fn drop_batch_events(&self) {
        self.batch.set_drop_events(true);
    }

    pub fn resume_batch_events(&self) {
        self.batch.set_drop_events(false);
    }

    pub fn realtime(&self) -> &Arc<RealtimeProcessor> {
        &self.realtime
    }

    pub fn transactional(&self) -> &Arc<TransactionalProcessor> {
        &self.transactional
    }

    pub fn batch(&self) -> &Arc<BatchProcessor> {
        &self.batch
    }
}
