//! Per-ingester-thread event pools.
//!
//! Each ingest thread gets its own [`EventPool`] so acquisition never
//! contends across threads; releases still find their way home because the
//! guard carries its origin. Pools live as long as the registry (one per
//! engine), which outlives the ingest threads.

use std::collections::HashMap;
use std::sync::Arc;

use thread_local::ThreadLocal;

use super::event_pool::{EventPool, PooledEvent};
use crate::core::event::{EventFactory, EventPriority, EventSourceType};

/// Default number of pre-allocated slots per ingest thread.
pub const DEFAULT_POOL_SIZE: usize = 1000;

pub struct IngestPools {
    pool_size: usize,
    pools: ThreadLocal<Arc<EventPool>>,
}

impl IngestPools {
    pub fn new(pool_size: usize) -> Self {
        Self {
            pool_size,
            pools: ThreadLocal::new(),
        }
    }

    /// The calling thread's pool, created on first use.
    pub fn thread_pool(&self) -> Arc<EventPool> {
        Arc::clone(self.pools.get_or(|| EventPool::new(self.pool_size)))
    }

    /// Acquire a slot from the calling thread's pool and stamp a fresh
    /// event into it.
    pub fn acquire(
        &self,
        source: EventSourceType,
        priority: EventPriority,
        topic: String,
        body: Vec<u8>,
        metadata: HashMap<String, String>,
    ) -> PooledEvent {
        let pool = self.thread_pool();
        let mut handle = pool.acquire();
        *handle = EventFactory::create(source, priority, topic, body, metadata);
        handle
    }
}

impl Default for IngestPools {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_SIZE)
    }
}
