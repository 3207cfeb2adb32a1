pub mod event_pool;
pub mod ingest_pools;

pub use event_pool::{EventPool, PooledEvent};
pub use ingest_pools::{IngestPools, DEFAULT_POOL_SIZE};
