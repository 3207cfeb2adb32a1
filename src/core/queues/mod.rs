pub mod dedup;
pub mod mpsc_queue;
pub mod spsc_ring;

pub use dedup::DedupSet;
pub use mpsc_queue::MpscQueue;
pub use spsc_ring::{spsc_ring, SpscConsumer, SpscProducer};
