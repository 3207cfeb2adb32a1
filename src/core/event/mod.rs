pub mod event;
pub mod factory;

pub use event::{Event, EventHeader, EventPriority, EventSourceType};
pub use factory::EventFactory;
