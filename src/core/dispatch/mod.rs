pub mod dispatcher;

pub use dispatcher::{Dispatcher, RoutingFn, DEFAULT_INBOX_CAPACITY};
