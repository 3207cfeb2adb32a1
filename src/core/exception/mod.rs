pub mod error;

pub use error::{EventStreamError, EventStreamResult, FrameError};
