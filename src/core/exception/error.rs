//! Error types for the event streaming core.
//!
//! Every fallible operation in the crate funnels into [`EventStreamError`].
//! Capacity refusals are ordinary control flow (queues return `false` or
//! `Err(item)`), so only genuinely exceptional conditions appear here.

use thiserror::Error;

/// Result type used throughout the crate.
pub type EventStreamResult<T> = Result<T, EventStreamError>;

#[derive(Error, Debug)]
pub enum EventStreamError {
    #[error("malformed frame: {0}")]
    Frame(#[from] FrameError),

    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("I/O failure")]
    Io(#[from] std::io::Error),
}

/// Wire-level validation failures raised by the frame parser.
///
/// A frame that fails validation never produces an [`Event`]; the ingester
/// counts the error and moves on.
///
/// [`Event`]: crate::core::event::Event
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame body of {len} bytes is shorter than the minimum header")]
    Truncated { len: usize },

    #[error("invalid priority tag {value}")]
    InvalidPriority { value: u8 },

    #[error("empty topic")]
    EmptyTopic,

    #[error("declared topic length {declared} exceeds remaining frame ({available} bytes)")]
    TopicOverrun { declared: usize, available: usize },

    #[error("topic is not valid UTF-8")]
    TopicEncoding,

    #[error("length prefix {declared} does not match body length {actual}")]
    LengthMismatch { declared: usize, actual: usize },
}
