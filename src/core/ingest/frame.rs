//! Ingest frame parsing.
//!
//! Wire format: a 4-byte big-endian length prefix, then a body of
//! `u8 priority | u16_be topic_len | topic_bytes | payload_bytes`.
//! Validation failures never produce an event; the caller counts the error
//! and continues reading.

use crate::core::event::EventPriority;
use crate::core::exception::FrameError;

/// Priority byte, topic length.
const BODY_HEADER_LEN: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFrame {
    pub priority: EventPriority,
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Parse a frame body (without the length prefix).
pub fn parse_frame_body(data: &[u8]) -> Result<ParsedFrame, FrameError> {
    if data.len() < BODY_HEADER_LEN {
        return Err(FrameError::Truncated { len: data.len() });
    }
    let priority =
        EventPriority::from_u8(data[0]).ok_or(FrameError::InvalidPriority { value: data[0] })?;
    let topic_len = u16::from_be_bytes([data[1], data[2]]) as usize;
    if topic_len == 0 {
        return Err(FrameError::EmptyTopic);
    }
    let available = data.len() - BODY_HEADER_LEN;
    if topic_len > available {
        return Err(FrameError::TopicOverrun {
            declared: topic_len,
            available,
        });
    }
    let topic_end = BODY_HEADER_LEN + topic_len;
    let topic = std::str::from_utf8(&data[BODY_HEADER_LEN..topic_end])
        .map_err(|_| FrameError::TopicEncoding)?
        .to_string();
    Ok(ParsedFrame {
        priority,
        topic,
        payload: data[topic_end..].to_vec(),
    })
}

/// Parse a full frame including the 4-byte big-endian length prefix.
pub fn parse_frame(frame: &[u8]) -> Result<ParsedFrame, FrameError> {
    if frame.len() < 4 {
        return Err(FrameError::Truncated { len: frame.len() });
    }
    let declared = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
    let actual = frame.len() - 4;
    if declared != actual {
        return Err(FrameError::LengthMismatch { declared, actual });
    }
    parse_frame_body(&frame[4..])
}

/// Encode a frame for the wire. The inverse of [`parse_frame`]; used by
/// the demo driver and tests.
pub fn encode_frame(priority: EventPriority, topic: &str, payload: &[u8]) -> Vec<u8> {
    let body_len = BODY_HEADER_LEN + topic.len() + payload.len();
    let mut frame = Vec::with_capacity(4 + body_len);
    frame.extend_from_slice(&(body_len as u32).to_be_bytes());
    frame.push(priority as u8);
    frame.extend_from_slice(&(topic.len() as u16).to_be_bytes());
    frame.extend_from_slice(topic.as_bytes());
    frame.extend_from_slice(payload);
    frame
}
