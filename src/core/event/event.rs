//! Event model: the unit of work flowing through the pipeline.
//!
//! An [`Event`] is immutable after ingest with one exception: the pipeline
//! stamps `dequeue_ns` at the moment a processor pops it from its queue,
//! which is what latency measurement hangs off.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Where an event entered the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventSourceType {
    Tcp,
    Udp,
    File,
    Internal,
    Plugin,
    Ext,
}

impl Default for EventSourceType {
    fn default() -> Self {
        EventSourceType::Internal
    }
}

/// Priority classes, ordered. Routing maps {CRITICAL, HIGH} to the realtime
/// queue, {MEDIUM, LOW} to the transactional queue and BATCH to the batch
/// queue.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[repr(u8)]
pub enum EventPriority {
    Batch = 0,
    Low = 1,
    #[default]
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl EventPriority {
    /// Decode a wire tag. Anything above CRITICAL is invalid.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(EventPriority::Batch),
            1 => Some(EventPriority::Low),
            2 => Some(EventPriority::Medium),
            3 => Some(EventPriority::High),
            4 => Some(EventPriority::Critical),
            _ => None,
        }
    }

    /// Case-insensitive parse of a priority token, as used by the topic
    /// table file format.
    pub fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "BATCH" => Some(EventPriority::Batch),
            "LOW" => Some(EventPriority::Low),
            "MEDIUM" => Some(EventPriority::Medium),
            "HIGH" => Some(EventPriority::High),
            "CRITICAL" => Some(EventPriority::Critical),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventPriority::Batch => "BATCH",
            EventPriority::Low => "LOW",
            EventPriority::Medium => "MEDIUM",
            EventPriority::High => "HIGH",
            EventPriority::Critical => "CRITICAL",
        }
    }
}

/// Fixed-size portion of an event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventHeader {
    pub source: EventSourceType,
    pub priority: EventPriority,
    /// Process-unique, monotonically assigned. Wraparound is defined
    /// (wrapping add) but not expected within a process lifetime.
    pub id: u64,
    /// Origin timestamp in nanoseconds since the UNIX epoch.
    pub timestamp_ns: u64,
    pub body_len: u32,
    pub topic_len: u16,
    pub crc32: u32,
}

/// A typed, priority-tagged, topic-bearing message with opaque body bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Event {
    pub header: EventHeader,
    pub topic: String,
    pub body: Vec<u8>,
    pub metadata: HashMap<String, String>,
    /// Stamped by the event bus when a processor dequeues this event; zero
    /// until then.
    pub dequeue_ns: u64,
}

impl Event {
    pub fn new(
        header: EventHeader,
        topic: String,
        body: Vec<u8>,
        metadata: HashMap<String, String>,
    ) -> Self {
        Self {
            header,
            topic,
            body,
            metadata,
            dequeue_ns: 0,
        }
    }

    /// Return the event to a clean state so a pool slot can be reused.
    pub fn reset(&mut self) {
        self.header = EventHeader::default();
        self.topic.clear();
        self.body.clear();
        self.metadata.clear();
        self.dequeue_ns = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_ordering_matches_wire_tags() {
        assert!(EventPriority::Batch < EventPriority::Low);
        assert!(EventPriority::Low < EventPriority::Medium);
        assert!(EventPriority::Medium < EventPriority::High);
        assert!(EventPriority::High < EventPriority::Critical);
        for tag in 0..=4u8 {
            assert_eq!(EventPriority::from_u8(tag).unwrap() as u8, tag);
        }
        assert_eq!(EventPriority::from_u8(5), None);
    }

    #[test]
    fn priority_parse_is_case_insensitive() {
        assert_eq!(EventPriority::parse("high"), Some(EventPriority::High));
        assert_eq!(EventPriority::parse("Critical"), Some(EventPriority::Critical));
        assert_eq!(EventPriority::parse("URGENT"), None);
    }

    #[test]
    fn reset_clears_everything() {
        let mut evt = Event::new(
            EventHeader {
                id: 7,
                priority: EventPriority::High,
                ..Default::default()
            },
            "sensor/temperature".to_string(),
            vec![1, 2, 3],
            HashMap::from([("k".to_string(), "v".to_string())]),
        );
        evt.dequeue_ns = 42;
        evt.reset();
        assert_eq!(evt, Event::default());
    }
}
