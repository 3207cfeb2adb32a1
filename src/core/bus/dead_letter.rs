//! Dead-letter queue: the sink for every dropped, refused or timed-out
//! event.
//!
//! Two surfaces: a monotonic `total_dropped` counter (relaxed atomic,
//! incremented outside the lock) and a bounded ring of recent events for
//! introspection. Optionally each drop is also appended to a spill file as
//! one JSON line; spill failures are logged, never surfaced.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde_json::json;
use tracing::{info, warn};

use crate::core::event::Event;
use crate::core::exception::EventStreamResult;
use crate::core::memory::PooledEvent;
use crate::core::util::clock::now_ms;

/// Recent-drop history kept in memory.
pub const MAX_STORED_EVENTS: usize = 1000;

pub struct DeadLetterQueue {
    total_dropped: AtomicU64,
    stored: Mutex<VecDeque<Event>>,
    spill: Option<Mutex<BufWriter<File>>>,
}

impl DeadLetterQueue {
    pub fn new() -> Self {
        info!(max_stored = MAX_STORED_EVENTS, "dead-letter queue initialized");
        Self {
            total_dropped: AtomicU64::new(0),
            stored: Mutex::new(VecDeque::with_capacity(MAX_STORED_EVENTS)),
            spill: None,
        }
    }

    /// Like [`new`](Self::new), with a persistent spill file appended on
    /// every drop.
    pub fn with_spill(path: &Path) -> EventStreamResult<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        info!(path = %path.display(), "dead-letter queue spill enabled");
        Ok(Self {
            total_dropped: AtomicU64::new(0),
            stored: Mutex::new(VecDeque::with_capacity(MAX_STORED_EVENTS)),
            spill: Some(Mutex::new(BufWriter::new(file))),
        })
    }

    pub fn push(&self, event: &Event) {
        self.total_dropped.fetch_add(1, Ordering::Relaxed);
        {
            let mut stored = self.stored.lock().unwrap_or_else(|e| e.into_inner());
            if stored.len() >= MAX_STORED_EVENTS {
                stored.pop_front();
            }
            stored.push_back(event.clone());
        }
        self.spill_record(event);
        warn!(
            id = event.header.id,
            topic = %event.topic,
            priority = event.header.priority.as_str(),
            total = self.total_dropped.load(Ordering::Relaxed),
            "event diverted to DLQ"
        );
    }

    pub fn push_batch(&self, events: &[PooledEvent]) {
        if events.is_empty() {
            return;
        }
        self.total_dropped.fetch_add(events.len() as u64, Ordering::Relaxed);
        {
            let mut stored = self.stored.lock().unwrap_or_else(|e| e.into_inner());
            for event in events {
                if stored.len() >= MAX_STORED_EVENTS {
                    stored.pop_front();
                }
                stored.push_back((**event).clone());
            }
        }
        for event in events {
            self.spill_record(event);
        }
        warn!(
            count = events.len(),
            total = self.total_dropped.load(Ordering::Relaxed),
            "batch diverted to DLQ"
        );
    }

    /// Lifetime count of drops; monotonically non-decreasing.
    pub fn total_dropped(&self) -> u64 {
        self.total_dropped.load(Ordering::Relaxed)
    }

    /// Events currently held in the introspection ring.
    pub fn len(&self) -> usize {
        self.stored.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Up to `max_count` recent drops, newest first.
    pub fn recent(&self, max_count: usize) -> Vec<Event> {
        let stored = self.stored.lock().unwrap_or_else(|e| e.into_inner());
        stored.iter().rev().take(max_count).cloned().collect()
    }

    /// Clear the introspection ring. The lifetime counter is untouched.
    pub fn clear(&self) {
        self.stored.lock().unwrap_or_else(|e| e.into_inner()).clear();
        info!(
            total = self.total_dropped.load(Ordering::Relaxed),
            "DLQ ring cleared"
        );
    }

    fn spill_record(&self, event: &Event) {
        let Some(spill) = &self.spill else {
            return;
        };
        let record = json!({
            "id": event.header.id,
            "topic": event.topic,
            "priority": event.header.priority.as_str(),
            "source": event.header.source,
            "ts_ms": now_ms(),
        });
        let mut writer = spill.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = writeln!(writer, "{record}").and_then(|_| writer.flush()) {
            warn!(error = %e, "DLQ spill write failed");
        }
    }
}

impl Default for DeadLetterQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event::{EventHeader, EventPriority};
    use std::io::BufRead;

    fn event(id: u64) -> Event {
        Event::new(
            EventHeader {
                id,
                priority: EventPriority::Medium,
                ..Default::default()
            },
            format!("topic-{id}"),
            vec![],
            Default::default(),
        )
    }

    #[test]
    fn counter_is_monotonic_and_ring_is_bounded() {
        let dlq = DeadLetterQueue::new();
        for id in 0..(MAX_STORED_EVENTS as u64 + 10) {
            dlq.push(&event(id));
        }
        assert_eq!(dlq.total_dropped(), MAX_STORED_EVENTS as u64 + 10);
        assert_eq!(dlq.len(), MAX_STORED_EVENTS);
        // The eldest entries were evicted off the front.
        let recent = dlq.recent(1);
        assert_eq!(recent[0].header.id, MAX_STORED_EVENTS as u64 + 9);
    }

    #[test]
    fn recent_returns_newest_first() {
        let dlq = DeadLetterQueue::new();
        for id in 0..5 {
            dlq.push(&event(id));
        }
        let recent = dlq.recent(3);
        let ids: Vec<u64> = recent.iter().map(|e| e.header.id).collect();
        assert_eq!(ids, vec![4, 3, 2]);
    }

    #[test]
    fn clear_keeps_the_lifetime_counter() {
        let dlq = DeadLetterQueue::new();
        dlq.push(&event(1));
        dlq.push(&event(2));
        dlq.clear();
        assert_eq!(dlq.len(), 0);
        assert_eq!(dlq.total_dropped(), 2);
    }

    #[test]
    fn push_batch_counts_every_event() {
        let dlq = DeadLetterQueue::new();
        let batch: Vec<PooledEvent> =
            (0..4).map(|id| PooledEvent::detached(event(id))).collect();
        dlq.push_batch(&batch);
        assert_eq!(dlq.total_dropped(), 4);
        assert_eq!(dlq.len(), 4);
    }

    #[test]
    fn spill_appends_one_json_line_per_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dlq.spill");
        let dlq = DeadLetterQueue::with_spill(&path).unwrap();
        dlq.push(&event(7));
        dlq.push(&event(8));

        let file = std::fs::File::open(&path).unwrap();
        let lines: Vec<String> = std::io::BufReader::new(file)
            .lines()
            .map(|l| l.unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(first["id"], 7);
        assert_eq!(first["topic"], "topic-7");
    }
}
