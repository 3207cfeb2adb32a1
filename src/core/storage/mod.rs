//! Append-only storage contract and engines.
//!
//! The pipeline only needs `store_event` + `flush`; idempotence is not
//! required and engines may batch internally. The file engine writes a
//! compact little-endian record per event and flushes every
//! [`FLUSH_BATCH_SIZE`] appends.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use tracing::info;

use crate::core::event::Event;
use crate::core::exception::EventStreamResult;

/// Appends between explicit flushes before the file engine flushes on its
/// own.
pub const FLUSH_BATCH_SIZE: usize = 100;

pub trait StorageEngine: Send + Sync {
    fn store_event(&self, event: &Event) -> EventStreamResult<()>;

    fn flush(&self) -> EventStreamResult<()>;
}

struct FileStorageInner {
    writer: BufWriter<File>,
    pending: usize,
}

/// Append-only binary event log.
///
/// Record layout (little-endian): `u64 timestamp_ns | u8 source | u64 id |
/// u32 topic_len | topic | u64 body_len | body`.
pub struct FileStorageEngine {
    inner: Mutex<FileStorageInner>,
}

impl FileStorageEngine {
    pub fn new(path: &Path) -> EventStreamResult<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        info!(path = %path.display(), "file storage engine opened");
        Ok(Self {
            inner: Mutex::new(FileStorageInner {
                writer: BufWriter::new(file),
                pending: 0,
            }),
        })
    }

    fn encode(event: &Event) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(29 + event.topic.len() + event.body.len());
        buffer.extend_from_slice(&event.header.timestamp_ns.to_le_bytes());
        buffer.push(event.header.source as u8);
        buffer.extend_from_slice(&event.header.id.to_le_bytes());
        buffer.extend_from_slice(&(event.topic.len() as u32).to_le_bytes());
        buffer.extend_from_slice(event.topic.as_bytes());
        buffer.extend_from_slice(&(event.body.len() as u64).to_le_bytes());
        buffer.extend_from_slice(&event.body);
        buffer
    }
}

impl StorageEngine for FileStorageEngine {
    fn store_event(&self, event: &Event) -> EventStreamResult<()> {
        let record = Self::encode(event);
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.writer.write_all(&record)?;
        inner.pending += 1;
        if inner.pending >= FLUSH_BATCH_SIZE {
            inner.writer.flush()?;
            inner.pending = 0;
        }
        Ok(())
    }

    fn flush(&self) -> EventStreamResult<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.writer.flush()?;
        inner.pending = 0;
        Ok(())
    }
}

/// Discards everything. For pipelines that run without persistence.
pub struct NullStorageEngine;

impl StorageEngine for NullStorageEngine {
    fn store_event(&self, _event: &Event) -> EventStreamResult<()> {
        Ok(())
    }

    fn flush(&self) -> EventStreamResult<()> {
        Ok(())
    }
}

/// In-memory engine that records every call. Test helper.
pub struct CollectingStorage {
    stored: Mutex<Vec<Event>>,
    flushes: Mutex<usize>,
}

impl CollectingStorage {
    pub fn new() -> Self {
        Self {
            stored: Mutex::new(Vec::new()),
            flushes: Mutex::new(0),
        }
    }

    pub fn stored(&self) -> Vec<Event> {
        self.stored.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn flushes(&self) -> usize {
        *self.flushes.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for CollectingStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine for CollectingStorage {
    fn store_event(&self, event: &Event) -> EventStreamResult<()> {
        self.stored
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
        Ok(())
    }

    fn flush(&self) -> EventStreamResult<()> {
        *self.flushes.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event::{EventHeader, EventPriority, EventSourceType};

    fn event(id: u64) -> Event {
        Event::new(
            EventHeader {
                source: EventSourceType::Tcp,
                priority: EventPriority::Medium,
                id,
                timestamp_ns: 123,
                ..Default::default()
            },
            "topic".to_string(),
            vec![1, 2, 3],
            Default::default(),
        )
    }

    #[test]
    fn file_engine_appends_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.log");
        let engine = FileStorageEngine::new(&path).unwrap();
        engine.store_event(&event(1)).unwrap();
        engine.store_event(&event(2)).unwrap();
        engine.flush().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        // Two records of 29 header bytes + 5 topic + 3 body each.
        assert_eq!(bytes.len(), 2 * (29 + 5 + 3));
        assert_eq!(&bytes[0..8], &123u64.to_le_bytes());
    }

    #[test]
    fn pending_writes_flush_at_batch_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.log");
        let engine = FileStorageEngine::new(&path).unwrap();
        for id in 0..FLUSH_BATCH_SIZE as u64 {
            engine.store_event(&event(id)).unwrap();
        }
        // The batch threshold forced a flush without an explicit call.
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), FLUSH_BATCH_SIZE * (29 + 5 + 3));
    }

    #[test]
    fn collecting_storage_records_calls() {
        let storage = CollectingStorage::new();
        storage.store_event(&event(5)).unwrap();
        storage.flush().unwrap();
        assert_eq!(storage.stored()[0].header.id, 5);
        assert_eq!(storage.flushes(), 1);
    }
}
