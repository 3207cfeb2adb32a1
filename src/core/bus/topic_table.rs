//! Topic-to-priority override table.
//!
//! Loaded once from a `topic:PRIORITY` line file and read on every routed
//! event, so the map sits behind a read-heavy `RwLock`. Reloading swaps the
//! whole map atomically under the write lock.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::RwLock;

use tracing::{info, warn};

use crate::core::event::EventPriority;
use crate::core::exception::EventStreamResult;

pub struct TopicTable {
    table: RwLock<HashMap<String, EventPriority>>,
}

impl TopicTable {
    pub fn new() -> Self {
        Self {
            table: RwLock::new(HashMap::new()),
        }
    }

    /// Load overrides from a UTF-8 text file. Lines are `topic:PRIORITY`
    /// with PRIORITY one of LOW/MEDIUM/HIGH/CRITICAL (case-insensitive);
    /// `#` starts a comment, blank lines are ignored, unknown priority
    /// tokens skip the line. Returns the number of entries loaded.
    pub fn load_file(&self, path: &Path) -> EventStreamResult<usize> {
        let contents = fs::read_to_string(path)?;
        let mut fresh = HashMap::new();
        for (line_no, raw) in contents.lines().enumerate() {
            let line = match raw.find('#') {
                Some(pos) => &raw[..pos],
                None => raw,
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some((topic, token)) = line.split_once(':') else {
                warn!(line = line_no + 1, "topic table line without ':' separator, skipping");
                continue;
            };
            let topic = topic.trim();
            let token = token.trim();
            if topic.is_empty() || token.is_empty() {
                continue;
            }
            match EventPriority::parse(token) {
                Some(priority) if priority != EventPriority::Batch => {
                    fresh.insert(topic.to_string(), priority);
                }
                _ => {
                    warn!(
                        line = line_no + 1,
                        token, "unknown priority token in topic table, skipping"
                    );
                }
            }
        }
        let count = fresh.len();
        *self.table.write().unwrap_or_else(|e| e.into_inner()) = fresh;
        info!(path = %path.display(), entries = count, "topic table loaded");
        Ok(count)
    }

    /// Priority override for a topic, if any.
    pub fn lookup(&self, topic: &str) -> Option<EventPriority> {
        self.table
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(topic)
            .copied()
    }

    /// Insert a single override. Used by tests and programmatic setup.
    pub fn insert(&self, topic: &str, priority: EventPriority) {
        self.table
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(topic.to_string(), priority);
    }

    pub fn len(&self) -> usize {
        self.table.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TopicTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_valid_lines_and_skips_garbage() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# billing gets bumped").unwrap();
        writeln!(file, "billing:HIGH").unwrap();
        writeln!(file, "sensor/temperature : critical  # inline comment").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "audit:URGENT").unwrap();
        writeln!(file, "no-separator-line").unwrap();
        writeln!(file, "metrics.raw:low").unwrap();
        file.flush().unwrap();

        let table = TopicTable::new();
        let loaded = table.load_file(file.path()).unwrap();
        assert_eq!(loaded, 3);
        assert_eq!(table.lookup("billing"), Some(EventPriority::High));
        assert_eq!(
            table.lookup("sensor/temperature"),
            Some(EventPriority::Critical)
        );
        assert_eq!(table.lookup("metrics.raw"), Some(EventPriority::Low));
        assert_eq!(table.lookup("audit"), None);
    }

    #[test]
    fn reload_replaces_the_whole_table() {
        let table = TopicTable::new();
        table.insert("old", EventPriority::High);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "new:MEDIUM").unwrap();
        file.flush().unwrap();
        table.load_file(file.path()).unwrap();

        assert_eq!(table.lookup("old"), None);
        assert_eq!(table.lookup("new"), Some(EventPriority::Medium));
    }

    #[test]
    fn missing_file_is_an_error() {
        let table = TopicTable::new();
        assert!(table.load_file(Path::new("/nonexistent/topics.conf")).is_err());
    }
}
