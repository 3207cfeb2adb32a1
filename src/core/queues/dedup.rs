//! Time-windowed idempotency filter for the transactional processor.
//!
//! Event ids are remembered for a configurable window (default one hour);
//! within the window a second delivery of the same id is a duplicate.
//! The map is sharded with striped locks so `cleanup` can run concurrently
//! with inserts from the processor thread. Each shard's operations are
//! linearizable under its lock; `cleanup` never evicts an entry that is
//! still inside the window.

use std::collections::HashMap;
use std::sync::Mutex;

const SHARD_COUNT: usize = 16;

/// Default idempotency window: one hour.
pub const DEFAULT_WINDOW_MS: u64 = 60 * 60 * 1000;

pub struct DedupSet {
    shards: Vec<Mutex<HashMap<u64, u64>>>,
    window_ms: u64,
}

impl DedupSet {
    pub fn new(window_ms: u64) -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| Mutex::new(HashMap::new())).collect(),
            window_ms,
        }
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    fn shard(&self, id: u64) -> &Mutex<HashMap<u64, u64>> {
        &self.shards[(id as usize) & (SHARD_COUNT - 1)]
    }

    /// Lookup without side effects. An entry older than the window does not
    /// count as a duplicate even if cleanup has not run yet.
    pub fn is_duplicate(&self, id: u64, now_ms: u64) -> bool {
        let shard = self.shard(id).lock().unwrap_or_else(|e| e.into_inner());
        match shard.get(&id) {
            Some(&ts) => ts + self.window_ms > now_ms,
            None => false,
        }
    }

    /// Record an id. Returns `true` when the id was newly inserted (or had
    /// aged out and was refreshed), `false` when a live entry already
    /// existed.
    pub fn insert(&self, id: u64, now_ms: u64) -> bool {
        let mut shard = self.shard(id).lock().unwrap_or_else(|e| e.into_inner());
        match shard.get_mut(&id) {
            Some(ts) if *ts + self.window_ms > now_ms => false,
            Some(ts) => {
                *ts = now_ms;
                true
            }
            None => {
                shard.insert(id, now_ms);
                true
            }
        }
    }

    /// Evict entries whose window has elapsed. Entries with
    /// `ts + window > now_ms` are always retained.
    pub fn cleanup(&self, now_ms: u64) {
        for shard in &self.shards {
            let mut shard = shard.lock().unwrap_or_else(|e| e.into_inner());
            shard.retain(|_, &mut ts| ts + self.window_ms > now_ms);
        }
    }

    /// Number of remembered ids, live or stale. For tests and reporting.
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.lock().unwrap_or_else(|e| e.into_inner()).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DedupSet {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn insert_then_duplicate_within_window() {
        let set = DedupSet::new(1000);
        assert!(!set.is_duplicate(42, 0));
        assert!(set.insert(42, 0));
        assert!(set.is_duplicate(42, 500));
        assert!(!set.insert(42, 500));
    }

    #[test]
    fn entries_age_out_without_cleanup() {
        let set = DedupSet::new(1000);
        set.insert(7, 0);
        assert!(set.is_duplicate(7, 999));
        assert!(!set.is_duplicate(7, 1000));
        // A stale entry can be re-inserted.
        assert!(set.insert(7, 2000));
        assert!(set.is_duplicate(7, 2500));
    }

    #[test]
    fn cleanup_retains_live_entries_only() {
        let set = DedupSet::new(1000);
        for id in 0..100u64 {
            set.insert(id, id * 10);
        }
        // At now=600, ids with ts + 1000 <= 600 do not exist (min ts is 0,
        // 0 + 1000 > 600), so nothing is evicted.
        set.cleanup(600);
        assert_eq!(set.len(), 100);
        // At now=1500, ids with ts <= 500 (ids 0..=50) age out.
        set.cleanup(1500);
        assert_eq!(set.len(), 49);
        for id in 51..100u64 {
            assert!(set.is_duplicate(id, 1500), "id {id} should survive");
        }
    }

    #[test]
    fn cleanup_races_with_inserts() {
        let set = Arc::new(DedupSet::new(10_000));
        let writer = {
            let set = Arc::clone(&set);
            thread::spawn(move || {
                for id in 0..20_000u64 {
                    set.insert(id, 1_000_000);
                }
            })
        };
        let cleaner = {
            let set = Arc::clone(&set);
            thread::spawn(move || {
                for _ in 0..50 {
                    set.cleanup(1_000_500);
                }
            })
        };
        writer.join().unwrap();
        cleaner.join().unwrap();
        // All inserts are inside the window, so no cleanup may evict them.
        assert_eq!(set.len(), 20_000);
    }
}
