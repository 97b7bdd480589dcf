//! MemTable implementation
//!
//! BTreeMap-based memtable with RwLock for concurrency.

use std::collections::BTreeMap;
use std::ops::Bound;

use parking_lot::RwLock;

use super::Entry;

/// In-memory table holding the latest entry per key
pub struct MemTable {
    data: RwLock<BTreeMap<String, Entry>>,
}

impl MemTable {
    /// Create a new empty MemTable
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
        }
    }

    /// Build a table from a snapshot
    pub fn from_map(map: BTreeMap<String, Entry>) -> Self {
        Self { data: RwLock::new(map) }
    }

    /// Get the entry for a key, tombstones included (read lock)
    pub fn get(&self, key: &str) -> Option<Entry> {
        self.data.read().get(key).cloned()
    }

    /// Insert or replace one entry (write lock)
    pub fn insert(&self, key: String, entry: Entry) {
        self.data.write().insert(key, entry);
    }

    /// Insert several entries under a single write lock
    pub fn insert_batch(&self, entries: Vec<(String, Entry)>) {
        let mut data = self.data.write();
        for (key, entry) in entries {
            data.insert(key, entry);
        }
    }

    /// Number of live (non-tombstone) keys
    pub fn live_count(&self) -> usize {
        self.data.read().values().filter(|e| e.is_live()).count()
    }

    /// Number of entries including tombstones
    pub fn entry_count(&self) -> usize {
        self.data.read().len()
    }

    /// Point-in-time copy of every entry, in key order
    pub fn snapshot(&self) -> BTreeMap<String, Entry> {
        self.data.read().clone()
    }

    /// Live entries strictly after `after`, at most `limit` of them
    pub fn live_range(&self, after: Option<&str>, limit: usize) -> Vec<(String, Vec<u8>)> {
        let data = self.data.read();
        let lower = match after {
            Some(key) => Bound::Excluded(key.to_string()),
            None => Bound::Unbounded,
        };
        data.range((lower, Bound::Unbounded))
            .filter(|(_, e)| e.is_live())
            .take(limit)
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .collect()
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}
