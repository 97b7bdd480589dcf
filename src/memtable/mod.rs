//! MemTable Module
//!
//! In-memory materialization of the store's current state.
//!
//! ## Responsibilities
//! - Fast reads and writes in memory
//! - Single-writer/multi-reader access pattern
//! - Keep tombstones so replicas can compare deletes causally
//! - Ordered iteration for snapshots and paged scans
//!
//! ## Data Structure Choice
//! BTreeMap wrapped in RwLock:
//! - Ordered keys (snapshots and scans walk keys in order)
//! - A bulk insert happens under one write lock, so readers see all of it or none

use serde::{Deserialize, Serialize};

use crate::clock::{Stamp, Version};

mod table;

pub use table::MemTable;

/// Entry stored in the MemTable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Value bytes (empty for a tombstone)
    pub value: Vec<u8>,

    /// WAL sequence number of the write that produced this entry
    pub version: u64,

    /// Deleted key
    pub tombstone: bool,

    /// Unix millis taken from the WAL record
    pub timestamp: u64,

    /// Causal metadata for masterless writes
    pub stamp: Option<Stamp>,
}

impl Entry {
    pub fn live(value: Vec<u8>, version: u64, timestamp: u64, stamp: Option<Stamp>) -> Self {
        Self {
            value,
            version,
            tombstone: false,
            timestamp,
            stamp,
        }
    }

    pub fn tombstone(version: u64, timestamp: u64, stamp: Option<Stamp>) -> Self {
        Self {
            value: Vec::new(),
            version,
            tombstone: true,
            timestamp,
            stamp,
        }
    }

    pub fn is_live(&self) -> bool {
        !self.tombstone
    }

    /// The causal version of this entry, if it was written with a stamp
    pub fn to_version(&self) -> Option<Version> {
        let stamp = self.stamp.clone()?;
        let value = if self.tombstone { None } else { Some(self.value.clone()) };
        Some(Version::new(value, stamp))
    }
}
