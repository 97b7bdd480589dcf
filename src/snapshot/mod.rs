//! Snapshot Module
//!
//! A snapshot is the full materialized state (tombstones included) as of a
//! WAL checkpoint. Recovery loads the snapshot, then replays only the WAL
//! records whose sequence number is above the checkpoint.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ Header (22 bytes)                                           │
//! │   Magic: "RKVS" (4) | Version: u16 (2)                      │
//! │   Checkpoint: u64 (8) | Count: u64 (8)                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Data Block (variable)                                       │
//! │   [KeyLen: u32][EntryLen: u32][Key][bincode(Entry)]         │
//! │   ... repeated for each key, in key order ...               │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Footer (8 bytes)                                            │
//! │   DataCRC: u32 (4) | Padding (4)                            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The file is written to `snapshot.db.tmp`, fsynced, then renamed, so a
//! crash mid-write leaves the previous snapshot in place.

mod reader;
mod writer;

pub use reader::SnapshotReader;
pub use writer::SnapshotWriter;

/// Snapshot file name inside the data directory
pub const SNAPSHOT_FILE: &str = "snapshot.db";

/// Magic bytes identifying a replikv snapshot
pub(crate) const MAGIC: &[u8; 4] = b"RKVS";

/// Current snapshot format version
pub(crate) const VERSION: u16 = 1;

/// Header size: Magic (4) + Version (2) + Checkpoint (8) + Count (8) = 22 bytes
pub(crate) const HEADER_SIZE: usize = 22;

/// Footer size: DataCRC (4) + Padding (4) = 8 bytes
pub(crate) const FOOTER_SIZE: usize = 8;

/// What a snapshot file describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotMeta {
    /// Last WAL sequence number folded into the snapshot
    pub checkpoint: u64,

    /// Number of keys (tombstones included)
    pub entry_count: u64,
}
