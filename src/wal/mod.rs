//! Write-Ahead Log (WAL) Module
//!
//! Provides durability guarantees through append-only logging. The same
//! format backs the store's own log (`Operation` payloads) and the
//! primary-secondary replication log (`LogEntry` payloads).
//!
//! ## Responsibilities
//! - Append records before any mutation
//! - CRC32 checksums for corruption detection
//! - Sequence numbers for ordering and idempotent replay
//! - Crash recovery: skip corrupt records, truncate a torn tail
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Record 1                                │
//! │ ┌─────────┬─────────┬────────┬────────┐ │
//! │ │ Seq (8) │ CRC (4) │Len (4) │ Body   │ │
//! │ └─────────┴─────────┴────────┴────────┘ │
//! ├─────────────────────────────────────────┤
//! │ Record 2                                │
//! │ ┌─────────┬─────────┬────────┬────────┐ │
//! │ │ Seq (8) │ CRC (4) │Len (4) │ Body   │ │
//! │ └─────────┴─────────┴────────┴────────┘ │
//! └─────────────────────────────────────────┘
//! Body = bincode((timestamp_ms, payload))
//! ```

mod entry;
mod reader;
mod recovery;
mod writer;

pub use entry::{now_millis, BulkItem, Operation, WalRecord, HEADER_SIZE, MAX_RECORD_SIZE};
pub use reader::{WalIterator, WalReader};
pub use recovery::{RecoveryResult, WalRecovery};
pub use writer::WalWriter;
