//! WAL Recovery
//!
//! Handles crash recovery by scanning the WAL.

use std::fs::OpenOptions;
use std::path::Path;

use serde::de::DeserializeOwned;

use super::reader::{Frame, WalReader};
use super::WalRecord;
use crate::error::Result;

/// Handles WAL recovery after crash
pub struct WalRecovery;

/// Result of a recovery operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of records successfully recovered
    pub entries_recovered: u64,

    /// Number of corrupted records skipped
    pub entries_corrupted: u64,

    /// Sequence numbers absent between recovered records (dropped flushes,
    /// corrupt records)
    pub entries_missing: u64,

    /// Highest valid sequence number (0 if none)
    pub last_seq: u64,

    /// Whether the WAL was truncated (partial writes removed)
    pub was_truncated: bool,
}

impl WalRecovery {
    /// Recover records from a WAL file
    ///
    /// This will:
    /// 1. Read all valid records
    /// 2. Detect and skip corrupted records
    /// 3. Truncate a partial write at the end
    /// 4. Return all valid records in file order
    ///
    /// A missing file recovers to nothing.
    pub fn recover<P: DeserializeOwned>(path: &Path) -> Result<(Vec<WalRecord<P>>, RecoveryResult)> {
        if !path.exists() {
            return Ok((Vec::new(), RecoveryResult::default()));
        }

        let (records, mut result, torn_at) = Self::scan(path)?;

        if let Some(offset) = torn_at {
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(offset)?;
            file.sync_all()?;
            result.was_truncated = true;
            tracing::warn!(path = %path.display(), offset, "truncated partial WAL record");
        }

        Ok((records, result))
    }

    /// Verify integrity of a WAL file without modifying it
    pub fn verify<P: DeserializeOwned>(path: &Path) -> Result<RecoveryResult> {
        if !path.exists() {
            return Ok(RecoveryResult::default());
        }
        let (_, mut result, torn_at) = Self::scan::<P>(path)?;
        result.was_truncated = torn_at.is_some();
        Ok(result)
    }

    fn scan<P: DeserializeOwned>(path: &Path) -> Result<(Vec<WalRecord<P>>, RecoveryResult, Option<u64>)> {
        let mut reader = WalReader::<P>::open(path)?;
        let mut records = Vec::new();
        let mut result = RecoveryResult::default();

        let torn_at = loop {
            match reader.next_frame()? {
                Frame::Record(record) => {
                    if result.last_seq > 0 && record.seq > result.last_seq + 1 {
                        result.entries_missing += record.seq - result.last_seq - 1;
                    }
                    result.last_seq = result.last_seq.max(record.seq);
                    result.entries_recovered += 1;
                    records.push(record);
                }
                Frame::Corrupt { offset, seq } => {
                    tracing::warn!(path = %path.display(), offset, seq, "skipping corrupt WAL record");
                    result.entries_corrupted += 1;
                }
                Frame::Torn { offset } => break Some(offset),
                Frame::End => break None,
            }
        };

        Ok((records, result, torn_at))
    }
}
