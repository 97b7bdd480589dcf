//! WAL Writer
//!
//! Handles appending records to the WAL file.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use super::entry::{encode_record, now_millis};
use super::WalRecord;
use crate::config::WalSyncStrategy;
use crate::error::{KvError, Result};
use crate::fault::{FaultStrategy, NoFaults};

/// Writes records to the WAL file
pub struct WalWriter<P> {
    path: PathBuf,
    file: File,

    /// Bytes known to be fully written; a failed append is cut back to this
    len: u64,

    /// Sequence number the next append receives
    next_seq: u64,

    sync_strategy: WalSyncStrategy,
    unsynced: usize,
    fault: Arc<dyn FaultStrategy>,
    _payload: PhantomData<fn(P)>,
}

impl<P: Serialize> WalWriter<P> {
    /// Open or create a WAL file; appends continue at `next_seq`
    pub fn open(path: &Path, sync_strategy: WalSyncStrategy, next_seq: u64) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let len = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file,
            len,
            next_seq: next_seq.max(1),
            sync_strategy,
            unsynced: 0,
            fault: Arc::new(NoFaults),
            _payload: PhantomData,
        })
    }

    /// Route flushes through a fault strategy
    pub fn with_fault(mut self, fault: Arc<dyn FaultStrategy>) -> Self {
        self.fault = fault;
        self
    }

    /// Append a record to the WAL, returning its sequence number
    ///
    /// With `simulate_failure` set, the fault strategy may drop the flush:
    /// the sequence number is still consumed and reported as written, but
    /// nothing reaches the file. Recovery later sees the gap.
    pub fn append(&mut self, payload: &P, simulate_failure: bool) -> Result<u64> {
        self.append_at(payload, now_millis(), simulate_failure)
    }

    /// `append` with a caller-chosen timestamp
    pub fn append_at(&mut self, payload: &P, timestamp: u64, simulate_failure: bool) -> Result<u64> {
        let seq = self.next_seq;
        let bytes = encode_record(seq, timestamp, payload)?;

        if simulate_failure && self.fault.drop_flush() {
            tracing::debug!(seq, path = %self.path.display(), "fault injection dropped WAL flush");
            self.next_seq += 1;
            return Ok(seq);
        }

        self.write_bytes(seq, &bytes)?;
        Ok(seq)
    }

    /// Append a record that already carries its sequence number
    ///
    /// The sequence must not go backwards.
    pub fn append_record(&mut self, record: &WalRecord<P>) -> Result<()> {
        if record.seq < self.next_seq {
            return Err(KvError::WalCorruption(format!(
                "record {} would rewind the log (next is {})",
                record.seq, self.next_seq
            )));
        }
        let bytes = record.serialize()?;
        self.write_bytes(record.seq, &bytes)
    }

    /// Write one record; `seq` is consumed only once its bytes are in the file
    fn write_bytes(&mut self, seq: u64, bytes: &[u8]) -> Result<()> {
        if let Err(e) = self.file.write_all(bytes) {
            // Cut back any partial record so later appends stay readable
            let _ = self.file.set_len(self.len);
            return Err(KvError::DurabilityFailure(format!(
                "WAL append of record {} failed: {}",
                seq, e
            )));
        }
        self.len += bytes.len() as u64;
        self.next_seq = seq + 1;
        self.unsynced += 1;

        let should_sync = match self.sync_strategy {
            WalSyncStrategy::EveryWrite => true,
            WalSyncStrategy::EveryNEntries { count } => self.unsynced >= count.max(1),
        };
        if should_sync {
            self.sync().map_err(|e| {
                KvError::DurabilityFailure(format!("WAL fsync after record {} failed: {}", seq, e))
            })?;
        }
        Ok(())
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_data()?;
        self.unsynced = 0;
        Ok(())
    }

    /// Drop every record; sequence numbers keep counting
    pub fn truncate(&mut self) -> Result<()> {
        self.file.set_len(0)?;
        self.file.sync_all()?;
        self.len = 0;
        self.unsynced = 0;
        Ok(())
    }

    /// Atomically replace the file contents with `records`
    ///
    /// Written to a temporary file, fsynced, then renamed over the WAL.
    pub fn rewrite(&mut self, records: &[WalRecord<P>], next_seq: u64) -> Result<()> {
        let tmp_path = self.path.with_extension("tmp");
        {
            let mut tmp = File::create(&tmp_path)?;
            for record in records {
                tmp.write_all(&record.serialize()?)?;
            }
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        self.file = OpenOptions::new().append(true).open(&self.path)?;
        self.len = self.file.metadata()?.len();
        self.next_seq = next_seq.max(1);
        self.unsynced = 0;
        Ok(())
    }

    /// Sequence number the next append will receive
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Size of the file in bytes
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
