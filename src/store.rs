//! Durable Store
//!
//! Single-node key-value store with WAL-before-apply durability.
//!
//! ## Responsibilities
//! - Log every mutation to the WAL before it becomes visible
//! - Materialize the latest entry per key in the MemTable
//! - Periodic snapshots; WAL truncation after each snapshot
//! - Crash recovery: snapshot, then replay WAL records above the checkpoint
//!
//! ## Recovery
//! ```text
//!   snapshot.db ──load──► MemTable (checkpoint = C)
//!   wal.log ──recover──► records ──seq > C?──► apply ──► MemTable
//!                                   └─ else skip (already folded in)
//! ```
//! Replaying the same record twice is a no-op because every record is
//! applied at most once per recovery, keyed by its sequence number.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{KvError, Result};
use crate::fault::{self, FaultStrategy};
use crate::memtable::{Entry, MemTable};
use crate::snapshot::{SnapshotReader, SnapshotWriter, SNAPSHOT_FILE};
use crate::wal::{now_millis, BulkItem, Operation, WalRecovery, WalWriter};

/// What happened while opening a store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreRecovery {
    /// Checkpoint of the loaded snapshot (0 if none)
    pub snapshot_checkpoint: u64,

    /// Keys loaded from the snapshot, tombstones included
    pub snapshot_entries: u64,

    /// WAL records applied on top of the snapshot
    pub replayed: u64,

    /// WAL records at or below the checkpoint, skipped
    pub skipped: u64,

    /// Corrupt WAL records skipped
    pub corrupted: u64,

    /// Sequence numbers that never reached the disk (lost writes)
    pub missing: u64,

    /// A partial record was cut from the WAL tail
    pub truncated: bool,
}

/// One page of a key scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanPage {
    pub items: Vec<(String, Vec<u8>)>,

    /// Pass back as `after` to continue; `None` once the scan is complete
    pub next: Option<String>,
}

/// Durable single-node store
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader
///
/// - **Writes** (set/delete/bulk_set/snapshot): serialized by the `writer`
///   mutex, which owns the WAL. WAL append, then MemTable apply, then the
///   snapshot check all happen under it.
/// - **Reads** (get/scan): MemTable read lock only.
pub struct DurableStore {
    config: Config,

    /// WAL plus snapshot bookkeeping (exclusive access)
    writer: Mutex<WriterState>,

    /// Materialized state (internal RwLock)
    memtable: MemTable,

    /// Highest sequence number applied
    last_seq: AtomicU64,

    recovery: StoreRecovery,
    closed: AtomicBool,
}

struct WriterState {
    wal: WalWriter<Operation>,
    records_since_snapshot: u64,
}

impl DurableStore {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const WAL_FILENAME: &'static str = "wal.log";

    /// Open or create a store with the given config
    ///
    /// On startup:
    /// 1. Open/create data directory
    /// 2. Load the snapshot if present
    /// 3. Replay WAL records newer than the snapshot
    /// 4. Ready to serve requests
    pub fn open(config: Config) -> Result<Self> {
        let fault = fault::strategy_for(config.fault_injection);
        Self::open_with_fault(config, fault)
    }

    /// Open with an explicit fault strategy
    pub fn open_with_fault(config: Config, fault: Arc<dyn FaultStrategy>) -> Result<Self> {
        fs::create_dir_all(&config.data_dir)?;

        let snapshot_path = config.data_dir.join(SNAPSHOT_FILE);
        let wal_path = config.data_dir.join(Self::WAL_FILENAME);

        let mut recovery = StoreRecovery::default();

        // Step 1: Snapshot
        let memtable = match SnapshotReader::load(&snapshot_path)? {
            Some((meta, entries)) => {
                recovery.snapshot_checkpoint = meta.checkpoint;
                recovery.snapshot_entries = meta.entry_count;
                MemTable::from_map(entries)
            }
            None => MemTable::new(),
        };

        // Step 2: WAL replay above the checkpoint
        let (records, wal_result) = WalRecovery::recover::<Operation>(&wal_path)?;
        recovery.corrupted = wal_result.entries_corrupted;
        recovery.truncated = wal_result.was_truncated;

        let mut last_applied = recovery.snapshot_checkpoint;
        for record in records {
            if record.seq <= last_applied {
                recovery.skipped += 1;
                continue;
            }
            if record.seq > last_applied + 1 {
                recovery.missing += record.seq - last_applied - 1;
            }
            apply_operation(&memtable, record.seq, record.timestamp, record.payload);
            last_applied = record.seq;
            recovery.replayed += 1;
        }

        if recovery.replayed > 0 || recovery.snapshot_entries > 0 {
            tracing::info!(
                data_dir = %config.data_dir.display(),
                checkpoint = recovery.snapshot_checkpoint,
                snapshot_entries = recovery.snapshot_entries,
                replayed = recovery.replayed,
                skipped = recovery.skipped,
                last_seq = last_applied,
                "store recovered"
            );
        }
        if recovery.missing > 0 || recovery.corrupted > 0 {
            tracing::warn!(
                missing = recovery.missing,
                corrupted = recovery.corrupted,
                "store recovered with lost writes"
            );
        }

        // Step 3: Writer continues after everything seen
        let wal = WalWriter::open(&wal_path, config.wal_sync_strategy, last_applied + 1)?.with_fault(fault);

        Ok(Self {
            config,
            writer: Mutex::new(WriterState {
                wal,
                records_since_snapshot: recovery.replayed,
            }),
            memtable,
            last_seq: AtomicU64::new(last_applied),
            recovery,
            closed: AtomicBool::new(false),
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Get the live value for a key
    pub fn get(&self, key: &str) -> Result<Vec<u8>> {
        match self.memtable.get(key) {
            Some(entry) if entry.is_live() => Ok(entry.value),
            _ => Err(KvError::NotFound),
        }
    }

    /// Get the raw entry for a key, tombstones included
    pub fn get_entry(&self, key: &str) -> Option<Entry> {
        self.memtable.get(key)
    }

    /// Point-in-time copy of every entry, tombstones included
    pub fn entries(&self) -> Vec<(String, Entry)> {
        self.memtable.snapshot().into_iter().collect()
    }

    /// Point-in-time iterator over live keys in key order
    pub fn iter_live(&self) -> impl Iterator<Item = (String, Vec<u8>)> {
        self.memtable.live_range(None, usize::MAX).into_iter()
    }

    /// One page of live keys strictly after `after`
    pub fn scan(&self, after: Option<&str>, limit: usize) -> ScanPage {
        let limit = limit.max(1);
        let mut items = self.memtable.live_range(after, limit.saturating_add(1));
        let next = if items.len() > limit {
            items.truncate(limit);
            items.last().map(|(k, _)| k.clone())
        } else {
            None
        };
        ScanPage { items, next }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Set a key, returning the WAL sequence number
    pub fn set(&self, key: &str, value: &[u8], simulate_failure: bool) -> Result<u64> {
        self.apply(Operation::set(key, value), simulate_failure)
    }

    /// Write a tombstone for a key
    ///
    /// Deleting an absent key still logs the tombstone.
    pub fn delete(&self, key: &str, simulate_failure: bool) -> Result<u64> {
        self.apply(Operation::delete(key), simulate_failure)
    }

    /// Set every pair as one atomic WAL record
    pub fn bulk_set(&self, items: &[(String, Vec<u8>)], simulate_failure: bool) -> Result<u64> {
        let items = items
            .iter()
            .map(|(key, value)| BulkItem {
                key: key.clone(),
                value: value.clone(),
                stamp: None,
            })
            .collect();
        self.apply(Operation::BulkSet { items }, simulate_failure)
    }

    /// Log and apply one operation
    ///
    /// Steps:
    /// 1. Acquire the writer
    /// 2. Append to the WAL (durability)
    /// 3. Apply to the MemTable
    /// 4. Snapshot if the threshold is reached
    ///
    /// A WAL failure aborts before step 3, so the state is unchanged. A
    /// snapshot failure in step 4 is logged and does not fail the write.
    pub fn apply(&self, operation: Operation, simulate_failure: bool) -> Result<u64> {
        if self.closed.load(Ordering::Acquire) {
            return Err(KvError::Shutdown);
        }
        if let Operation::BulkSet { items } = &operation {
            if items.is_empty() {
                return Ok(self.last_seq());
            }
        }

        let mut writer = self.writer.lock();

        let timestamp = now_millis();
        let seq = writer.wal.append_at(&operation, timestamp, simulate_failure)?;
        apply_operation(&self.memtable, seq, timestamp, operation);
        self.last_seq.store(seq, Ordering::Release);

        // The record is durable from here on; a failed snapshot is retried
        // on the next write instead of failing this one
        writer.records_since_snapshot += 1;
        let threshold = self.config.snapshot_threshold;
        if threshold > 0 && writer.records_since_snapshot >= threshold {
            if let Err(e) = self.snapshot_locked(&mut writer) {
                tracing::warn!(seq, error = %e, "threshold snapshot failed; WAL kept");
            }
        }

        Ok(seq)
    }

    /// Take a snapshot now and truncate the WAL
    pub fn snapshot(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        self.snapshot_locked(&mut writer)
    }

    fn snapshot_locked(&self, writer: &mut WriterState) -> Result<()> {
        let checkpoint = self.last_seq();
        let entries = self.memtable.snapshot();
        let path = self.config.data_dir.join(SNAPSHOT_FILE);

        let meta = SnapshotWriter::write(&path, checkpoint, &entries)?;
        writer.wal.truncate()?;
        writer.records_since_snapshot = 0;

        tracing::debug!(checkpoint = meta.checkpoint, entries = meta.entry_count, "snapshot written");
        Ok(())
    }

    /// Close the store gracefully
    ///
    /// Writes a final snapshot and syncs the WAL. Later writes fail with
    /// `KvError::Shutdown`.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut writer = self.writer.lock();
        self.snapshot_locked(&mut writer)?;
        writer.wal.sync()?;
        tracing::info!(data_dir = %self.config.data_dir.display(), last_seq = self.last_seq(), "store closed");
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Path of the WAL file
    pub fn wal_path(&self) -> PathBuf {
        self.config.data_dir.join(Self::WAL_FILENAME)
    }

    /// Highest sequence number applied
    pub fn last_seq(&self) -> u64 {
        self.last_seq.load(Ordering::Acquire)
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.memtable.live_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Statistics from the last open
    pub fn recovery(&self) -> &StoreRecovery {
        &self.recovery
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Materialize one logged operation
fn apply_operation(memtable: &MemTable, seq: u64, timestamp: u64, operation: Operation) {
    match operation {
        Operation::Set { key, value, stamp } => {
            memtable.insert(key, Entry::live(value, seq, timestamp, stamp));
        }
        Operation::Delete { key, stamp } => {
            memtable.insert(key, Entry::tombstone(seq, timestamp, stamp));
        }
        Operation::BulkSet { items } => {
            let entries = items
                .into_iter()
                .map(|item| (item.key, Entry::live(item.value, seq, timestamp, item.stamp)))
                .collect();
            memtable.insert_batch(entries);
        }
    }
}
