//! Replication log
//!
//! Ordered, term-tagged store operations. Kept in memory and mirrored to
//! `raft.log` in the WAL format, where each record's sequence number is the
//! entry's index. Index 0 is the empty prefix with term 0.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::WalSyncStrategy;
use crate::error::{KvError, Result};
use crate::wal::{Operation, WalRecord, WalRecovery, WalWriter};

/// One replicated operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub index: u64,
    pub term: u64,
    pub operation: Operation,
}

/// Result of offering entries to a follower's log
#[derive(Debug, Clone, PartialEq)]
pub enum AppendOutcome {
    /// No entry at `prev_log_index` with `prev_log_term`
    Mismatch,

    /// Prefix matched; these entries were new and are now persisted
    Appended(Vec<LogEntry>),
}

pub struct ReplicationLog {
    entries: Vec<LogEntry>,
    commit_index: u64,
    writer: WalWriter<LogEntry>,
}

impl ReplicationLog {
    /// Open or create the log at `path`
    pub fn open(path: &Path) -> Result<Self> {
        let (records, result) = WalRecovery::recover::<LogEntry>(path)?;

        // Only a gap-free prefix starting at index 1 is usable
        let mut entries: Vec<LogEntry> = Vec::with_capacity(records.len());
        for record in records {
            let entry = record.payload;
            if entry.index != entries.len() as u64 + 1 || record.seq != entry.index {
                tracing::warn!(
                    path = %path.display(),
                    index = entry.index,
                    expected = entries.len() + 1,
                    "replication log has a gap; dropping the rest"
                );
                break;
            }
            entries.push(entry);
        }

        let mut writer = WalWriter::open(path, WalSyncStrategy::EveryWrite, entries.len() as u64 + 1)?;
        if (entries.len() as u64) < result.entries_recovered || result.entries_corrupted > 0 {
            let records = to_records(&entries);
            writer.rewrite(&records, entries.len() as u64 + 1)?;
        }

        if !entries.is_empty() {
            tracing::info!(path = %path.display(), entries = entries.len(), "replication log recovered");
        }

        Ok(Self {
            entries,
            commit_index: 0,
            writer,
        })
    }

    pub fn last_index(&self) -> u64 {
        self.entries.len() as u64
    }

    pub fn last_term(&self) -> u64 {
        self.entries.last().map(|e| e.term).unwrap_or(0)
    }

    /// Term of the entry at `index`; `Some(0)` for index 0, `None` past the end
    pub fn term_at(&self, index: u64) -> Option<u64> {
        if index == 0 {
            return Some(0);
        }
        self.entries.get(index as usize - 1).map(|e| e.term)
    }

    pub fn entry(&self, index: u64) -> Option<&LogEntry> {
        if index == 0 {
            return None;
        }
        self.entries.get(index as usize - 1)
    }

    /// Up to `max` entries starting at `from`
    pub fn entries_from(&self, from: u64, max: usize) -> Vec<LogEntry> {
        let start = from.max(1) as usize - 1;
        if start >= self.entries.len() {
            return Vec::new();
        }
        let end = (start + max).min(self.entries.len());
        self.entries[start..end].to_vec()
    }

    /// Leader side: append a new operation in `term`
    pub fn append(&mut self, term: u64, operation: Operation) -> Result<u64> {
        let entry = LogEntry {
            index: self.last_index() + 1,
            term,
            operation,
        };
        self.writer.append_record(&WalRecord::new(entry.index, entry.clone()))?;
        let index = entry.index;
        self.entries.push(entry);
        Ok(index)
    }

    /// Follower side: accept entries following `prev_index`/`prev_term`
    ///
    /// Entries already present with the same term are skipped; the first
    /// entry whose term differs truncates the log from that index on.
    pub fn append_entries(&mut self, prev_index: u64, prev_term: u64, entries: Vec<LogEntry>) -> Result<AppendOutcome> {
        if self.term_at(prev_index) != Some(prev_term) {
            return Ok(AppendOutcome::Mismatch);
        }

        let mut appended = Vec::new();
        for entry in entries {
            if entry.index <= prev_index {
                continue;
            }
            match self.term_at(entry.index) {
                Some(term) if term == entry.term => continue,
                Some(_) => {
                    tracing::info!(from = entry.index, "truncating conflicting log suffix");
                    self.truncate_from(entry.index)?;
                }
                None => {}
            }
            if entry.index != self.last_index() + 1 {
                return Err(KvError::Protocol(format!(
                    "log entry {} does not follow {}",
                    entry.index,
                    self.last_index()
                )));
            }
            self.writer.append_record(&WalRecord::new(entry.index, entry.clone()))?;
            self.entries.push(entry.clone());
            appended.push(entry);
        }
        Ok(AppendOutcome::Appended(appended))
    }

    /// Drop every entry at `index` and after
    pub fn truncate_from(&mut self, index: u64) -> Result<()> {
        let keep = index.max(1) as usize - 1;
        if keep >= self.entries.len() {
            return Ok(());
        }
        self.entries.truncate(keep);
        let records = to_records(&self.entries);
        self.writer.rewrite(&records, keep as u64 + 1)?;
        self.commit_index = self.commit_index.min(keep as u64);
        Ok(())
    }

    pub fn commit_index(&self) -> u64 {
        self.commit_index
    }

    /// Advance (never rewind) the commit index, capped at the last entry
    pub fn advance_commit(&mut self, index: u64) {
        let index = index.min(self.last_index());
        if index > self.commit_index {
            self.commit_index = index;
        }
    }
}

fn to_records(entries: &[LogEntry]) -> Vec<WalRecord<LogEntry>> {
    entries
        .iter()
        .map(|e| WalRecord::new(e.index, e.clone()))
        .collect()
}
