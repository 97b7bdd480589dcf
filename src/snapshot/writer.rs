//! Snapshot Writer
//!
//! Serializes the materialized state to a new snapshot file.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{KvError, Result};
use crate::memtable::Entry;

use super::{SnapshotMeta, MAGIC, VERSION};

/// Writes snapshot files
pub struct SnapshotWriter;

impl SnapshotWriter {
    /// Write `entries` as of `checkpoint` to `path`, atomically
    pub fn write(path: &Path, checkpoint: u64, entries: &BTreeMap<String, Entry>) -> Result<SnapshotMeta> {
        let tmp_path = path.with_extension("db.tmp");
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);

        writer.write_all(MAGIC)?;
        writer.write_all(&VERSION.to_le_bytes())?;
        writer.write_all(&checkpoint.to_le_bytes())?;
        writer.write_all(&(entries.len() as u64).to_le_bytes())?;

        let mut data_hasher = crc32fast::Hasher::new();
        for (key, entry) in entries {
            let body = bincode::serialize(entry)?;
            let key_len_bytes = (key.len() as u32).to_le_bytes();
            let body_len_bytes = (body.len() as u32).to_le_bytes();

            writer.write_all(&key_len_bytes)?;
            writer.write_all(&body_len_bytes)?;
            writer.write_all(key.as_bytes())?;
            writer.write_all(&body)?;

            data_hasher.update(&key_len_bytes);
            data_hasher.update(&body_len_bytes);
            data_hasher.update(key.as_bytes());
            data_hasher.update(&body);
        }

        writer.write_all(&data_hasher.finalize().to_le_bytes())?;
        writer.write_all(&[0u8; 4])?; // Padding for alignment
        writer.flush()?;

        let file = writer
            .into_inner()
            .map_err(|e| KvError::Snapshot(format!("Failed to flush snapshot: {}", e)))?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp_path, path)?;
        if let Some(dir) = path.parent() {
            // Persist the rename itself
            if let Ok(dir) = File::open(dir) {
                let _ = dir.sync_all();
            }
        }

        Ok(SnapshotMeta {
            checkpoint,
            entry_count: entries.len() as u64,
        })
    }
}
