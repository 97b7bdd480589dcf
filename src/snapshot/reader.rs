//! Snapshot Reader
//!
//! Loads and validates a snapshot file.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{KvError, Result};
use crate::memtable::Entry;

use super::{SnapshotMeta, FOOTER_SIZE, HEADER_SIZE, MAGIC, VERSION};

/// Reads snapshot files
pub struct SnapshotReader;

impl SnapshotReader {
    /// Load a snapshot, or `None` when no snapshot exists yet
    pub fn load(path: &Path) -> Result<Option<(SnapshotMeta, BTreeMap<String, Entry>)>> {
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(path)?;
        Self::decode(&bytes).map(Some)
    }

    fn decode(bytes: &[u8]) -> Result<(SnapshotMeta, BTreeMap<String, Entry>)> {
        if bytes.len() < HEADER_SIZE + FOOTER_SIZE {
            return Err(KvError::Snapshot(format!("file too short: {} bytes", bytes.len())));
        }

        if &bytes[0..4] != MAGIC {
            return Err(KvError::Snapshot(format!(
                "Invalid snapshot magic: expected RKVS, got {:?}",
                &bytes[0..4]
            )));
        }

        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != VERSION {
            return Err(KvError::Snapshot(format!("Unsupported snapshot version: {}", version)));
        }

        let checkpoint = read_u64(&bytes[6..14]);
        let entry_count = read_u64(&bytes[14..22]);

        let data_end = bytes.len() - FOOTER_SIZE;
        let data = &bytes[HEADER_SIZE..data_end];
        let expected_crc = read_u32(&bytes[data_end..data_end + 4]);
        let actual_crc = crc32fast::hash(data);
        if actual_crc != expected_crc {
            return Err(KvError::Snapshot(format!(
                "data CRC mismatch: expected {:08x}, got {:08x}",
                expected_crc, actual_crc
            )));
        }

        // Parse entries: [key_len(4)][entry_len(4)][key][entry]
        let mut entries = BTreeMap::new();
        let mut pos = 0;
        while pos < data.len() {
            if pos + 8 > data.len() {
                return Err(KvError::Snapshot(format!("truncated entry header at {}", pos)));
            }
            let key_len = read_u32(&data[pos..pos + 4]) as usize;
            let body_len = read_u32(&data[pos + 4..pos + 8]) as usize;
            pos += 8;

            if pos + key_len + body_len > data.len() {
                return Err(KvError::Snapshot(format!("truncated entry at {}", pos)));
            }
            let key = String::from_utf8(data[pos..pos + key_len].to_vec())
                .map_err(|e| KvError::Snapshot(format!("key is not UTF-8: {}", e)))?;
            pos += key_len;

            let entry: Entry = bincode::deserialize(&data[pos..pos + body_len])?;
            pos += body_len;

            entries.insert(key, entry);
        }

        if entries.len() as u64 != entry_count {
            return Err(KvError::Snapshot(format!(
                "entry count mismatch: header says {}, found {}",
                entry_count,
                entries.len()
            )));
        }

        Ok((SnapshotMeta { checkpoint, entry_count }, entries))
    }
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}
