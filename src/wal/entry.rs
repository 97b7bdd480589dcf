//! WAL record definitions
//!
//! Defines the structure of individual WAL records and the store operations
//! they carry.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::clock::Stamp;
use crate::error::{KvError, Result};

/// Header size: Seq (8) + CRC (4) + Len (4)
pub const HEADER_SIZE: usize = 16;

/// Largest body a record may carry (64 MB)
pub const MAX_RECORD_SIZE: u32 = 64 * 1024 * 1024;

/// A single record in the WAL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalRecord<P> {
    /// Sequence number - monotonically increasing
    pub seq: u64,

    /// Timestamp (unix millis) when the record was created
    pub timestamp: u64,

    /// The logged payload
    pub payload: P,
}

/// Store operations that can be logged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// Set a key to a value
    Set {
        key: String,
        value: Vec<u8>,
        stamp: Option<Stamp>,
    },

    /// Delete a key (tombstone)
    Delete { key: String, stamp: Option<Stamp> },

    /// Set several keys in one atomic record
    BulkSet { items: Vec<BulkItem> },
}

/// One key of a `BulkSet`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkItem {
    pub key: String,
    pub value: Vec<u8>,
    pub stamp: Option<Stamp>,
}

impl Operation {
    /// Plain set without causal metadata
    pub fn set(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Operation::Set {
            key: key.into(),
            value: value.into(),
            stamp: None,
        }
    }

    /// Plain delete without causal metadata
    pub fn delete(key: impl Into<String>) -> Self {
        Operation::Delete {
            key: key.into(),
            stamp: None,
        }
    }

    /// Keys touched by the operation
    pub fn keys(&self) -> Vec<&str> {
        match self {
            Operation::Set { key, .. } | Operation::Delete { key, .. } => vec![key.as_str()],
            Operation::BulkSet { items } => items.iter().map(|i| i.key.as_str()).collect(),
        }
    }
}

impl<P> WalRecord<P> {
    pub fn new(seq: u64, payload: P) -> Self {
        Self {
            seq,
            timestamp: now_millis(),
            payload,
        }
    }
}

impl<P: Serialize> WalRecord<P> {
    /// Serialize to `[seq][crc][len][body]`
    ///
    /// The CRC covers the sequence bytes and the body, so a record whose
    /// header was torn from another record never validates.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        encode_record(self.seq, self.timestamp, &self.payload)
    }
}

impl<P: DeserializeOwned> WalRecord<P> {
    /// Rebuild a record from its header fields and body, validating the CRC
    pub fn from_parts(seq: u64, crc: u32, body: &[u8]) -> Result<Self> {
        let actual = compute_crc(seq, body);
        if actual != crc {
            return Err(KvError::WalCorruption(format!(
                "CRC mismatch for record {}: expected {:08x}, got {:08x}",
                seq, crc, actual
            )));
        }
        let (timestamp, payload): (u64, P) = bincode::deserialize(body)?;
        Ok(Self {
            seq,
            timestamp,
            payload,
        })
    }
}

/// Encode a record without building a `WalRecord` first
pub(crate) fn encode_record<P: Serialize>(seq: u64, timestamp: u64, payload: &P) -> Result<Vec<u8>> {
    let body = bincode::serialize(&(timestamp, payload))?;
    if body.len() > MAX_RECORD_SIZE as usize {
        return Err(KvError::WalCorruption(format!(
            "record {} too large: {} bytes (max {})",
            seq,
            body.len(),
            MAX_RECORD_SIZE
        )));
    }

    let crc = compute_crc(seq, &body);
    let mut bytes = Vec::with_capacity(HEADER_SIZE + body.len());
    bytes.extend_from_slice(&seq.to_le_bytes());
    bytes.extend_from_slice(&crc.to_le_bytes());
    bytes.extend_from_slice(&(body.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&body);
    Ok(bytes)
}

/// Split a raw header into (seq, crc, len)
pub(crate) fn decode_header(header: &[u8; HEADER_SIZE]) -> (u64, u32, u32) {
    let mut seq = [0u8; 8];
    let mut crc = [0u8; 4];
    let mut len = [0u8; 4];
    seq.copy_from_slice(&header[0..8]);
    crc.copy_from_slice(&header[8..12]);
    len.copy_from_slice(&header[12..16]);
    (u64::from_le_bytes(seq), u32::from_le_bytes(crc), u32::from_le_bytes(len))
}

fn compute_crc(seq: u64, body: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&seq.to_le_bytes());
    hasher.update(body);
    hasher.finalize()
}

/// Milliseconds since the unix epoch
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
