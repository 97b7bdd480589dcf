//! WAL Reader
//!
//! Handles reading records from the WAL file.

use std::fs::File;
use std::io::{BufReader, Read};
use std::marker::PhantomData;
use std::path::Path;

use serde::de::DeserializeOwned;

use super::entry::{decode_header, HEADER_SIZE, MAX_RECORD_SIZE};
use super::WalRecord;
use crate::error::{KvError, Result};

/// What the reader found at the current position
pub(crate) enum Frame<P> {
    /// A valid record
    Record(WalRecord<P>),

    /// A complete record whose checksum or body is bad; already skipped
    Corrupt { offset: u64, seq: u64 },

    /// An incomplete record at the tail (or an unusable length field)
    Torn { offset: u64 },

    End,
}

/// Reads records from the WAL file
pub struct WalReader<P> {
    reader: BufReader<File>,
    position: u64,
    file_len: u64,
    _payload: PhantomData<fn() -> P>,
}

impl<P: DeserializeOwned> WalReader<P> {
    /// Open a WAL file for reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        Ok(Self {
            reader: BufReader::new(file),
            position: 0,
            file_len,
            _payload: PhantomData,
        })
    }

    /// Byte offset of the next record
    pub fn position(&self) -> u64 {
        self.position
    }

    pub(crate) fn next_frame(&mut self) -> Result<Frame<P>> {
        let offset = self.position;
        let remaining = self.file_len - offset;
        if remaining == 0 {
            return Ok(Frame::End);
        }
        if remaining < HEADER_SIZE as u64 {
            return Ok(Frame::Torn { offset });
        }

        let mut header = [0u8; HEADER_SIZE];
        self.reader.read_exact(&mut header)?;
        let (seq, crc, len) = decode_header(&header);

        // A length past the end of the file is either a torn write or a
        // smashed header; nothing after it can be trusted
        if len > MAX_RECORD_SIZE || (len as u64) > remaining - HEADER_SIZE as u64 {
            return Ok(Frame::Torn { offset });
        }

        let mut body = vec![0u8; len as usize];
        self.reader.read_exact(&mut body)?;
        self.position += HEADER_SIZE as u64 + len as u64;

        match WalRecord::from_parts(seq, crc, &body) {
            Ok(record) => Ok(Frame::Record(record)),
            Err(KvError::WalCorruption(_)) | Err(KvError::Serialization(_)) => {
                Ok(Frame::Corrupt { offset, seq })
            }
            Err(e) => Err(e),
        }
    }

    /// Read the next record from the WAL
    ///
    /// Strict: a corrupt or torn record is an error.
    pub fn next_entry(&mut self) -> Result<Option<WalRecord<P>>> {
        match self.next_frame()? {
            Frame::Record(record) => Ok(Some(record)),
            Frame::End => Ok(None),
            Frame::Corrupt { offset, seq } => Err(KvError::WalCorruption(format!(
                "record {} at offset {} failed validation",
                seq, offset
            ))),
            Frame::Torn { offset } => Err(KvError::WalCorruption(format!(
                "incomplete record at offset {}",
                offset
            ))),
        }
    }

    /// Iterate over all records
    pub fn entries(self) -> WalIterator<P> {
        WalIterator {
            reader: self,
            done: false,
        }
    }
}

/// Iterator over WAL records; stops after the first error
pub struct WalIterator<P> {
    reader: WalReader<P>,
    done: bool,
}

impl<P: DeserializeOwned> Iterator for WalIterator<P> {
    type Item = Result<WalRecord<P>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_entry() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
