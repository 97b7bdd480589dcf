//! Protocol codec
//!
//! Framing for `Message` values on a byte stream.
//!
//! ## Wire Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Len (4)  │ CRC (4)  │   Payload (bincode)         │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//! Both header fields are big-endian. The CRC covers the payload only.

use std::io::{Read, Write};

use bytes::{BufMut, Bytes, BytesMut};

use super::Message;
use crate::error::{KvError, Result};

/// Header size: 4 bytes length + 4 bytes CRC
pub const HEADER_SIZE: usize = 8;

/// Maximum payload size (16 MB)
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

/// Encode a message into one frame
pub fn encode_message(message: &Message) -> Result<Bytes> {
    let payload = bincode::serialize(message)?;
    if payload.len() > MAX_PAYLOAD_SIZE as usize {
        return Err(KvError::Protocol(format!(
            "Payload too large: {} bytes (max {})",
            payload.len(),
            MAX_PAYLOAD_SIZE
        )));
    }

    let mut frame = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    frame.put_u32(payload.len() as u32);
    frame.put_u32(crc32fast::hash(&payload));
    frame.put_slice(&payload);
    Ok(frame.freeze())
}

/// Decode one complete frame
pub fn decode_message(bytes: &[u8]) -> Result<Message> {
    if bytes.len() < HEADER_SIZE {
        return Err(KvError::Protocol(format!(
            "Incomplete header: expected {} bytes, got {}",
            HEADER_SIZE,
            bytes.len()
        )));
    }

    let (payload_len, crc) = parse_header(&bytes[..HEADER_SIZE])?;
    let total_len = HEADER_SIZE + payload_len;
    if bytes.len() < total_len {
        return Err(KvError::Protocol(format!(
            "Incomplete payload: expected {} bytes, got {}",
            total_len,
            bytes.len()
        )));
    }

    decode_payload(&bytes[HEADER_SIZE..total_len], crc)
}

/// Read one message from a stream (blocking)
pub fn read_message<R: Read>(reader: &mut R) -> Result<Message> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header)?;
    let (payload_len, crc) = parse_header(&header)?;

    let mut payload = vec![0u8; payload_len];
    if payload_len > 0 {
        reader.read_exact(&mut payload)?;
    }

    decode_payload(&payload, crc)
}

/// Write one message to a stream and flush
pub fn write_message<W: Write>(writer: &mut W, message: &Message) -> Result<()> {
    let frame = encode_message(message)?;
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

fn parse_header(header: &[u8]) -> Result<(usize, u32)> {
    let payload_len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
    let crc = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);

    if payload_len > MAX_PAYLOAD_SIZE {
        return Err(KvError::Protocol(format!(
            "Payload too large: {} bytes (max {})",
            payload_len, MAX_PAYLOAD_SIZE
        )));
    }
    Ok((payload_len as usize, crc))
}

fn decode_payload(payload: &[u8], crc: u32) -> Result<Message> {
    let actual = crc32fast::hash(payload);
    if actual != crc {
        return Err(KvError::Protocol(format!(
            "Frame CRC mismatch: expected {:08x}, got {:08x}",
            crc, actual
        )));
    }
    bincode::deserialize(payload).map_err(|e| KvError::Protocol(format!("Malformed message: {}", e)))
}
