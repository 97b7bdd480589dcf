//! Protocol Module
//!
//! Messages exchanged between nodes and with clients, and their framing.
//!
//! ## Message Families
//! - Client: `ClientGet`, `ClientSet`, `ClientDelete`, `ClientBulkSet`
//! - Primary-secondary: `VoteRequest`, `AppendEntries` and their replies
//! - Masterless: `Put`, `PutBatch`, `Get`, `DigestExchange` and their replies

mod codec;
mod message;

pub use codec::{decode_message, encode_message, read_message, write_message, HEADER_SIZE, MAX_PAYLOAD_SIZE};
pub use message::{AppendAck, AppendEntries, Message, VoteRequest, VoteResponse, WireError};
