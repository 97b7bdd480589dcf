//! Error types for replikv
//!
//! Provides a unified error type for the store and both replication modes.

use thiserror::Error;

use crate::clock::{VectorClock, Version};
use crate::NodeId;

/// Result type alias using KvError
pub type Result<T> = std::result::Result<T, KvError>;

/// Unified error type for replikv operations
#[derive(Debug, Error)]
pub enum KvError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Durability Errors
    // -------------------------------------------------------------------------
    #[error("WAL corruption detected: {0}")]
    WalCorruption(String),

    #[error("Durability failure: {0}")]
    DurabilityFailure(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("Key not found")]
    NotFound,

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Replication Errors
    // -------------------------------------------------------------------------
    #[error("Quorum not reached: {acks} of {required} replicas acknowledged")]
    QuorumNotReached { acks: usize, required: usize },

    #[error("Not leader (known leader: {leader:?})")]
    NotLeader { leader: Option<NodeId> },

    #[error("Conflicting versions for key {key:?}: {} concurrent", versions.len())]
    ConflictDetected {
        key: String,
        /// Concurrent versions, winner of the tie-break first
        versions: Vec<Version>,
        /// Merge of every concurrent clock; pass to `set_with_context` to resolve
        context: VectorClock,
    },

    #[error("Peer {peer} unreachable: {reason}")]
    PeerUnreachable { peer: NodeId, reason: String },

    // -------------------------------------------------------------------------
    // Network Errors
    // -------------------------------------------------------------------------
    #[error("Protocol error: {0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Node is shut down")]
    Shutdown,
}

impl From<bincode::Error> for KvError {
    fn from(err: bincode::Error) -> Self {
        KvError::Serialization(err.to_string())
    }
}

impl KvError {
    /// Whether the error only concerns one peer and may be skipped by a quorum round
    pub fn is_peer_failure(&self) -> bool {
        matches!(self, KvError::PeerUnreachable { .. })
    }
}
