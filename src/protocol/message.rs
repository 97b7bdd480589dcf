//! Message definitions

use serde::{Deserialize, Serialize};

use crate::clock::{VectorClock, Version};
use crate::error::KvError;
use crate::masterless::Digest;
use crate::primary::LogEntry;
use crate::NodeId;

/// Every request and reply on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    // -------------------------------------------------------------------------
    // Client
    // -------------------------------------------------------------------------
    ClientGet {
        key: String,
    },
    ClientSet {
        key: String,
        value: Vec<u8>,
        simulate_failure: bool,
    },
    ClientDelete {
        key: String,
        simulate_failure: bool,
    },
    ClientBulkSet {
        items: Vec<(String, Vec<u8>)>,
        simulate_failure: bool,
    },
    ClientValue {
        value: Vec<u8>,
    },
    ClientAck,

    // -------------------------------------------------------------------------
    // Primary-Secondary
    // -------------------------------------------------------------------------
    VoteRequest(VoteRequest),
    VoteResponse(VoteResponse),
    AppendEntries(AppendEntries),
    AppendAck(AppendAck),

    // -------------------------------------------------------------------------
    // Masterless
    // -------------------------------------------------------------------------
    /// Store a replica version
    Put {
        key: String,
        version: Version,
    },
    /// Store several replica versions (bulk writes, gossip push)
    PutBatch {
        versions: Vec<(String, Version)>,
    },
    PutAck {
        /// Whether the local copy changed
        applied: bool,
    },
    /// Read the local version of a key
    Get {
        key: String,
    },
    GetResponse {
        version: Option<Version>,
    },
    /// Anti-entropy digest from `from`
    DigestExchange {
        from: NodeId,
        digest: Digest,
    },
    DigestReply {
        /// Versions the responder holds that the sender lacks or conflicts with
        versions: Vec<(String, Version)>,
        /// Keys the responder wants pushed back
        wanted: Vec<String>,
    },

    Error(WireError),
}

/// Candidate asking for a vote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRequest {
    pub term: u64,
    pub candidate_id: NodeId,
    pub last_log_index: u64,
    pub last_log_term: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteResponse {
    pub term: u64,
    pub vote_granted: bool,
}

/// Log replication and heartbeat (empty `entries`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppendEntries {
    pub term: u64,
    pub leader_id: NodeId,
    pub prev_log_index: u64,
    pub prev_log_term: u64,
    pub entries: Vec<LogEntry>,
    pub leader_commit: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendAck {
    pub term: u64,
    pub success: bool,

    /// On success the follower's match index; on failure its last log index
    pub last_log_index: u64,
}

/// Error carried back to a remote caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WireError {
    NotFound,
    NotLeader {
        leader: Option<NodeId>,
    },
    QuorumNotReached {
        acks: usize,
        required: usize,
    },
    DurabilityFailure(String),
    Conflict {
        key: String,
        versions: Vec<Version>,
        context: VectorClock,
    },
    Other(String),
}

impl From<&KvError> for WireError {
    fn from(err: &KvError) -> Self {
        match err {
            KvError::NotFound => WireError::NotFound,
            KvError::NotLeader { leader } => WireError::NotLeader { leader: *leader },
            KvError::QuorumNotReached { acks, required } => WireError::QuorumNotReached {
                acks: *acks,
                required: *required,
            },
            KvError::DurabilityFailure(reason) => WireError::DurabilityFailure(reason.clone()),
            KvError::ConflictDetected { key, versions, context } => WireError::Conflict {
                key: key.clone(),
                versions: versions.clone(),
                context: context.clone(),
            },
            other => WireError::Other(other.to_string()),
        }
    }
}

impl From<WireError> for KvError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::NotFound => KvError::NotFound,
            WireError::NotLeader { leader } => KvError::NotLeader { leader },
            WireError::QuorumNotReached { acks, required } => KvError::QuorumNotReached { acks, required },
            WireError::DurabilityFailure(reason) => KvError::DurabilityFailure(reason),
            WireError::Conflict { key, versions, context } => KvError::ConflictDetected { key, versions, context },
            WireError::Other(reason) => KvError::Protocol(reason),
        }
    }
}

impl Message {
    /// Wrap a local error for the wire
    pub fn error(err: &KvError) -> Self {
        Message::Error(WireError::from(err))
    }

    /// Convert a client reply into a value
    pub fn into_value(self) -> crate::Result<Vec<u8>> {
        match self {
            Message::ClientValue { value } => Ok(value),
            Message::Error(err) => Err(err.into()),
            other => Err(KvError::Protocol(format!("expected a value, got {}", other.kind()))),
        }
    }

    /// Convert a client reply into an acknowledgement
    pub fn into_ack(self) -> crate::Result<()> {
        match self {
            Message::ClientAck => Ok(()),
            Message::Error(err) => Err(err.into()),
            other => Err(KvError::Protocol(format!("expected an ack, got {}", other.kind()))),
        }
    }

    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Message::ClientGet { .. } => "ClientGet",
            Message::ClientSet { .. } => "ClientSet",
            Message::ClientDelete { .. } => "ClientDelete",
            Message::ClientBulkSet { .. } => "ClientBulkSet",
            Message::ClientValue { .. } => "ClientValue",
            Message::ClientAck => "ClientAck",
            Message::VoteRequest(_) => "VoteRequest",
            Message::VoteResponse(_) => "VoteResponse",
            Message::AppendEntries(_) => "AppendEntries",
            Message::AppendAck(_) => "AppendAck",
            Message::Put { .. } => "Put",
            Message::PutBatch { .. } => "PutBatch",
            Message::PutAck { .. } => "PutAck",
            Message::Get { .. } => "Get",
            Message::GetResponse { .. } => "GetResponse",
            Message::DigestExchange { .. } => "DigestExchange",
            Message::DigestReply { .. } => "DigestReply",
            Message::Error(_) => "Error",
        }
    }
}
