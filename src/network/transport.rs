//! Transport and handler seams

use std::time::Duration;

use crate::error::Result;
use crate::protocol::Message;
use crate::NodeId;

/// Request/response delivery to a peer
pub trait Transport: Send + Sync {
    /// Deliver `message` to `peer` and wait for its reply
    ///
    /// Fails with `KvError::PeerUnreachable` when the peer cannot be reached
    /// within `timeout`.
    fn call(&self, peer: NodeId, message: Message, timeout: Duration) -> Result<Message>;
}

/// Inbound side of a node
pub trait MessageHandler: Send + Sync {
    /// Handle one request; failures are reported as `Message::Error`
    fn handle(&self, message: Message) -> Message;
}
