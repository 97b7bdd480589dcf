//! In-process network
//!
//! Every call goes through the wire codec so messages are exercised exactly
//! as they would be over TCP. Nodes can be killed (all their traffic fails)
//! and pairs of nodes partitioned.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::RwLock;

use super::{MessageHandler, Transport};
use crate::error::{KvError, Result};
use crate::protocol::{decode_message, encode_message, Message};
use crate::NodeId;

/// Shared switchboard for nodes living in one process
#[derive(Default)]
pub struct LocalNetwork {
    handlers: RwLock<HashMap<NodeId, Weak<dyn MessageHandler>>>,
    down: RwLock<HashSet<NodeId>>,
    partitions: RwLock<HashSet<(NodeId, NodeId)>>,
}

impl LocalNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Attach a node's handler; the network only keeps a weak reference
    pub fn register(&self, node: NodeId, handler: &Arc<dyn MessageHandler>) {
        self.handlers.write().insert(node, Arc::downgrade(handler));
    }

    /// Transport used by `node` to reach its peers
    pub fn transport(self: &Arc<Self>, node: NodeId) -> Arc<LocalTransport> {
        Arc::new(LocalTransport {
            network: Arc::clone(self),
            node,
        })
    }

    /// Cut every link to and from `node`
    pub fn kill(&self, node: NodeId) {
        tracing::debug!(node, "local network: node down");
        self.down.write().insert(node);
    }

    pub fn revive(&self, node: NodeId) {
        tracing::debug!(node, "local network: node up");
        self.down.write().remove(&node);
    }

    /// Cut the link between `a` and `b` in both directions
    pub fn partition(&self, a: NodeId, b: NodeId) {
        let mut partitions = self.partitions.write();
        partitions.insert((a, b));
        partitions.insert((b, a));
    }

    /// Restore every link and every node
    pub fn heal(&self) {
        self.partitions.write().clear();
        self.down.write().clear();
    }

    fn is_blocked(&self, from: NodeId, to: NodeId) -> bool {
        {
            let down = self.down.read();
            if down.contains(&from) || down.contains(&to) {
                return true;
            }
        }
        self.partitions.read().contains(&(from, to))
    }

    fn deliver(&self, from: NodeId, to: NodeId, message: Message) -> Result<Message> {
        let unreachable = |reason: &str| KvError::PeerUnreachable {
            peer: to,
            reason: reason.to_string(),
        };

        if self.is_blocked(from, to) {
            return Err(unreachable("link down"));
        }
        let handler = self
            .handlers
            .read()
            .get(&to)
            .and_then(Weak::upgrade)
            .ok_or_else(|| unreachable("no such node"))?;

        let request = decode_message(&encode_message(&message)?)?;
        let reply = handler.handle(request);

        // The link may have been cut while the request was in flight
        if self.is_blocked(from, to) {
            return Err(unreachable("link down"));
        }
        decode_message(&encode_message(&reply)?)
    }
}

/// One node's view of a `LocalNetwork`
pub struct LocalTransport {
    network: Arc<LocalNetwork>,
    node: NodeId,
}

impl Transport for LocalTransport {
    fn call(&self, peer: NodeId, message: Message, _timeout: Duration) -> Result<Message> {
        self.network.deliver(self.node, peer, message)
    }
}
