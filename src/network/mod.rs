//! Network Module
//!
//! Moves `Message`s between nodes.
//!
//! ## Responsibilities
//! - `Transport`: synchronous request/response to a peer, with timeout
//! - `MessageHandler`: what a node does with an inbound message
//! - `LocalNetwork`: in-process transport with kill and partition controls
//! - `TcpTransport` + `Server`: the same over TCP, thread per connection
//!
//! ## Fan-out
//! Replication rounds call many peers at once. `fan_out` runs one thread
//! per call and streams results back over a crossbeam channel so the caller
//! can stop waiting as soon as a quorum is decided.

mod connection;
mod local;
mod server;
mod tcp;
mod transport;

use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{self, Receiver};

pub use connection::Connection;
pub use local::{LocalNetwork, LocalTransport};
pub use server::Server;
pub use tcp::TcpTransport;
pub use transport::{MessageHandler, Transport};

use crate::error::Result;
use crate::protocol::Message;
use crate::NodeId;

/// Send each `(peer, message)` on its own thread
///
/// Results arrive in completion order. Threads outlive the receiver if the
/// caller stops listening early; their results are then discarded.
pub fn fan_out(
    transport: &Arc<dyn Transport>,
    requests: Vec<(NodeId, Message)>,
    timeout: Duration,
) -> Receiver<(NodeId, Result<Message>)> {
    let (tx, rx) = channel::unbounded();
    for (peer, message) in requests {
        let transport = Arc::clone(transport);
        let tx = tx.clone();
        std::thread::spawn(move || {
            let result = transport.call(peer, message, timeout);
            let _ = tx.send((peer, result));
        });
    }
    rx
}
