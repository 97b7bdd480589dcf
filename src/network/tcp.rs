//! TCP transport
//!
//! Opens a fresh connection per call; peers are few and calls are short.

use std::collections::HashMap;
use std::io::{BufReader, BufWriter};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use super::Transport;
use crate::error::{KvError, Result};
use crate::protocol::{read_message, write_message, Message};
use crate::NodeId;

/// Reaches peers by address
pub struct TcpTransport {
    addresses: HashMap<NodeId, SocketAddr>,
}

impl TcpTransport {
    pub fn new(addresses: HashMap<NodeId, SocketAddr>) -> Self {
        Self { addresses }
    }

    pub fn address(&self, peer: NodeId) -> Option<SocketAddr> {
        self.addresses.get(&peer).copied()
    }

    fn exchange(addr: SocketAddr, message: &Message, timeout: Duration) -> Result<Message> {
        let stream = TcpStream::connect_timeout(&addr, timeout)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;

        let mut writer = BufWriter::new(stream.try_clone()?);
        write_message(&mut writer, message)?;

        let mut reader = BufReader::new(stream);
        read_message(&mut reader)
    }
}

impl Transport for TcpTransport {
    fn call(&self, peer: NodeId, message: Message, timeout: Duration) -> Result<Message> {
        let addr = self.address(peer).ok_or_else(|| KvError::PeerUnreachable {
            peer,
            reason: "no address configured".to_string(),
        })?;

        Self::exchange(addr, &message, timeout).map_err(|e| match e {
            KvError::Io(io) => KvError::PeerUnreachable {
                peer,
                reason: io.to_string(),
            },
            other => other,
        })
    }
}
