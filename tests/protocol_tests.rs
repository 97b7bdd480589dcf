//! Tests for the wire protocol and transports
//!
//! These tests verify:
//! - Frame encoding/decoding and CRC rejection
//! - Error mapping across the wire
//! - LocalNetwork kill/partition controls
//! - TCP server + transport end to end

use std::collections::HashMap;
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use replikv::network::{LocalNetwork, MessageHandler, Server, TcpTransport, Transport};
use replikv::primary::LogEntry;
use replikv::protocol::{
    decode_message, encode_message, read_message, write_message, AppendEntries, Message, WireError, HEADER_SIZE,
};
use replikv::wal::Operation;
use replikv::{ClusterConfig, Config, DurableStore, KvError, MasterlessNode, NodeId};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

/// Replies with the request it was given
struct Echo;

impl MessageHandler for Echo {
    fn handle(&self, message: Message) -> Message {
        message
    }
}

fn sample_append() -> Message {
    Message::AppendEntries(AppendEntries {
        term: 3,
        leader_id: 1,
        prev_log_index: 7,
        prev_log_term: 2,
        entries: vec![LogEntry {
            index: 8,
            term: 3,
            operation: Operation::set("k", "v"),
        }],
        leader_commit: 7,
    })
}

const TIMEOUT: Duration = Duration::from_millis(500);

// =============================================================================
// Codec
// =============================================================================

#[test]
fn test_encode_decode_append_entries() {
    let message = sample_append();

    let frame = encode_message(&message).unwrap();

    assert_eq!(decode_message(&frame).unwrap(), message);
}

#[test]
fn test_frame_header_is_big_endian_length() {
    let frame = encode_message(&Message::ClientAck).unwrap();

    let len = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
    assert_eq!(len, frame.len() - HEADER_SIZE);
}

#[test]
fn test_decode_rejects_bad_crc() {
    let frame = encode_message(&sample_append()).unwrap();
    let mut bytes = frame.to_vec();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;

    assert!(matches!(decode_message(&bytes), Err(KvError::Protocol(_))));
}

#[test]
fn test_decode_rejects_incomplete_frame() {
    let frame = encode_message(&sample_append()).unwrap();

    assert!(decode_message(&frame[..HEADER_SIZE - 1]).is_err());
    assert!(decode_message(&frame[..frame.len() - 1]).is_err());
}

#[test]
fn test_stream_read_write_sequence() {
    let mut buffer = Vec::new();
    write_message(&mut buffer, &Message::ClientGet { key: "a".into() }).unwrap();
    write_message(&mut buffer, &Message::ClientValue { value: b"1".to_vec() }).unwrap();

    let mut cursor = Cursor::new(buffer);

    assert_eq!(read_message(&mut cursor).unwrap(), Message::ClientGet { key: "a".into() });
    assert_eq!(
        read_message(&mut cursor).unwrap(),
        Message::ClientValue { value: b"1".to_vec() }
    );
    assert!(read_message(&mut cursor).is_err());
}

// =============================================================================
// Error Mapping
// =============================================================================

#[test]
fn test_not_leader_hint_survives_the_wire() {
    let reply = Message::error(&KvError::NotLeader { leader: Some(2) });
    let decoded = decode_message(&encode_message(&reply).unwrap()).unwrap();

    assert!(matches!(decoded.into_ack(), Err(KvError::NotLeader { leader: Some(2) })));
}

#[test]
fn test_quorum_error_survives_the_wire() {
    let reply = Message::error(&KvError::QuorumNotReached { acks: 1, required: 2 });

    assert_eq!(
        reply,
        Message::Error(WireError::QuorumNotReached { acks: 1, required: 2 })
    );
    assert!(matches!(
        reply.into_value(),
        Err(KvError::QuorumNotReached { acks: 1, required: 2 })
    ));
}

#[test]
fn test_error_messages_are_capitalised() {
    let errors = [
        KvError::NotFound,
        KvError::DurabilityFailure("disk".into()),
        KvError::QuorumNotReached { acks: 1, required: 2 },
        KvError::NotLeader { leader: None },
        KvError::PeerUnreachable {
            peer: 2,
            reason: "link down".into(),
        },
        KvError::Shutdown,
    ];

    for err in &errors {
        let message = err.to_string();
        assert!(message.starts_with(char::is_uppercase), "{}", message);
    }
}

#[test]
fn test_unexpected_reply_is_protocol_error() {
    assert!(matches!(Message::ClientAck.into_value(), Err(KvError::Protocol(_))));
}

// =============================================================================
// Local Network
// =============================================================================

fn echo_network() -> (Arc<LocalNetwork>, Vec<Arc<dyn MessageHandler>>) {
    let network = LocalNetwork::new();
    let handlers: Vec<Arc<dyn MessageHandler>> = (1..=3).map(|_| Arc::new(Echo) as Arc<dyn MessageHandler>).collect();
    for (i, handler) in handlers.iter().enumerate() {
        network.register(i as NodeId + 1, handler);
    }
    (network, handlers)
}

#[test]
fn test_local_network_delivers() {
    let (network, _handlers) = echo_network();
    let transport = network.transport(1);

    let reply = transport.call(2, sample_append(), TIMEOUT).unwrap();

    assert_eq!(reply, sample_append());
}

#[test]
fn test_local_network_kill_and_revive() {
    let (network, _handlers) = echo_network();
    let transport = network.transport(1);

    network.kill(2);
    assert!(matches!(
        transport.call(2, Message::ClientAck, TIMEOUT),
        Err(KvError::PeerUnreachable { peer: 2, .. })
    ));
    assert!(transport.call(3, Message::ClientAck, TIMEOUT).is_ok());

    network.revive(2);
    assert!(transport.call(2, Message::ClientAck, TIMEOUT).is_ok());
}

#[test]
fn test_local_network_partition_is_symmetric() {
    let (network, _handlers) = echo_network();

    network.partition(1, 2);

    assert!(network.transport(1).call(2, Message::ClientAck, TIMEOUT).is_err());
    assert!(network.transport(2).call(1, Message::ClientAck, TIMEOUT).is_err());
    assert!(network.transport(1).call(3, Message::ClientAck, TIMEOUT).is_ok());

    network.heal();
    assert!(network.transport(1).call(2, Message::ClientAck, TIMEOUT).is_ok());
}

#[test]
fn test_local_network_unknown_node() {
    let (network, _handlers) = echo_network();

    let err = network.transport(1).call(9, Message::ClientAck, TIMEOUT).unwrap_err();

    assert!(err.is_peer_failure());
}

#[test]
fn test_local_network_drops_released_handlers() {
    let network = LocalNetwork::new();
    {
        let handler: Arc<dyn MessageHandler> = Arc::new(Echo);
        network.register(1, &handler);
    }

    assert!(network.transport(2).call(1, Message::ClientAck, TIMEOUT).is_err());
}

// =============================================================================
// TCP
// =============================================================================

#[test]
fn test_tcp_round_trip_through_node() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(DurableStore::open(Config::builder().data_dir(temp.path()).build()).unwrap());
    let config = ClusterConfig::builder(1).quorum(1, 1, 1).build();
    let no_peers: Arc<dyn Transport> = Arc::new(TcpTransport::new(HashMap::new()));
    let node = MasterlessNode::new(config, store, no_peers).unwrap();
    node.start().unwrap();

    let handler: Arc<dyn MessageHandler> = node.clone();
    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let server = Arc::new(Server::bind(addr, handler).unwrap());
    let addr = server.local_addr().unwrap();
    let runner = {
        let server = Arc::clone(&server);
        thread::spawn(move || server.run())
    };

    let client = TcpTransport::new(HashMap::from([(1, addr)]));
    let set = Message::ClientSet {
        key: "k".into(),
        value: b"v".to_vec(),
        simulate_failure: false,
    };
    client.call(1, set, TIMEOUT).unwrap().into_ack().unwrap();
    let value = client
        .call(1, Message::ClientGet { key: "k".into() }, TIMEOUT)
        .unwrap()
        .into_value()
        .unwrap();
    let missing = client
        .call(1, Message::ClientGet { key: "nope".into() }, TIMEOUT)
        .unwrap()
        .into_value();

    server.shutdown();
    runner.join().unwrap().unwrap();
    node.stop();

    assert_eq!(value, b"v");
    assert!(matches!(missing, Err(KvError::NotFound)));
}

#[test]
fn test_tcp_unreachable_peer() {
    // Bind then drop to get a port nobody listens on
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let client = TcpTransport::new(HashMap::from([(5, addr)]));

    let err = client.call(5, Message::ClientAck, TIMEOUT).unwrap_err();

    assert!(matches!(err, KvError::PeerUnreachable { peer: 5, .. }));
}
