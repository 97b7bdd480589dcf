//! Tests for primary-secondary replication
//!
//! These tests verify:
//! - A single leader is elected per term
//! - Non-leaders refuse client operations with a redirect hint
//! - Followers apply entries only once they are committed
//! - Failover after the leader dies
//! - Writes without a majority fail and are not rolled back
//! - Term, vote and log survive restarts

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use common::{open_store, wait_until, PrimaryCluster};
use replikv::network::{LocalNetwork, MessageHandler, Transport};
use replikv::{ClusterConfig, KvError, KvService, PrimaryNode, Role};
use tempfile::TempDir;

const SETTLE: Duration = Duration::from_secs(5);

fn pairs(items: &[(&str, &str)]) -> Vec<(String, Vec<u8>)> {
    items
        .iter()
        .map(|(k, v)| (k.to_string(), v.as_bytes().to_vec()))
        .collect()
}

// =============================================================================
// Election
// =============================================================================

#[test]
fn test_single_leader_elected() {
    let cluster = PrimaryCluster::start(3);

    let leader = cluster.wait_for_leader(SETTLE).expect("no leader elected");

    assert_eq!(cluster.leaders().len(), 1);
    for follower in cluster.followers(leader.id()) {
        let status = follower.status();
        assert_eq!(status.role, Role::Follower);
        assert_eq!(status.leader, Some(leader.id()));
        assert_eq!(status.term, leader.term());
    }
}

#[test]
fn test_at_most_one_leader_per_term() {
    let cluster = PrimaryCluster::start(3);
    cluster.wait_for_leader(SETTLE).expect("no leader elected");

    // Sample repeatedly while the cluster runs
    let mut leaders_by_term: HashMap<u64, u64> = HashMap::new();
    for _ in 0..50 {
        for node in &cluster.nodes {
            let status = node.status();
            if status.role == Role::Leader {
                let previous = leaders_by_term.insert(status.term, status.id);
                assert!(previous.is_none() || previous == Some(status.id));
            }
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_single_node_cluster_elects_itself() {
    let temp = TempDir::new().unwrap();
    let network = LocalNetwork::new();
    let config = ClusterConfig::builder(1)
        .election_timeout_ms(50, 100)
        .heartbeat_interval_ms(10)
        .build();
    let transport: Arc<dyn Transport> = network.transport(1);
    let node = PrimaryNode::new(config, open_store(temp.path()), transport).unwrap();
    node.start().unwrap();

    assert!(wait_until(SETTLE, || node.is_leader()));
    node.set("k", b"v", false).unwrap();
    assert_eq!(node.get("k").unwrap(), b"v");

    node.stop();
}

// =============================================================================
// Client Routing
// =============================================================================

#[test]
fn test_follower_redirects_to_leader() {
    let cluster = PrimaryCluster::start(3);
    let leader = cluster.wait_for_leader(SETTLE).expect("no leader elected");
    let follower = cluster.followers(leader.id()).remove(0);

    let write = follower.set("k", b"v", false);
    let read = follower.get("k");

    assert!(matches!(write, Err(KvError::NotLeader { leader: Some(id) }) if id == leader.id()));
    assert!(matches!(read, Err(KvError::NotLeader { leader: Some(id) }) if id == leader.id()));
}

#[test]
fn test_refused_write_touches_neither_log_nor_store() {
    let cluster = PrimaryCluster::start(3);
    let leader = cluster.wait_for_leader(SETTLE).expect("no leader elected");
    let follower = cluster.followers(leader.id()).remove(0);
    let before = follower.status();

    let result = follower.bulk_set(&pairs(&[("a", "1"), ("b", "2")]), false);

    assert!(matches!(result, Err(KvError::NotLeader { .. })));
    let after = follower.status();
    assert_eq!(after.last_log_index, before.last_log_index);
    assert_eq!(after.last_applied, before.last_applied);
    assert!(matches!(follower.store().get("a"), Err(KvError::NotFound)));
}

#[test]
fn test_client_messages_go_through_handler() {
    let cluster = PrimaryCluster::start(3);
    let leader = cluster.wait_for_leader(SETTLE).expect("no leader elected");
    let client = cluster.network.transport(99);

    let ack = client
        .call(
            leader.id(),
            replikv::protocol::Message::ClientSet {
                key: "k".into(),
                value: b"v".to_vec(),
                simulate_failure: false,
            },
            Duration::from_secs(1),
        )
        .unwrap();
    ack.into_ack().unwrap();

    let value = client
        .call(
            leader.id(),
            replikv::protocol::Message::ClientGet { key: "k".into() },
            Duration::from_secs(1),
        )
        .unwrap()
        .into_value()
        .unwrap();
    assert_eq!(value, b"v");
}

#[test]
fn test_stopped_node_rejects_everything() {
    let cluster = PrimaryCluster::start(3);
    let leader = cluster.wait_for_leader(SETTLE).expect("no leader elected");
    let follower = cluster.followers(leader.id()).remove(0);

    follower.stop();

    assert!(matches!(follower.get("k"), Err(KvError::Shutdown)));
    let handler: &dyn MessageHandler = follower.as_ref();
    let reply = handler.handle(replikv::protocol::Message::ClientGet { key: "k".into() });
    assert!(matches!(reply.into_value(), Err(KvError::Protocol(_))));
}

// =============================================================================
// Replication
// =============================================================================

#[test]
fn test_write_reaches_followers() {
    let cluster = PrimaryCluster::start(3);
    let leader = cluster.wait_for_leader(SETTLE).expect("no leader elected");

    leader.set("k", b"v1", false).unwrap();
    leader.delete("gone", false).unwrap();

    assert_eq!(leader.get("k").unwrap(), b"v1");
    for follower in cluster.followers(leader.id()) {
        assert!(wait_until(SETTLE, || {
            follower.store().get_entry("gone").map(|e| e.tombstone) == Some(true)
        }));
        assert_eq!(follower.store().get("k").unwrap(), b"v1");
    }
}

#[test]
fn test_majority_holds_write_when_acknowledged() {
    let cluster = PrimaryCluster::start(3);
    let leader = cluster.wait_for_leader(SETTLE).expect("no leader elected");

    leader.set("k", b"v1", false).unwrap();
    let index = leader.status().last_log_index;

    // Leader plus at least one follower logged the entry at the moment of the ack
    let holders = cluster
        .followers(leader.id())
        .iter()
        .filter(|f| f.status().last_log_index >= index)
        .count()
        + 1;
    assert!(holders >= 2);
    assert_eq!(leader.status().last_applied, index);
}

#[test]
fn test_bulk_set_replicated_as_one_entry() {
    let cluster = PrimaryCluster::start(3);
    let leader = cluster.wait_for_leader(SETTLE).expect("no leader elected");
    let before = leader.status().last_log_index;

    leader.bulk_set(&pairs(&[("a", "1"), ("b", "2")]), false).unwrap();

    assert_eq!(leader.status().last_log_index, before + 1);
    for follower in cluster.followers(leader.id()) {
        assert!(wait_until(SETTLE, || follower.status().last_applied == before + 1));
        assert_eq!(follower.status().last_log_index, before + 1);
        assert_eq!(follower.store().get("a").unwrap(), b"1");
        assert_eq!(follower.store().get("b").unwrap(), b"2");
    }
}

#[test]
fn test_commit_index_advances() {
    let cluster = PrimaryCluster::start(3);
    let leader = cluster.wait_for_leader(SETTLE).expect("no leader elected");

    leader.set("a", b"1", false).unwrap();
    leader.set("b", b"2", false).unwrap();

    let last = leader.status().last_log_index;
    assert!(wait_until(SETTLE, || leader.status().commit_index == last));
    for follower in cluster.followers(leader.id()) {
        assert!(wait_until(SETTLE, || follower.status().commit_index == last));
    }
}

#[test]
fn test_lagging_follower_catches_up() {
    let cluster = PrimaryCluster::start(3);
    let leader = cluster.wait_for_leader(SETTLE).expect("no leader elected");
    let lagging = cluster.followers(leader.id()).remove(0);

    cluster.network.partition(leader.id(), lagging.id());
    // Keep the lagging node from disrupting the others while cut off
    cluster.network.kill(lagging.id());
    for i in 0..10 {
        leader.set(&format!("key-{}", i), b"v", false).unwrap();
    }
    assert!(matches!(lagging.store().get("key-0"), Err(KvError::NotFound)));

    cluster.network.heal();

    let leader = cluster.wait_for_leader(SETTLE).expect("no leader after heal");
    leader.set("after", b"v", false).unwrap();
    for follower in cluster.followers(leader.id()) {
        assert!(wait_until(SETTLE, || follower.store().get("after").is_ok()));
        for i in 0..10 {
            assert_eq!(follower.store().get(&format!("key-{}", i)).unwrap(), b"v");
        }
    }
}

// =============================================================================
// Failover
// =============================================================================

#[test]
fn test_failover_after_leader_dies() {
    let cluster = PrimaryCluster::start(3);
    let old = cluster.wait_for_leader(SETTLE).expect("no leader elected");
    let old_term = old.term();
    old.set("before", b"v0", false).unwrap();

    cluster.kill(old.id());

    let new = cluster.wait_for_leader(SETTLE).expect("no leader after failover");
    assert_ne!(new.id(), old.id());
    assert!(new.term() > old_term);

    new.set("k", b"v2", false).unwrap();

    for node in cluster.nodes.iter().filter(|n| n.is_running()) {
        assert!(wait_until(SETTLE, || node.store().get("k").ok().as_deref() == Some(&b"v2"[..])));
        assert_eq!(node.store().get("before").unwrap(), b"v0");
    }
}

#[test]
fn test_write_without_majority_fails_and_stays_local() {
    let cluster = PrimaryCluster::start(3);
    let leader = cluster.wait_for_leader(SETTLE).expect("no leader elected");
    for follower in cluster.followers(leader.id()) {
        cluster.network.kill(follower.id());
    }

    let result = leader.set("k", b"v", false);

    assert!(matches!(result, Err(KvError::QuorumNotReached { acks: 1, required: 2 })));
    assert_eq!(leader.store().get("k").unwrap(), b"v");
}

#[test]
fn test_uncommitted_entry_never_reaches_follower_store() {
    let cluster = PrimaryCluster::start(5);
    let old = cluster.wait_for_leader(SETTLE).expect("no leader elected");
    let mut followers = cluster.followers(old.id());
    let ally = followers.remove(0);

    // Old leader and one follower on the minority side
    for node in &followers {
        cluster.network.partition(old.id(), node.id());
        cluster.network.partition(ally.id(), node.id());
    }

    let result = old.set("x", b"minority", false);
    assert!(matches!(result, Err(KvError::QuorumNotReached { acks: 2, required: 3 })));
    assert_eq!(ally.status().last_log_index, old.status().last_log_index);
    assert!(matches!(ally.store().get("x"), Err(KvError::NotFound)));

    // The majority side elects its own leader and writes
    let mut new = None;
    assert!(wait_until(SETTLE, || {
        new = followers.iter().find(|n| n.is_leader()).cloned();
        match &new {
            Some(leader) => followers
                .iter()
                .all(|n| n.leader() == Some(leader.id()) && n.term() == leader.term()),
            None => false,
        }
    }));
    let new = new.expect("no majority leader");
    new.set("y", b"majority", false).unwrap();

    cluster.network.heal();

    assert!(wait_until(SETTLE, || ally.store().get("y").is_ok()));
    assert!(matches!(ally.store().get("x"), Err(KvError::NotFound)));
    let status = ally.status();
    assert_eq!(status.last_applied, status.commit_index);
}

// =============================================================================
// Restart
// =============================================================================

#[test]
fn test_term_and_log_survive_restart() {
    let temp = TempDir::new().unwrap();
    let network = LocalNetwork::new();
    let config = ClusterConfig::builder(1)
        .election_timeout_ms(50, 100)
        .heartbeat_interval_ms(10)
        .build();

    let (term, last_index) = {
        let transport: Arc<dyn Transport> = network.transport(1);
        let node = PrimaryNode::new(config.clone(), open_store(temp.path()), transport).unwrap();
        node.start().unwrap();
        assert!(wait_until(SETTLE, || node.is_leader()));
        node.set("a", b"1", false).unwrap();
        node.set("b", b"2", false).unwrap();
        node.stop();
        let status = node.status();
        (status.term, status.last_log_index)
    };

    let transport: Arc<dyn Transport> = network.transport(1);
    let node = PrimaryNode::new(config, open_store(temp.path()), transport).unwrap();
    let status = node.status();

    assert!(status.term >= term);
    assert_eq!(status.last_log_index, last_index);
    assert_eq!(status.last_applied, last_index);
    assert_eq!(node.store().get("b").unwrap(), b"2");

    node.start().unwrap();
    assert!(wait_until(SETTLE, || node.is_leader()));
    assert!(node.term() > term);
    node.stop();
}

#[test]
fn test_service_trait_object() {
    let cluster = PrimaryCluster::start(3);
    let leader = cluster.wait_for_leader(SETTLE).expect("no leader elected");
    let service: Arc<dyn KvService> = leader;

    service.set("k", b"v", false).unwrap();

    assert_eq!(service.get("k").unwrap(), b"v");
}
