//! Shared helpers for replikv integration tests
//!
//! Builds in-process clusters on a `LocalNetwork`, each node with its own
//! temporary data directory.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use replikv::network::{LocalNetwork, MessageHandler, Transport};
use replikv::{ClusterConfig, Config, ConflictPolicy, DurableStore, MasterlessNode, NodeId, PrimaryNode};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

/// Poll `condition` every 10ms until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(10));
    }
}

pub fn open_store(dir: &Path) -> Arc<DurableStore> {
    let config = Config::builder().data_dir(dir).build();
    Arc::new(DurableStore::open(config).unwrap())
}

fn members(size: usize) -> Vec<NodeId> {
    (1..=size as NodeId).collect()
}

fn peers_of(id: NodeId, size: usize) -> Vec<NodeId> {
    members(size).into_iter().filter(|&n| n != id).collect()
}

// =============================================================================
// Primary-Secondary Cluster
// =============================================================================

pub struct PrimaryCluster {
    pub network: Arc<LocalNetwork>,
    pub nodes: Vec<Arc<PrimaryNode>>,
    _dirs: Vec<TempDir>,
}

impl PrimaryCluster {
    /// Nodes 1..=size, started, with short timeouts
    pub fn start(size: usize) -> Self {
        let network = LocalNetwork::new();
        let mut nodes = Vec::new();
        let mut dirs = Vec::new();

        for id in members(size) {
            let dir = TempDir::new().unwrap();
            let config = ClusterConfig::builder(id)
                .peers(peers_of(id, size))
                .election_timeout_ms(150, 300)
                .heartbeat_interval_ms(30)
                .replication_timeout_ms(500)
                .build();
            let transport: Arc<dyn Transport> = network.transport(id);
            let node = PrimaryNode::new(config, open_store(dir.path()), transport).unwrap();

            let handler: Arc<dyn MessageHandler> = node.clone();
            network.register(id, &handler);
            nodes.push(node);
            dirs.push(dir);
        }
        for node in &nodes {
            node.start().unwrap();
        }

        Self {
            network,
            nodes,
            _dirs: dirs,
        }
    }

    pub fn node(&self, id: NodeId) -> &Arc<PrimaryNode> {
        &self.nodes[id as usize - 1]
    }

    /// Running nodes that currently claim leadership
    pub fn leaders(&self) -> Vec<Arc<PrimaryNode>> {
        self.nodes
            .iter()
            .filter(|n| n.is_running() && n.is_leader())
            .cloned()
            .collect()
    }

    /// Wait until exactly one running node is leader and every other running
    /// node follows it
    pub fn wait_for_leader(&self, timeout: Duration) -> Option<Arc<PrimaryNode>> {
        let mut found = None;
        let settled = wait_until(timeout, || {
            let leaders = self.leaders();
            if leaders.len() != 1 {
                return false;
            }
            let leader = &leaders[0];
            let agreed = self
                .nodes
                .iter()
                .filter(|n| n.is_running())
                .all(|n| n.leader() == Some(leader.id()) && n.term() == leader.term());
            if agreed {
                found = Some(Arc::clone(leader));
            }
            agreed
        });
        if settled {
            found
        } else {
            None
        }
    }

    pub fn followers(&self, leader: NodeId) -> Vec<Arc<PrimaryNode>> {
        self.nodes
            .iter()
            .filter(|n| n.id() != leader && n.is_running())
            .cloned()
            .collect()
    }

    /// Crash a node: cut it off and stop it
    pub fn kill(&self, id: NodeId) {
        self.network.kill(id);
        self.node(id).stop();
    }
}

impl Drop for PrimaryCluster {
    fn drop(&mut self) {
        for node in &self.nodes {
            node.stop();
        }
    }
}

// =============================================================================
// Masterless Cluster
// =============================================================================

pub struct MasterlessCluster {
    pub network: Arc<LocalNetwork>,
    pub nodes: Vec<Arc<MasterlessNode>>,
    _dirs: Vec<TempDir>,
}

impl MasterlessCluster {
    /// Nodes 1..=size with the given N/W/R
    ///
    /// The gossip interval is long enough that tests drive anti-entropy
    /// explicitly with `gossip_with`.
    pub fn start(size: usize, n: usize, w: usize, r: usize) -> Self {
        Self::start_with(size, n, w, r, ConflictPolicy::HighestReplicaWins, 60_000)
    }

    pub fn start_with_policy(size: usize, n: usize, w: usize, r: usize, policy: ConflictPolicy) -> Self {
        Self::start_with(size, n, w, r, policy, 60_000)
    }

    /// Nodes that also gossip on their own every `gossip_ms`
    pub fn start_gossiping(size: usize, n: usize, w: usize, r: usize, gossip_ms: u64) -> Self {
        Self::start_with(size, n, w, r, ConflictPolicy::HighestReplicaWins, gossip_ms)
    }

    fn start_with(size: usize, n: usize, w: usize, r: usize, policy: ConflictPolicy, gossip_ms: u64) -> Self {
        let network = LocalNetwork::new();
        let mut nodes = Vec::new();
        let mut dirs = Vec::new();

        for id in members(size) {
            let dir = TempDir::new().unwrap();
            let config = ClusterConfig::builder(id)
                .peers(peers_of(id, size))
                .quorum(n, w, r)
                .quorum_timeout_ms(500)
                .gossip_interval_ms(gossip_ms)
                .conflict_policy(policy)
                .build();
            let transport: Arc<dyn Transport> = network.transport(id);
            let node = MasterlessNode::new(config, open_store(dir.path()), transport).unwrap();

            let handler: Arc<dyn MessageHandler> = node.clone();
            network.register(id, &handler);
            node.start().unwrap();
            nodes.push(node);
            dirs.push(dir);
        }

        Self {
            network,
            nodes,
            _dirs: dirs,
        }
    }

    pub fn node(&self, id: NodeId) -> &Arc<MasterlessNode> {
        &self.nodes[id as usize - 1]
    }
}

impl Drop for MasterlessCluster {
    fn drop(&mut self) {
        for node in &self.nodes {
            node.stop();
        }
    }
}
