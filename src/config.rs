//! Configuration for replikv
//!
//! Centralized configuration with sensible defaults. `Config` covers the
//! single-node durable store; `ClusterConfig` covers replication.

use std::collections::BTreeSet;
use std::ops::Range;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{KvError, Result};
use crate::NodeId;

/// Storage configuration for one `DurableStore` instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── wal.log          (write-ahead log)
    ///     ├── snapshot.db      (latest checkpoint)
    ///     ├── raft.log         (primary-secondary replication log)
    ///     ├── raft.state       (primary-secondary term / vote)
    ///     └── raft.applied     (primary-secondary applied index)
    pub data_dir: PathBuf,

    // -------------------------------------------------------------------------
    // WAL Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: how often to fsync WAL
    pub wal_sync_strategy: WalSyncStrategy,

    /// Number of WAL records after which a snapshot is taken (0 = never)
    pub snapshot_threshold: u64,

    // -------------------------------------------------------------------------
    // Testing
    // -------------------------------------------------------------------------
    /// Flush fault injection, off unless explicitly requested
    pub fault_injection: FaultInjection,
}

/// WAL sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalSyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N uncommitted entries (balanced durability/performance)
    EveryNEntries { count: usize },
}

/// Opt-in test mode that silently drops a fraction of WAL flushes
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FaultInjection {
    Disabled,

    /// Drop `rate` (0.0..=1.0) of the flushes requested with `simulate_failure`
    DropFlushes { rate: f64, seed: Option<u64> },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./replikv_data"),
            wal_sync_strategy: WalSyncStrategy::EveryWrite,
            snapshot_threshold: 10_000,
            fault_injection: FaultInjection::Disabled,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the WAL sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    /// Set how many WAL records trigger a snapshot
    pub fn snapshot_threshold(mut self, records: u64) -> Self {
        self.config.snapshot_threshold = records;
        self
    }

    /// Enable or disable flush fault injection
    pub fn fault_injection(mut self, fault: FaultInjection) -> Self {
        self.config.fault_injection = fault;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

// =============================================================================
// Cluster Configuration
// =============================================================================

/// How a masterless read reports concurrent versions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Return the tie-break winner; the conflict is listed in `ReadResult::conflicts`
    HighestReplicaWins,

    /// Fail the read with `KvError::ConflictDetected`
    Surface,
}

/// Replication settings shared by both cluster modes
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// This node's id
    pub node_id: NodeId,

    /// Static membership, excluding this node
    pub peers: Vec<NodeId>,

    // -------------------------------------------------------------------------
    // Primary-Secondary
    // -------------------------------------------------------------------------
    /// Lower bound of the randomized election timeout (milliseconds)
    pub election_timeout_min_ms: u64,

    /// Upper bound of the randomized election timeout (milliseconds)
    pub election_timeout_max_ms: u64,

    /// Leader heartbeat period (milliseconds)
    pub heartbeat_interval_ms: u64,

    /// How long a write or vote round waits on followers (milliseconds)
    pub replication_timeout_ms: u64,

    // -------------------------------------------------------------------------
    // Masterless
    // -------------------------------------------------------------------------
    /// Replicas per key (N)
    pub replication_factor: usize,

    /// Acks required for a write (W)
    pub write_quorum: usize,

    /// Responses required for a read (R)
    pub read_quorum: usize,

    /// How long a quorum operation waits on replicas (milliseconds)
    pub quorum_timeout_ms: u64,

    /// Anti-entropy period (milliseconds)
    pub gossip_interval_ms: u64,

    pub conflict_policy: ConflictPolicy,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            node_id: 1,
            peers: Vec::new(),
            election_timeout_min_ms: 300,
            election_timeout_max_ms: 600,
            heartbeat_interval_ms: 75,
            replication_timeout_ms: 1000,
            replication_factor: 3,
            write_quorum: 2,
            read_quorum: 2,
            quorum_timeout_ms: 1000,
            gossip_interval_ms: 2000,
            conflict_policy: ConflictPolicy::HighestReplicaWins,
        }
    }
}

impl ClusterConfig {
    /// Create a new cluster config builder
    pub fn builder(node_id: NodeId) -> ClusterConfigBuilder {
        ClusterConfigBuilder {
            config: ClusterConfig {
                node_id,
                ..ClusterConfig::default()
            },
        }
    }

    /// Number of nodes including this one
    pub fn cluster_size(&self) -> usize {
        self.peers.len() + 1
    }

    /// Votes or acks needed for a majority of the replica set
    pub fn majority(&self) -> usize {
        self.cluster_size() / 2 + 1
    }

    /// Every member id, sorted
    pub fn members(&self) -> Vec<NodeId> {
        let mut members: Vec<NodeId> = self.peers.clone();
        members.push(self.node_id);
        members.sort_unstable();
        members
    }

    pub fn election_timeout_range(&self) -> Range<u64> {
        self.election_timeout_min_ms..self.election_timeout_max_ms + 1
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn replication_timeout(&self) -> Duration {
        Duration::from_millis(self.replication_timeout_ms)
    }

    pub fn quorum_timeout(&self) -> Duration {
        Duration::from_millis(self.quorum_timeout_ms)
    }

    pub fn gossip_interval(&self) -> Duration {
        Duration::from_millis(self.gossip_interval_ms)
    }

    /// Check membership and primary-secondary timing
    pub fn validate_election(&self) -> Result<()> {
        self.validate_membership()?;
        if self.heartbeat_interval_ms == 0 {
            return Err(KvError::Config("heartbeat interval must be positive".into()));
        }
        if self.election_timeout_min_ms > self.election_timeout_max_ms {
            return Err(KvError::Config(format!(
                "election timeout range is empty: {}..{}",
                self.election_timeout_min_ms, self.election_timeout_max_ms
            )));
        }
        if self.election_timeout_min_ms <= self.heartbeat_interval_ms {
            return Err(KvError::Config(format!(
                "election timeout ({} ms) must exceed heartbeat interval ({} ms)",
                self.election_timeout_min_ms, self.heartbeat_interval_ms
            )));
        }
        Ok(())
    }

    /// Check membership and the N/W/R quorum arithmetic
    pub fn validate_quorum(&self) -> Result<()> {
        self.validate_membership()?;
        let n = self.replication_factor;
        if n == 0 || n > self.cluster_size() {
            return Err(KvError::Config(format!(
                "replication factor {} must be within 1..={}",
                n,
                self.cluster_size()
            )));
        }
        if self.write_quorum == 0 || self.write_quorum > n {
            return Err(KvError::Config(format!("write quorum {} must be within 1..={}", self.write_quorum, n)));
        }
        if self.read_quorum == 0 || self.read_quorum > n {
            return Err(KvError::Config(format!("read quorum {} must be within 1..={}", self.read_quorum, n)));
        }
        if self.read_quorum + self.write_quorum <= n {
            return Err(KvError::Config(format!(
                "R + W must exceed N (R={}, W={}, N={})",
                self.read_quorum, self.write_quorum, n
            )));
        }
        if self.gossip_interval_ms == 0 {
            return Err(KvError::Config("gossip interval must be positive".into()));
        }
        Ok(())
    }

    fn validate_membership(&self) -> Result<()> {
        let unique: BTreeSet<NodeId> = self.peers.iter().copied().collect();
        if unique.len() != self.peers.len() {
            return Err(KvError::Config("duplicate peer id".into()));
        }
        if unique.contains(&self.node_id) {
            return Err(KvError::Config(format!("node {} lists itself as a peer", self.node_id)));
        }
        Ok(())
    }
}

/// Builder for ClusterConfig
pub struct ClusterConfigBuilder {
    config: ClusterConfig,
}

impl ClusterConfigBuilder {
    /// Set the static peer list
    pub fn peers(mut self, peers: impl IntoIterator<Item = NodeId>) -> Self {
        self.config.peers = peers.into_iter().collect();
        self
    }

    /// Set the randomized election timeout bounds (milliseconds)
    pub fn election_timeout_ms(mut self, min: u64, max: u64) -> Self {
        self.config.election_timeout_min_ms = min;
        self.config.election_timeout_max_ms = max;
        self
    }

    pub fn heartbeat_interval_ms(mut self, ms: u64) -> Self {
        self.config.heartbeat_interval_ms = ms;
        self
    }

    pub fn replication_timeout_ms(mut self, ms: u64) -> Self {
        self.config.replication_timeout_ms = ms;
        self
    }

    /// Set N, W and R
    pub fn quorum(mut self, replication_factor: usize, write_quorum: usize, read_quorum: usize) -> Self {
        self.config.replication_factor = replication_factor;
        self.config.write_quorum = write_quorum;
        self.config.read_quorum = read_quorum;
        self
    }

    pub fn quorum_timeout_ms(mut self, ms: u64) -> Self {
        self.config.quorum_timeout_ms = ms;
        self
    }

    pub fn gossip_interval_ms(mut self, ms: u64) -> Self {
        self.config.gossip_interval_ms = ms;
        self
    }

    pub fn conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.config.conflict_policy = policy;
        self
    }

    pub fn build(self) -> ClusterConfig {
        self.config
    }
}
