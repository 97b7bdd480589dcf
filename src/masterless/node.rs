//! Masterless node
//!
//! ## Concurrency
//! `clocks` is the per-key vector clock table. Every change to a local
//! version (coordinated write, replica apply, read repair, gossip) reads the
//! current version, decides, writes the store and updates the table while
//! holding it, so two changes to the same key never interleave.
//!
//! Lock order: `clocks` → `digest_cache`.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::gossip::{diff_digests, Digest, GossipStats};
use super::placement::preference_list;
use super::quorum::QuorumTracker;
use crate::clock::{merge_version, resolve, MergeOutcome, Stamp, VectorClock, Version};
use crate::config::{ClusterConfig, ConflictPolicy};
use crate::error::{KvError, Result};
use crate::network::{fan_out, MessageHandler, Transport};
use crate::protocol::Message;
use crate::service::KvService;
use crate::store::DurableStore;
use crate::wal::{BulkItem, Operation};
use crate::NodeId;

/// A successful quorum read
#[derive(Debug, Clone, PartialEq)]
pub struct ReadResult {
    pub value: Vec<u8>,

    /// Stamp of the returned version; its clock is the context for a follow-up write
    pub stamp: Stamp,

    /// Concurrent versions collapsed into `value` (winner first); empty when none
    pub conflicts: Vec<Version>,
}

impl ReadResult {
    pub fn context(&self) -> &VectorClock {
        &self.stamp.clock
    }

    pub fn had_conflict(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

pub struct MasterlessNode {
    me: Weak<MasterlessNode>,
    config: ClusterConfig,
    members: Vec<NodeId>,
    store: Arc<DurableStore>,
    transport: Arc<dyn Transport>,

    /// Per-key vector clock table (tombstones included)
    clocks: Mutex<HashMap<String, Stamp>>,
    digest_cache: Mutex<Option<Arc<Digest>>>,

    rng: Mutex<StdRng>,
    running: AtomicBool,
    gossiper: Mutex<Option<(Sender<()>, JoinHandle<()>)>>,
}

impl MasterlessNode {
    /// Build a node over `store`; the clock table is rebuilt from it
    pub fn new(config: ClusterConfig, store: Arc<DurableStore>, transport: Arc<dyn Transport>) -> Result<Arc<Self>> {
        config.validate_quorum()?;

        let clocks: HashMap<String, Stamp> = store
            .entries()
            .into_iter()
            .filter_map(|(key, entry)| entry.stamp.map(|stamp| (key, stamp)))
            .collect();

        tracing::info!(
            node = config.node_id,
            keys = clocks.len(),
            n = config.replication_factor,
            w = config.write_quorum,
            r = config.read_quorum,
            "masterless node opened"
        );

        let members = config.members();
        Ok(Arc::new_cyclic(|me| Self {
            me: me.clone(),
            config,
            members,
            store,
            transport,
            clocks: Mutex::new(clocks),
            digest_cache: Mutex::new(None),
            rng: Mutex::new(StdRng::from_entropy()),
            running: AtomicBool::new(false),
            gossiper: Mutex::new(None),
        }))
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Start serving and launch the periodic gossip thread
    pub fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let (stop_tx, stop_rx): (Sender<()>, Receiver<()>) = channel::bounded(0);
        let me = self.me.clone();
        let interval = self.config.gossip_interval();
        let handle = thread::Builder::new()
            .name(format!("gossip-{}", self.config.node_id))
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    _ => break,
                }
                match me.upgrade() {
                    Some(node) => node.gossip_round(),
                    None => break,
                }
            })?;
        *self.gossiper.lock() = Some((stop_tx, handle));
        Ok(())
    }

    /// Stop serving; stops the gossip thread
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some((stop_tx, handle)) = self.gossiper.lock().take() {
            drop(stop_tx);
            let _ = handle.join();
        }
        tracing::info!(node = self.config.node_id, "masterless node stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(KvError::Shutdown)
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn id(&self) -> NodeId {
        self.config.node_id
    }

    pub fn store(&self) -> &Arc<DurableStore> {
        &self.store
    }

    /// Replicas responsible for `key`
    pub fn replicas(&self, key: &str) -> Vec<NodeId> {
        preference_list(key, &self.members, self.config.replication_factor)
    }

    /// Local version of `key`, tombstones included
    pub fn local_version(&self, key: &str) -> Option<Version> {
        self.store.get_entry(key).and_then(|entry| entry.to_version())
    }

    /// Local stamp of `key` from the clock table
    pub fn stamp_of(&self, key: &str) -> Option<Stamp> {
        self.clocks.lock().get(key).cloned()
    }

    // =========================================================================
    // Writes
    // =========================================================================

    pub fn set(&self, key: &str, value: &[u8], simulate_failure: bool) -> Result<()> {
        self.write(key, Some(value.to_vec()), None, simulate_failure)
    }

    /// Write a value that supersedes every version covered by `context`
    ///
    /// Pass the clock from a read (or from `ConflictDetected`) to resolve a
    /// conflict explicitly.
    pub fn set_with_context(&self, key: &str, value: &[u8], context: &VectorClock, simulate_failure: bool) -> Result<()> {
        self.write(key, Some(value.to_vec()), Some(context), simulate_failure)
    }

    /// Write a tombstone version
    pub fn delete(&self, key: &str, simulate_failure: bool) -> Result<()> {
        self.write(key, None, None, simulate_failure)
    }

    fn write(&self, key: &str, value: Option<Vec<u8>>, context: Option<&VectorClock>, simulate_failure: bool) -> Result<()> {
        self.ensure_running()?;
        let replicas = self.replicas(key);
        if !replicas.contains(&self.id()) {
            return self.forward_write(key, value, simulate_failure, &replicas);
        }

        let version = {
            let mut clocks = self.clocks.lock();
            let mut clock = clocks.get(key).map(|s| s.clock.clone()).unwrap_or_default();
            if let Some(context) = context {
                clock.merge(context);
            }
            clock.increment(self.id());
            let version = Version::new(value, Stamp::new(clock, self.id()));

            self.store.apply(operation_for(key, &version), simulate_failure)?;
            clocks.insert(key.to_string(), version.stamp.clone());
            self.invalidate_digest();
            version
        };

        let others: Vec<NodeId> = replicas.into_iter().filter(|&n| n != self.id()).collect();
        let mut tracker = QuorumTracker::new(self.config.write_quorum, others.len() + 1);
        tracker.record_ack();

        let requests = others
            .iter()
            .map(|&peer| {
                (
                    peer,
                    Message::Put {
                        key: key.to_string(),
                        version: version.clone(),
                    },
                )
            })
            .collect();
        let replies = fan_out(&self.transport, requests, self.config.quorum_timeout());
        self.await_quorum(&replies, &mut tracker, |_, reply| matches!(reply, Message::PutAck { .. }));

        if tracker.is_met() {
            tracing::trace!(key, acks = tracker.acks(), "write reached quorum");
            Ok(())
        } else {
            tracing::warn!(key, acks = tracker.acks(), required = tracker.required(), "write quorum not reached");
            Err(KvError::QuorumNotReached {
                acks: tracker.acks(),
                required: tracker.required(),
            })
        }
    }

    /// Hand a write to the first reachable replica of the key
    fn forward_write(&self, key: &str, value: Option<Vec<u8>>, simulate_failure: bool, replicas: &[NodeId]) -> Result<()> {
        let message = match value {
            Some(value) => Message::ClientSet {
                key: key.to_string(),
                value,
                simulate_failure,
            },
            None => Message::ClientDelete {
                key: key.to_string(),
                simulate_failure,
            },
        };
        for &replica in replicas {
            match self.transport.call(replica, message.clone(), self.config.quorum_timeout()) {
                Ok(reply) => return reply.into_ack(),
                Err(e) => tracing::debug!(key, replica, error = %e, "forwarding write failed; trying next replica"),
            }
        }
        Err(KvError::QuorumNotReached {
            acks: 0,
            required: self.config.write_quorum,
        })
    }

    /// Write every pair; each key must reach W
    ///
    /// Keys this node replicates go into one atomic local record and one
    /// `PutBatch` per peer. Other keys are forwarded one by one.
    pub fn bulk_set(&self, items: &[(String, Vec<u8>)], simulate_failure: bool) -> Result<()> {
        self.ensure_running()?;

        // Last occurrence of a key wins
        let items: BTreeMap<&str, &Vec<u8>> = items.iter().map(|(k, v)| (k.as_str(), v)).collect();

        let mut local = Vec::new();
        let mut forwarded = Vec::new();
        for (key, value) in items {
            let replicas = self.replicas(key);
            if replicas.contains(&self.id()) {
                local.push((key, value, replicas));
            } else {
                forwarded.push((key, value, replicas));
            }
        }

        if !local.is_empty() {
            self.bulk_set_local(local, simulate_failure)?;
        }
        for (key, value, replicas) in forwarded {
            self.forward_write(key, Some(value.clone()), simulate_failure, &replicas)?;
        }
        Ok(())
    }

    fn bulk_set_local(&self, items: Vec<(&str, &Vec<u8>, Vec<NodeId>)>, simulate_failure: bool) -> Result<()> {
        let versions: Vec<(String, Version, Vec<NodeId>)> = {
            let mut clocks = self.clocks.lock();
            let versions: Vec<(String, Version, Vec<NodeId>)> = items
                .into_iter()
                .map(|(key, value, replicas)| {
                    let mut clock = clocks.get(key).map(|s| s.clock.clone()).unwrap_or_default();
                    clock.increment(self.id());
                    let version = Version::new(Some(value.clone()), Stamp::new(clock, self.id()));
                    (key.to_string(), version, replicas)
                })
                .collect();

            let bulk = versions
                .iter()
                .map(|(key, version, _)| BulkItem {
                    key: key.clone(),
                    value: version.value.clone().unwrap_or_default(),
                    stamp: Some(version.stamp.clone()),
                })
                .collect();
            self.store.apply(Operation::BulkSet { items: bulk }, simulate_failure)?;
            for (key, version, _) in &versions {
                clocks.insert(key.clone(), version.stamp.clone());
            }
            self.invalidate_digest();
            versions
        };

        // One batch per peer
        let mut batches: HashMap<NodeId, Vec<(String, Version)>> = HashMap::new();
        for (key, version, replicas) in &versions {
            for &replica in replicas.iter().filter(|&&n| n != self.id()) {
                batches.entry(replica).or_default().push((key.clone(), version.clone()));
            }
        }

        let mut acks: HashMap<String, usize> = versions.iter().map(|(key, _, _)| (key.clone(), 1)).collect();
        let required = self.config.write_quorum;
        let all_met = |acks: &HashMap<String, usize>| acks.values().all(|&n| n >= required);

        // Every replica gets its batch; only the wait stops early
        let keys_by_peer: HashMap<NodeId, Vec<String>> = batches
            .iter()
            .map(|(&peer, batch)| (peer, batch.iter().map(|(k, _)| k.clone()).collect()))
            .collect();
        let requests = batches
            .into_iter()
            .map(|(peer, versions)| (peer, Message::PutBatch { versions }))
            .collect::<Vec<_>>();
        let mut pending = requests.len();
        let replies = fan_out(&self.transport, requests, self.config.quorum_timeout());
        let deadline = Instant::now() + self.config.quorum_timeout();

        while pending > 0 && !all_met(&acks) {
            let (peer, result) = match replies.recv_deadline(deadline) {
                Ok(reply) => reply,
                Err(_) => break,
            };
            pending -= 1;
            match result {
                Ok(Message::PutAck { .. }) => {
                    for key in keys_by_peer.get(&peer).into_iter().flatten() {
                        if let Some(count) = acks.get_mut(key) {
                            *count += 1;
                        }
                    }
                }
                Ok(other) => tracing::debug!(peer, kind = other.kind(), "bulk replica write rejected"),
                Err(e) => tracing::debug!(peer, error = %e, "bulk replica write failed"),
            }
        }

        let min_acks = acks.values().copied().min().unwrap_or(required);
        if min_acks >= required {
            Ok(())
        } else {
            tracing::warn!(keys = acks.len(), min_acks, required, "bulk write quorum not reached");
            Err(KvError::QuorumNotReached {
                acks: min_acks,
                required,
            })
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Quorum read with conflict resolution and read repair
    pub fn get(&self, key: &str) -> Result<ReadResult> {
        self.ensure_running()?;
        let replicas = self.replicas(key);
        let remote: Vec<NodeId> = replicas.iter().copied().filter(|&n| n != self.id()).collect();

        let mut tracker = QuorumTracker::new(self.config.read_quorum, replicas.len());
        let mut responses: Vec<(NodeId, Option<Version>)> = Vec::new();
        if remote.len() < replicas.len() {
            responses.push((self.id(), self.local_version(key)));
            tracker.record_ack();
        }

        let requests = remote
            .iter()
            .map(|&peer| (peer, Message::Get { key: key.to_string() }))
            .collect();
        let replies = fan_out(&self.transport, requests, self.config.quorum_timeout());
        self.await_quorum(&replies, &mut tracker, |peer, reply| match reply {
            Message::GetResponse { version } => {
                responses.push((peer, version));
                true
            }
            _ => false,
        });

        if !tracker.is_met() {
            tracing::warn!(key, responses = tracker.acks(), required = tracker.required(), "read quorum not reached");
            return Err(KvError::QuorumNotReached {
                acks: tracker.acks(),
                required: tracker.required(),
            });
        }

        let resolution = match resolve(responses.iter().filter_map(|(_, v)| v.clone())) {
            Some(resolution) => resolution,
            None => return Err(KvError::NotFound),
        };

        if !resolution.conflicts.is_empty() {
            tracing::warn!(key, versions = resolution.conflicts.len(), "concurrent versions on read");
            if self.config.conflict_policy == ConflictPolicy::Surface {
                return Err(KvError::ConflictDetected {
                    key: key.to_string(),
                    context: resolution.winner.stamp.clock.clone(),
                    versions: resolution.conflicts,
                });
            }
        }

        self.read_repair(key, &resolution.winner, &responses);

        match resolution.winner.value {
            Some(value) => Ok(ReadResult {
                value,
                stamp: resolution.winner.stamp,
                conflicts: resolution.conflicts,
            }),
            None => Err(KvError::NotFound),
        }
    }

    /// Push the winner to every responder that returned something else
    fn read_repair(&self, key: &str, winner: &Version, responses: &[(NodeId, Option<Version>)]) {
        let mut stale = Vec::new();
        for (node, version) in responses {
            if version.as_ref() == Some(winner) {
                continue;
            }
            if *node == self.id() {
                if let Err(e) = self.apply_replica(key, winner.clone()) {
                    tracing::warn!(key, error = %e, "local read repair failed");
                }
            } else {
                stale.push((
                    *node,
                    Message::Put {
                        key: key.to_string(),
                        version: winner.clone(),
                    },
                ));
            }
        }
        if !stale.is_empty() {
            tracing::debug!(key, replicas = stale.len(), "read repair");
            // Best effort: replies are dropped
            let _ = fan_out(&self.transport, stale, self.config.quorum_timeout());
        }
    }

    /// Collect replies until the quorum is decided or the timeout passes
    fn await_quorum(
        &self,
        replies: &Receiver<(NodeId, Result<Message>)>,
        tracker: &mut QuorumTracker,
        mut accept: impl FnMut(NodeId, Message) -> bool,
    ) {
        let deadline = Instant::now() + self.config.quorum_timeout();
        while !tracker.is_met() && !tracker.is_lost() && !tracker.is_complete() {
            match replies.recv_deadline(deadline) {
                Ok((peer, Ok(reply))) => {
                    if accept(peer, reply) {
                        tracker.record_ack();
                    } else {
                        tracker.record_failure();
                    }
                }
                Ok((peer, Err(e))) => {
                    tracing::debug!(peer, error = %e, "replica did not answer");
                    tracker.record_failure();
                }
                Err(_) => break,
            }
        }
    }

    // =========================================================================
    // Replica Side
    // =========================================================================

    /// Merge an incoming version into the local copy
    pub fn apply_replica(&self, key: &str, incoming: Version) -> Result<MergeOutcome> {
        let mut clocks = self.clocks.lock();
        let local = self.local_version(key);
        let outcome = merge_version(local.as_ref(), incoming);

        if let MergeOutcome::Replaced(version) | MergeOutcome::Resolved(version) = &outcome {
            self.store.apply(operation_for(key, version), false)?;
            clocks.insert(key.to_string(), version.stamp.clone());
            self.invalidate_digest();
            if matches!(outcome, MergeOutcome::Resolved(_)) {
                tracing::info!(
                    key,
                    winner = version.stamp.origin,
                    siblings = version.stamp.siblings.len(),
                    "kept concurrent versions as siblings"
                );
            }
        }
        Ok(outcome)
    }

    // =========================================================================
    // Anti-Entropy
    // =========================================================================

    /// Digest of every key this node holds
    pub fn digest(&self) -> Arc<Digest> {
        if let Some(digest) = self.digest_cache.lock().clone() {
            return digest;
        }
        let clocks = self.clocks.lock();
        let digest: Arc<Digest> = Arc::new(clocks.iter().map(|(k, s)| (k.clone(), s.clone())).collect());
        *self.digest_cache.lock() = Some(Arc::clone(&digest));
        digest
    }

    /// Digest restricted to keys `peer` also replicates
    fn digest_for(&self, peer: NodeId) -> Digest {
        self.digest()
            .iter()
            .filter(|(key, _)| self.replicas(key).contains(&peer))
            .map(|(k, s)| (k.clone(), s.clone()))
            .collect()
    }

    fn invalidate_digest(&self) {
        *self.digest_cache.lock() = None;
    }

    /// Gossip with one random peer
    pub fn gossip_round(&self) {
        let peer = match self.config.peers.choose(&mut *self.rng.lock()) {
            Some(&peer) => peer,
            None => return,
        };
        match self.gossip_with(peer) {
            Ok(_) => {}
            Err(e) if e.is_peer_failure() => tracing::trace!(peer, error = %e, "gossip peer unreachable"),
            Err(e) => tracing::warn!(peer, error = %e, "gossip round failed"),
        }
    }

    /// One anti-entropy exchange with `peer`
    ///
    /// Sends our digest, merges the versions the peer returns, then pushes
    /// the versions the peer asked for.
    pub fn gossip_with(&self, peer: NodeId) -> Result<GossipStats> {
        self.ensure_running()?;
        let timeout = self.config.quorum_timeout();

        let request = Message::DigestExchange {
            from: self.id(),
            digest: self.digest_for(peer),
        };
        let (versions, wanted) = match self.transport.call(peer, request, timeout)? {
            Message::DigestReply { versions, wanted } => (versions, wanted),
            Message::Error(err) => return Err(err.into()),
            other => {
                return Err(KvError::Protocol(format!(
                    "unexpected reply to digest exchange: {}",
                    other.kind()
                )))
            }
        };

        let mut stats = GossipStats::default();
        for (key, version) in versions {
            if let MergeOutcome::Replaced(_) | MergeOutcome::Resolved(_) = self.apply_replica(&key, version)? {
                stats.pulled += 1;
            }
        }

        let push: Vec<(String, Version)> = wanted
            .into_iter()
            .filter_map(|key| self.local_version(&key).map(|version| (key, version)))
            .collect();
        if !push.is_empty() {
            stats.pushed = push.len();
            match self.transport.call(peer, Message::PutBatch { versions: push }, timeout)? {
                Message::PutAck { .. } => {}
                Message::Error(err) => return Err(err.into()),
                other => {
                    return Err(KvError::Protocol(format!(
                        "unexpected reply to gossip push: {}",
                        other.kind()
                    )))
                }
            }
        }

        if stats != GossipStats::default() {
            tracing::debug!(peer, pulled = stats.pulled, pushed = stats.pushed, "gossip round");
        }
        Ok(stats)
    }

    fn handle_digest(&self, from: NodeId, remote: Digest) -> Message {
        let local = self.digest_for(from);
        let diff = diff_digests(&local, &remote);
        let versions = diff
            .send
            .into_iter()
            .filter_map(|key| self.local_version(&key).map(|version| (key, version)))
            .collect();
        Message::DigestReply {
            versions,
            wanted: diff.want,
        }
    }
}

impl MessageHandler for MasterlessNode {
    fn handle(&self, message: Message) -> Message {
        if !self.is_running() {
            return Message::error(&KvError::Shutdown);
        }
        match message {
            Message::Put { key, version } => match self.apply_replica(&key, version) {
                Ok(outcome) => Message::PutAck {
                    applied: matches!(outcome, MergeOutcome::Replaced(_) | MergeOutcome::Resolved(_)),
                },
                Err(e) => Message::error(&e),
            },
            Message::PutBatch { versions } => {
                let mut applied = false;
                for (key, version) in versions {
                    match self.apply_replica(&key, version) {
                        Ok(MergeOutcome::Replaced(_)) | Ok(MergeOutcome::Resolved(_)) => applied = true,
                        Ok(_) => {}
                        Err(e) => return Message::error(&e),
                    }
                }
                Message::PutAck { applied }
            }
            Message::Get { key } => Message::GetResponse {
                version: self.local_version(&key),
            },
            Message::DigestExchange { from, digest } => self.handle_digest(from, digest),
            Message::ClientGet { key } => match self.get(&key) {
                Ok(result) => Message::ClientValue { value: result.value },
                Err(e) => Message::error(&e),
            },
            Message::ClientSet {
                key,
                value,
                simulate_failure,
            } => ack(self.set(&key, &value, simulate_failure)),
            Message::ClientDelete { key, simulate_failure } => ack(self.delete(&key, simulate_failure)),
            Message::ClientBulkSet {
                items,
                simulate_failure,
            } => ack(self.bulk_set(&items, simulate_failure)),
            other => Message::error(&KvError::Protocol(format!(
                "masterless node cannot handle {}",
                other.kind()
            ))),
        }
    }
}

impl KvService for MasterlessNode {
    fn get(&self, key: &str) -> Result<Vec<u8>> {
        MasterlessNode::get(self, key).map(|result| result.value)
    }

    fn set(&self, key: &str, value: &[u8], simulate_failure: bool) -> Result<()> {
        MasterlessNode::set(self, key, value, simulate_failure)
    }

    fn delete(&self, key: &str, simulate_failure: bool) -> Result<()> {
        MasterlessNode::delete(self, key, simulate_failure)
    }

    fn bulk_set(&self, items: &[(String, Vec<u8>)], simulate_failure: bool) -> Result<()> {
        MasterlessNode::bulk_set(self, items, simulate_failure)
    }
}

fn ack(result: Result<()>) -> Message {
    match result {
        Ok(()) => Message::ClientAck,
        Err(e) => Message::error(&e),
    }
}

/// Store operation materializing `version` under `key`
fn operation_for(key: &str, version: &Version) -> Operation {
    let stamp = Some(version.stamp.clone());
    match &version.value {
        Some(value) => Operation::Set {
            key: key.to_string(),
            value: value.clone(),
            stamp,
        },
        None => Operation::Delete {
            key: key.to_string(),
            stamp,
        },
    }
}
