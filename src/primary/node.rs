//! Primary-secondary node
//!
//! ## Threads
//! - ticker: election timeouts and heartbeats
//! - one short-lived thread per outbound RPC (votes, appends)
//! - callers: client writes block until a majority acknowledges
//!
//! All mutable state sits behind `inner`; it is never held across a network
//! call. Store applies happen under it, in log order, so `last_applied`
//! always names a prefix of the log. Writers wait on `progress_changed`, which is signalled whenever a
//! follower's match index moves or leadership changes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::log::{AppendOutcome, ReplicationLog};
use super::state::{AppliedIndex, ElectionState, HardState, Role};
use crate::config::ClusterConfig;
use crate::error::{KvError, Result};
use crate::network::{fan_out, MessageHandler, Transport};
use crate::protocol::{AppendAck, AppendEntries, Message, VoteRequest, VoteResponse};
use crate::service::KvService;
use crate::store::DurableStore;
use crate::wal::{BulkItem, Operation};
use crate::NodeId;

/// Replication log file inside the store's data directory
const LOG_FILE: &str = "raft.log";

/// Term and vote file inside the store's data directory
const STATE_FILE: &str = "raft.state";

/// Applied index file inside the store's data directory
const APPLIED_FILE: &str = "raft.applied";

/// Most entries shipped in one AppendEntries
const MAX_BATCH: usize = 256;

/// Point-in-time view of a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatus {
    pub id: NodeId,
    pub role: Role,
    pub term: u64,
    pub leader: Option<NodeId>,
    pub last_log_index: u64,
    pub commit_index: u64,
    pub last_applied: u64,
}

/// Replication progress of one follower, as seen by the leader
#[derive(Debug, Clone, Copy)]
struct Progress {
    next_index: u64,
    match_index: u64,
    /// Id of the outstanding AppendEntries, if any
    in_flight: Option<u64>,
}

struct Inner {
    election: ElectionState,
    log: ReplicationLog,
    /// Highest log index reflected in the store
    last_applied: u64,
    peers: HashMap<NodeId, Progress>,
    election_deadline: Instant,
    last_heartbeat: Instant,
    next_request_id: u64,
    rng: StdRng,
}

enum Tick {
    Heartbeat,
    Election,
}

pub struct PrimaryNode {
    me: Weak<PrimaryNode>,
    config: ClusterConfig,
    store: Arc<DurableStore>,
    transport: Arc<dyn Transport>,
    inner: Mutex<Inner>,
    progress_changed: Condvar,

    /// Serializes client writes on the leader
    write_lock: Mutex<()>,

    running: AtomicBool,
    ticker: Mutex<Option<JoinHandle<()>>>,
    state_path: PathBuf,
    applied_path: PathBuf,
}

impl PrimaryNode {
    /// Build a node over `store`; it stays passive until `start`
    ///
    /// Term, vote, replication log and applied index are recovered from the
    /// store's data directory. Entries past the applied index are applied
    /// once a leader reports them committed.
    pub fn new(config: ClusterConfig, store: Arc<DurableStore>, transport: Arc<dyn Transport>) -> Result<Arc<Self>> {
        config.validate_election()?;

        let state_path = store.data_dir().join(STATE_FILE);
        let hard = HardState::load(&state_path)?;
        let log = ReplicationLog::open(&store.data_dir().join(LOG_FILE))?;
        let applied_path = store.data_dir().join(APPLIED_FILE);
        let last_applied = AppliedIndex::load(&applied_path)?.0.min(log.last_index());

        let mut rng = StdRng::from_entropy();
        let now = Instant::now();
        let election_deadline = now + random_timeout(&config, &mut rng);
        let peers = config
            .peers
            .iter()
            .map(|&peer| {
                (
                    peer,
                    Progress {
                        next_index: log.last_index() + 1,
                        match_index: 0,
                        in_flight: None,
                    },
                )
            })
            .collect();

        tracing::info!(
            node = config.node_id,
            term = hard.term,
            last_log_index = log.last_index(),
            last_applied,
            "primary-secondary node opened"
        );

        let inner = Inner {
            election: ElectionState::new(config.node_id, hard),
            log,
            last_applied,
            peers,
            election_deadline,
            last_heartbeat: now,
            next_request_id: 0,
            rng,
        };

        Ok(Arc::new_cyclic(|me| Self {
            me: me.clone(),
            config,
            store,
            transport,
            inner: Mutex::new(inner),
            progress_changed: Condvar::new(),
            write_lock: Mutex::new(()),
            running: AtomicBool::new(false),
            ticker: Mutex::new(None),
            state_path,
            applied_path,
        }))
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Start the election/heartbeat ticker
    pub fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        {
            let mut inner = self.inner.lock();
            let timeout = random_timeout(&self.config, &mut inner.rng);
            inner.election_deadline = Instant::now() + timeout;
        }

        let me = self.me.clone();
        let period = Duration::from_millis((self.config.heartbeat_interval_ms / 3).max(1));
        let handle = thread::Builder::new()
            .name(format!("primary-{}", self.config.node_id))
            .spawn(move || loop {
                thread::sleep(period);
                let node = match me.upgrade() {
                    Some(node) => node,
                    None => break,
                };
                if !node.running.load(Ordering::Acquire) {
                    break;
                }
                node.tick();
            })?;
        *self.ticker.lock() = Some(handle);
        Ok(())
    }

    /// Stop participating: step down, stop the ticker, reject messages
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        {
            let mut inner = self.inner.lock();
            inner.election.step_down();
            self.progress_changed.notify_all();
        }
        if let Some(handle) = self.ticker.lock().take() {
            let _ = handle.join();
        }
        tracing::info!(node = self.config.node_id, "primary-secondary node stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn id(&self) -> NodeId {
        self.config.node_id
    }

    pub fn status(&self) -> NodeStatus {
        let inner = self.inner.lock();
        NodeStatus {
            id: self.config.node_id,
            role: inner.election.role(),
            term: inner.election.term(),
            leader: inner.election.leader(),
            last_log_index: inner.log.last_index(),
            commit_index: inner.log.commit_index(),
            last_applied: inner.last_applied,
        }
    }

    pub fn is_leader(&self) -> bool {
        self.inner.lock().election.is_leader()
    }

    pub fn term(&self) -> u64 {
        self.inner.lock().election.term()
    }

    /// Known leader of the current term
    pub fn leader(&self) -> Option<NodeId> {
        self.inner.lock().election.leader()
    }

    pub fn store(&self) -> &Arc<DurableStore> {
        &self.store
    }

    // =========================================================================
    // Client Operations
    // =========================================================================

    /// Read from the leader's store
    pub fn get(&self, key: &str) -> Result<Vec<u8>> {
        {
            let inner = self.inner.lock();
            self.ensure_leader(&inner)?;
        }
        self.store.get(key)
    }

    pub fn set(&self, key: &str, value: &[u8], simulate_failure: bool) -> Result<()> {
        self.replicate(Operation::set(key, value), simulate_failure)
    }

    pub fn delete(&self, key: &str, simulate_failure: bool) -> Result<()> {
        self.replicate(Operation::delete(key), simulate_failure)
    }

    /// Replicated as one log entry, so every follower applies it atomically
    pub fn bulk_set(&self, items: &[(String, Vec<u8>)], simulate_failure: bool) -> Result<()> {
        if items.is_empty() {
            let inner = self.inner.lock();
            return self.ensure_leader(&inner);
        }
        let items = items
            .iter()
            .map(|(key, value)| BulkItem {
                key: key.clone(),
                value: value.clone(),
                stamp: None,
            })
            .collect();
        self.replicate(Operation::BulkSet { items }, simulate_failure)
    }

    /// Log, apply locally, ship, and wait for a majority
    ///
    /// On timeout the entry stays in the log and the store, and keeps
    /// replicating; the caller gets `QuorumNotReached`.
    fn replicate(&self, operation: Operation, simulate_failure: bool) -> Result<()> {
        let _write = self.write_lock.lock();

        let (term, index) = {
            let mut inner = self.inner.lock();
            self.ensure_leader(&inner)?;
            let term = inner.election.term();
            let index = inner.log.append(term, operation)?;
            if let Err(e) = self.apply_through(&mut inner, index, simulate_failure.then_some(index)) {
                tracing::error!(index, error = %e, "failed to apply write; dropping it from the log");
                if let Err(e) = inner.log.truncate_from(index) {
                    tracing::error!(index, error = %e, "failed to drop unapplied entry");
                }
                return Err(e);
            }
            self.advance_commit(&mut inner);
            (term, index)
        };

        self.broadcast_append();

        let majority = self.config.majority();
        let deadline = Instant::now() + self.config.replication_timeout();
        let mut inner = self.inner.lock();
        loop {
            if inner.election.term() != term || !inner.election.is_leader() {
                return Err(KvError::NotLeader {
                    leader: inner.election.leader(),
                });
            }
            let acks = acks_for(&inner, index);
            if acks >= majority {
                tracing::debug!(index, term, acks, "write committed");
                return Ok(());
            }
            if self.progress_changed.wait_until(&mut inner, deadline).timed_out() {
                let acks = acks_for(&inner, index);
                if acks >= majority && inner.election.is_leader() {
                    return Ok(());
                }
                tracing::warn!(index, term, acks, required = majority, "write not acknowledged by a majority");
                return Err(KvError::QuorumNotReached {
                    acks,
                    required: majority,
                });
            }
        }
    }

    /// Apply log entries after `last_applied` up to `through`, in order
    ///
    /// `simulate_at` names the one entry whose flush is fault-injected.
    fn apply_through(&self, inner: &mut Inner, through: u64, simulate_at: Option<u64>) -> Result<()> {
        let through = through.min(inner.log.last_index());
        if through <= inner.last_applied {
            return Ok(());
        }
        let from = inner.last_applied + 1;
        for index in from..=through {
            let operation = match inner.log.entry(index) {
                Some(entry) => entry.operation.clone(),
                None => break,
            };
            self.store.apply(operation, simulate_at == Some(index))?;
            inner.last_applied = index;
        }
        tracing::trace!(from, through = inner.last_applied, "applied log entries");
        AppliedIndex(inner.last_applied).save(&self.applied_path)
    }

    fn ensure_leader(&self, inner: &Inner) -> Result<()> {
        if !self.is_running() {
            return Err(KvError::Shutdown);
        }
        if !inner.election.is_leader() {
            return Err(KvError::NotLeader {
                leader: inner.election.leader(),
            });
        }
        Ok(())
    }

    // =========================================================================
    // Timers
    // =========================================================================

    fn tick(&self) {
        let now = Instant::now();
        let action = {
            let inner = self.inner.lock();
            match inner.election.role() {
                Role::Leader => (now >= inner.last_heartbeat + self.config.heartbeat_interval()).then_some(Tick::Heartbeat),
                Role::Follower | Role::Candidate => (now >= inner.election_deadline).then_some(Tick::Election),
            }
        };
        match action {
            Some(Tick::Heartbeat) => self.broadcast_append(),
            Some(Tick::Election) => self.run_election(),
            None => {}
        }
    }

    fn vote_timeout(&self) -> Duration {
        Duration::from_millis(self.config.election_timeout_min_ms)
    }

    // =========================================================================
    // Election
    // =========================================================================

    fn run_election(&self) {
        let request = {
            let mut inner = self.inner.lock();
            let term = inner.election.start_election();
            let timeout = random_timeout(&self.config, &mut inner.rng);
            inner.election_deadline = Instant::now() + timeout;
            if let Err(e) = self.persist(&mut inner) {
                tracing::error!(error = %e, "failed to persist candidacy; abandoning election");
                inner.election.step_down();
                return;
            }

            if self.config.peers.is_empty() {
                inner.election.become_leader();
                self.on_become_leader(&mut inner);
                return;
            }

            VoteRequest {
                term,
                candidate_id: self.config.node_id,
                last_log_index: inner.log.last_index(),
                last_log_term: inner.log.last_term(),
            }
        };

        tracing::info!(node = self.config.node_id, term = request.term, "starting election");

        let requests = self
            .config
            .peers
            .iter()
            .map(|&peer| (peer, Message::VoteRequest(request.clone())))
            .collect();
        let responses = fan_out(&self.transport, requests, self.vote_timeout());
        let deadline = Instant::now() + self.vote_timeout();
        let majority = self.config.majority();

        for _ in 0..self.config.peers.len() {
            let (peer, result) = match responses.recv_deadline(deadline) {
                Ok(response) => response,
                Err(_) => break,
            };
            let response = match result {
                Ok(Message::VoteResponse(response)) => response,
                Ok(other) => {
                    tracing::warn!(peer, kind = other.kind(), "unexpected reply to vote request");
                    continue;
                }
                Err(e) => {
                    tracing::debug!(peer, error = %e, "vote request failed");
                    continue;
                }
            };

            let mut inner = self.inner.lock();
            if inner.election.observe_term(response.term) {
                if let Err(e) = self.persist(&mut inner) {
                    tracing::error!(error = %e, "failed to persist term");
                }
                tracing::info!(term = response.term, "stepping down: peer has a higher term");
                return;
            }
            if inner.election.term() != request.term || inner.election.role() != Role::Candidate {
                return;
            }
            if inner
                .election
                .record_vote(peer, response.term, response.vote_granted, majority)
            {
                self.on_become_leader(&mut inner);
                drop(inner);
                self.broadcast_append();
                return;
            }
        }

        tracing::debug!(term = request.term, "election did not reach a majority");
    }

    fn on_become_leader(&self, inner: &mut Inner) {
        let next_index = inner.log.last_index() + 1;
        for progress in inner.peers.values_mut() {
            progress.next_index = next_index;
            progress.match_index = 0;
            progress.in_flight = None;
        }
        inner.last_heartbeat = Instant::now();
        self.advance_commit(inner);

        // Reads are served from the store, so it must reflect the whole log
        let last_index = inner.log.last_index();
        if let Err(e) = self.apply_through(inner, last_index, None) {
            tracing::error!(applied = inner.last_applied, error = %e, "failed to apply log on election");
        }
        tracing::info!(node = self.config.node_id, term = inner.election.term(), "became leader");
    }

    fn persist(&self, inner: &mut Inner) -> Result<()> {
        if let Some(hard) = inner.election.unpersisted() {
            hard.save(&self.state_path)?;
            inner.election.mark_persisted(hard);
        }
        Ok(())
    }

    // =========================================================================
    // Log Replication (leader side)
    // =========================================================================

    /// Send AppendEntries to every follower without a request outstanding
    fn broadcast_append(&self) {
        let requests: Vec<(NodeId, AppendEntries, u64)> = {
            let mut inner = self.inner.lock();
            if !inner.election.is_leader() {
                return;
            }
            inner.last_heartbeat = Instant::now();
            self.config
                .peers
                .iter()
                .filter_map(|&peer| self.prepare_append(&mut inner, peer).map(|(req, id)| (peer, req, id)))
                .collect()
        };
        for (peer, request, request_id) in requests {
            self.send_append(peer, request, request_id);
        }
    }

    fn prepare_append(&self, inner: &mut Inner, peer: NodeId) -> Option<(AppendEntries, u64)> {
        let request_id = inner.next_request_id;
        let term = inner.election.term();
        let progress = inner.peers.get_mut(&peer)?;
        if progress.in_flight.is_some() {
            return None;
        }
        progress.in_flight = Some(request_id);
        let next_index = progress.next_index;
        inner.next_request_id += 1;

        let prev_log_index = next_index - 1;
        let request = AppendEntries {
            term,
            leader_id: self.config.node_id,
            prev_log_index,
            prev_log_term: inner.log.term_at(prev_log_index).unwrap_or(0),
            entries: inner.log.entries_from(next_index, MAX_BATCH),
            leader_commit: inner.log.commit_index(),
        };
        Some((request, request_id))
    }

    fn send_append(&self, peer: NodeId, request: AppendEntries, request_id: u64) {
        let node = match self.me.upgrade() {
            Some(node) => node,
            None => return,
        };
        thread::spawn(move || {
            let term = request.term;
            let sent_match = request.prev_log_index + request.entries.len() as u64;
            let result = node
                .transport
                .call(peer, Message::AppendEntries(request), node.config.replication_timeout());
            if let Some((next, next_id)) = node.on_append_result(peer, request_id, term, sent_match, result) {
                node.send_append(peer, next, next_id);
            }
        });
    }

    /// Fold a follower's reply into its progress; returns a follow-up request
    /// when the follower is still behind
    fn on_append_result(
        &self,
        peer: NodeId,
        request_id: u64,
        term: u64,
        sent_match: u64,
        result: Result<Message>,
    ) -> Option<(AppendEntries, u64)> {
        let mut inner = self.inner.lock();
        if let Some(progress) = inner.peers.get_mut(&peer) {
            if progress.in_flight == Some(request_id) {
                progress.in_flight = None;
            }
        }

        let ack = match result {
            Ok(Message::AppendAck(ack)) => ack,
            Ok(Message::Error(err)) => {
                tracing::debug!(peer, error = ?err, "follower rejected append");
                return None;
            }
            Ok(other) => {
                tracing::warn!(peer, kind = other.kind(), "unexpected reply to append");
                return None;
            }
            Err(e) => {
                tracing::trace!(peer, error = %e, "append failed");
                return None;
            }
        };

        if inner.election.observe_term(ack.term) {
            if let Err(e) = self.persist(&mut inner) {
                tracing::error!(error = %e, "failed to persist term");
            }
            tracing::info!(peer, term = ack.term, "stepping down: follower has a higher term");
            self.progress_changed.notify_all();
            return None;
        }
        if !inner.election.is_leader() || inner.election.term() != term || !self.is_running() {
            return None;
        }

        let last_index = inner.log.last_index();
        let progress = inner.peers.get_mut(&peer)?;
        if ack.success {
            progress.match_index = progress.match_index.max(sent_match);
            progress.next_index = progress.match_index + 1;
        } else {
            let hinted = ack.last_log_index + 1;
            progress.next_index = progress.next_index.saturating_sub(1).min(hinted).max(1);
            tracing::debug!(peer, next_index = progress.next_index, "follower log diverged; backing off");
        }
        let behind = !ack.success || progress.next_index <= last_index;

        self.advance_commit(&mut inner);
        self.progress_changed.notify_all();

        if behind {
            self.prepare_append(&mut inner, peer)
        } else {
            None
        }
    }

    /// Commit the highest index held by a majority in the current term
    fn advance_commit(&self, inner: &mut Inner) {
        let mut matched: Vec<u64> = inner.peers.values().map(|p| p.match_index).collect();
        matched.push(inner.log.last_index());
        matched.sort_unstable_by(|a, b| b.cmp(a));

        let candidate = matched[self.config.majority() - 1];
        if candidate > inner.log.commit_index() && inner.log.term_at(candidate) == Some(inner.election.term()) {
            inner.log.advance_commit(candidate);
        }
    }

    // =========================================================================
    // Inbound RPCs (follower side)
    // =========================================================================

    fn handle_vote(&self, request: VoteRequest) -> Message {
        let mut inner = self.inner.lock();
        let was_leader = inner.election.is_leader();
        let (last_index, last_term) = (inner.log.last_index(), inner.log.last_term());

        let granted = inner.election.grant_vote(&request, last_index, last_term);
        if granted {
            let timeout = random_timeout(&self.config, &mut inner.rng);
            inner.election_deadline = Instant::now() + timeout;
        }
        if let Err(e) = self.persist(&mut inner) {
            tracing::error!(error = %e, "failed to persist vote");
            return Message::error(&e);
        }
        if was_leader && !inner.election.is_leader() {
            tracing::info!(term = inner.election.term(), "stepping down: newer election");
            self.progress_changed.notify_all();
        }

        tracing::debug!(candidate = request.candidate_id, term = request.term, granted, "vote request");
        Message::VoteResponse(VoteResponse {
            term: inner.election.term(),
            vote_granted: granted,
        })
    }

    fn handle_append(&self, request: AppendEntries) -> Message {
        let mut inner = self.inner.lock();
        let was_leader = inner.election.is_leader();

        if !inner.election.accept_leader(request.term, request.leader_id) {
            return Message::AppendAck(AppendAck {
                term: inner.election.term(),
                success: false,
                last_log_index: inner.log.last_index(),
            });
        }
        if let Err(e) = self.persist(&mut inner) {
            tracing::error!(error = %e, "failed to persist term");
            return Message::error(&e);
        }
        if was_leader {
            tracing::info!(leader = request.leader_id, term = request.term, "stepping down: another leader");
            self.progress_changed.notify_all();
        }
        let timeout = random_timeout(&self.config, &mut inner.rng);
        inner.election_deadline = Instant::now() + timeout;

        let term = inner.election.term();
        let prev = request.prev_log_index;
        let match_index = prev + request.entries.len() as u64;

        match inner.log.append_entries(prev, request.prev_log_term, request.entries) {
            Ok(AppendOutcome::Mismatch) => Message::AppendAck(AppendAck {
                term,
                success: false,
                last_log_index: inner.log.last_index().min(prev.saturating_sub(1)),
            }),
            Ok(AppendOutcome::Appended(entries)) => {
                if let Some(first) = entries.first() {
                    tracing::trace!(count = entries.len(), last = match_index, "accepted replicated entries");
                    if first.index <= inner.last_applied {
                        // Only a former leader applies ahead of commit
                        tracing::warn!(
                            from = first.index,
                            applied = inner.last_applied,
                            "replaced log entries that were already applied"
                        );
                        inner.last_applied = first.index - 1;
                        if let Err(e) = AppliedIndex(inner.last_applied).save(&self.applied_path) {
                            tracing::error!(error = %e, "failed to persist applied index");
                        }
                    }
                }
                inner.log.advance_commit(request.leader_commit.min(match_index));
                let commit_index = inner.log.commit_index();
                if let Err(e) = self.apply_through(&mut inner, commit_index, None) {
                    // Entries stay logged; the next append retries them
                    tracing::error!(commit_index, error = %e, "failed to apply committed entries");
                }
                Message::AppendAck(AppendAck {
                    term,
                    success: true,
                    last_log_index: match_index,
                })
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to append replicated entries");
                Message::error(&e)
            }
        }
    }
}

impl MessageHandler for PrimaryNode {
    fn handle(&self, message: Message) -> Message {
        if !self.is_running() {
            return Message::error(&KvError::Shutdown);
        }
        match message {
            Message::VoteRequest(request) => self.handle_vote(request),
            Message::AppendEntries(request) => self.handle_append(request),
            Message::ClientGet { key } => match self.get(&key) {
                Ok(value) => Message::ClientValue { value },
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
                "primary-secondary node cannot handle {}",
                other.kind()
            ))),
        }
    }
}

impl KvService for PrimaryNode {
    fn get(&self, key: &str) -> Result<Vec<u8>> {
        PrimaryNode::get(self, key)
    }

    fn set(&self, key: &str, value: &[u8], simulate_failure: bool) -> Result<()> {
        PrimaryNode::set(self, key, value, simulate_failure)
    }

    fn delete(&self, key: &str, simulate_failure: bool) -> Result<()> {
        PrimaryNode::delete(self, key, simulate_failure)
    }

    fn bulk_set(&self, items: &[(String, Vec<u8>)], simulate_failure: bool) -> Result<()> {
        PrimaryNode::bulk_set(self, items, simulate_failure)
    }
}

fn ack(result: Result<()>) -> Message {
    match result {
        Ok(()) => Message::ClientAck,
        Err(e) => Message::error(&e),
    }
}

/// Replicas holding `index`, leader included
fn acks_for(inner: &Inner, index: u64) -> usize {
    1 + inner.peers.values().filter(|p| p.match_index >= index).count()
}

fn random_timeout(config: &ClusterConfig, rng: &mut StdRng) -> Duration {
    Duration::from_millis(rng.gen_range(config.election_timeout_range()))
}
