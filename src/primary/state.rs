//! Election state machine
//!
//! Pure term/vote/role bookkeeping; timers and I/O live in the node.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{KvError, Result};
use crate::protocol::VoteRequest;
use crate::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Follower,
    Candidate,
    Leader,
}

/// State that must survive a restart
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardState {
    pub term: u64,
    pub voted_for: Option<NodeId>,
}

impl HardState {
    /// Load from `path`; a missing file is a fresh node
    pub fn load(path: &Path) -> Result<Self> {
        read_checked(path)
    }

    /// Write to `path` via a temporary file and rename
    pub fn save(&self, path: &Path) -> Result<()> {
        write_checked(path, self)
    }
}

/// Highest replication log index applied to the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedIndex(pub u64);

impl AppliedIndex {
    pub fn load(path: &Path) -> Result<Self> {
        read_checked(path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_checked(path, self)
    }
}

/// CRC-prefixed bincode file; a missing file yields the default
fn read_checked<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let bytes = fs::read(path)?;
    if bytes.len() < 4 {
        return Err(KvError::WalCorruption(format!("{} is truncated", path.display())));
    }
    let (crc_bytes, body) = bytes.split_at(4);
    let expected = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
    if crc32fast::hash(body) != expected {
        return Err(KvError::WalCorruption(format!("{} failed its checksum", path.display())));
    }
    Ok(bincode::deserialize(body)?)
}

fn write_checked<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let body = bincode::serialize(value)?;
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(&crc32fast::hash(&body).to_le_bytes())?;
        file.write_all(&body)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Term, vote and role of one node
#[derive(Debug)]
pub struct ElectionState {
    id: NodeId,
    role: Role,
    term: u64,
    voted_for: Option<NodeId>,
    leader: Option<NodeId>,
    votes: BTreeSet<NodeId>,
    persisted: HardState,
}

impl ElectionState {
    /// Every node starts as a follower
    pub fn new(id: NodeId, hard: HardState) -> Self {
        Self {
            id,
            role: Role::Follower,
            term: hard.term,
            voted_for: hard.voted_for,
            leader: None,
            votes: BTreeSet::new(),
            persisted: hard,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn term(&self) -> u64 {
        self.term
    }

    pub fn voted_for(&self) -> Option<NodeId> {
        self.voted_for
    }

    /// Last known leader of the current term
    pub fn leader(&self) -> Option<NodeId> {
        self.leader
    }

    pub fn is_leader(&self) -> bool {
        self.role == Role::Leader
    }

    /// Adopt a higher term and step down; returns whether anything changed
    pub fn observe_term(&mut self, term: u64) -> bool {
        if term <= self.term {
            return false;
        }
        self.term = term;
        self.voted_for = None;
        self.leader = None;
        self.votes.clear();
        self.role = Role::Follower;
        true
    }

    /// Become a candidate for the next term, voting for ourselves
    pub fn start_election(&mut self) -> u64 {
        self.term += 1;
        self.role = Role::Candidate;
        self.voted_for = Some(self.id);
        self.leader = None;
        self.votes.clear();
        self.votes.insert(self.id);
        self.term
    }

    /// Count a vote reply; returns `true` when it makes us leader
    pub fn record_vote(&mut self, from: NodeId, term: u64, granted: bool, majority: usize) -> bool {
        if self.role != Role::Candidate || term != self.term || !granted {
            return false;
        }
        self.votes.insert(from);
        if self.votes.len() >= majority {
            self.become_leader();
            return true;
        }
        false
    }

    /// Drop to follower without changing the term
    pub fn step_down(&mut self) {
        self.role = Role::Follower;
        self.votes.clear();
        if self.leader == Some(self.id) {
            self.leader = None;
        }
    }

    /// Single-node clusters win without asking anyone
    pub fn become_leader(&mut self) {
        self.role = Role::Leader;
        self.leader = Some(self.id);
    }

    /// Decide a vote request against our log position
    pub fn grant_vote(&mut self, request: &VoteRequest, last_log_index: u64, last_log_term: u64) -> bool {
        self.observe_term(request.term);
        if request.term < self.term {
            return false;
        }
        if let Some(voted) = self.voted_for {
            if voted != request.candidate_id {
                return false;
            }
        }
        let up_to_date = (request.last_log_term, request.last_log_index) >= (last_log_term, last_log_index);
        if !up_to_date {
            return false;
        }
        self.voted_for = Some(request.candidate_id);
        true
    }

    /// Accept `leader` for `term`; `false` if the term is stale
    pub fn accept_leader(&mut self, term: u64, leader: NodeId) -> bool {
        if term < self.term {
            return false;
        }
        self.observe_term(term);
        if self.role != Role::Follower {
            self.role = Role::Follower;
            self.votes.clear();
        }
        self.leader = Some(leader);
        true
    }

    pub fn hard_state(&self) -> HardState {
        HardState {
            term: self.term,
            voted_for: self.voted_for,
        }
    }

    /// Hard state that differs from what was last persisted
    ///
    /// Must be saved (then `mark_persisted`) before replying to any peer.
    pub fn unpersisted(&self) -> Option<HardState> {
        let current = self.hard_state();
        (current != self.persisted).then_some(current)
    }

    pub fn mark_persisted(&mut self, hard: HardState) {
        self.persisted = hard;
    }
}
