//! Vector clocks and causal versions
//!
//! A `VectorClock` maps replica id → counter and grows as new writers touch a
//! key. Clocks are only ever compared through the dominance rule: A dominates
//! B iff every component of A is ≥ the matching component of B and A ≠ B.
//! Missing components count as zero.
//!
//! Concurrent versions are resolved deterministically everywhere they meet
//! (replica apply, quorum read, gossip): the version written by the highest
//! origin replica id wins, and it is re-stamped with the merge of every
//! concurrent clock so the resolution dominates all of its inputs. The
//! collapsed versions travel with it as siblings, so later reads still see
//! the conflict until a write supersedes the merged clock. Two replicas
//! resolving the same set of versions end up byte-identical.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::NodeId;

/// Causal relation between two clocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockOrdering {
    Equal,
    /// self happened before other (other dominates)
    Before,
    /// self dominates other
    After,
    Concurrent,
}

/// Per-key mapping replica id → counter
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VectorClock(BTreeMap<NodeId, u64>);

impl VectorClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter for `node` (zero when absent)
    pub fn get(&self, node: NodeId) -> u64 {
        self.0.get(&node).copied().unwrap_or(0)
    }

    /// Advance `node`'s component, returning the new counter
    pub fn increment(&mut self, node: NodeId) -> u64 {
        let counter = self.0.entry(node).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Pointwise maximum with `other`
    pub fn merge(&mut self, other: &VectorClock) {
        for (&node, &counter) in &other.0 {
            let slot = self.0.entry(node).or_insert(0);
            if counter > *slot {
                *slot = counter;
            }
        }
    }

    pub fn merged(&self, other: &VectorClock) -> VectorClock {
        let mut clock = self.clone();
        clock.merge(other);
        clock
    }

    pub fn compare(&self, other: &VectorClock) -> ClockOrdering {
        let mut less = false;
        let mut greater = false;

        for node in self.0.keys().chain(other.0.keys()) {
            match self.get(*node).cmp(&other.get(*node)) {
                Ordering::Less => less = true,
                Ordering::Greater => greater = true,
                Ordering::Equal => {}
            }
            if less && greater {
                return ClockOrdering::Concurrent;
            }
        }

        match (less, greater) {
            (false, false) => ClockOrdering::Equal,
            (true, false) => ClockOrdering::Before,
            (false, true) => ClockOrdering::After,
            (true, true) => ClockOrdering::Concurrent,
        }
    }

    pub fn dominates(&self, other: &VectorClock) -> bool {
        self.compare(other) == ClockOrdering::After
    }

    pub fn is_concurrent(&self, other: &VectorClock) -> bool {
        self.compare(other) == ClockOrdering::Concurrent
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(|&c| c == 0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, u64)> + '_ {
        self.0.iter().map(|(&n, &c)| (n, c))
    }
}

impl FromIterator<(NodeId, u64)> for VectorClock {
    fn from_iter<I: IntoIterator<Item = (NodeId, u64)>>(iter: I) -> Self {
        VectorClock(iter.into_iter().collect())
    }
}

/// Causal metadata attached to a stored masterless value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stamp {
    pub clock: VectorClock,
    /// Replica that coordinated the write (tie-break key)
    pub origin: NodeId,
    /// Concurrent versions this one was resolved from, tie-break winner first
    pub siblings: Vec<Version>,
}

impl Stamp {
    pub fn new(clock: VectorClock, origin: NodeId) -> Self {
        Self {
            clock,
            origin,
            siblings: Vec::new(),
        }
    }

    pub fn has_siblings(&self) -> bool {
        !self.siblings.is_empty()
    }
}

/// A value (or tombstone) together with its stamp
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    /// `None` is a tombstone
    pub value: Option<Vec<u8>>,
    pub stamp: Stamp,
}

impl Version {
    pub fn new(value: Option<Vec<u8>>, stamp: Stamp) -> Self {
        Self { value, stamp }
    }

    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }

    pub fn clock(&self) -> &VectorClock {
        &self.stamp.clock
    }

    /// The client writes behind this version: its siblings, or itself
    pub fn into_leaves(self) -> Vec<Version> {
        if self.stamp.siblings.is_empty() {
            vec![self]
        } else {
            self.stamp.siblings
        }
    }

    /// Total order used among concurrent versions: higher origin wins, then the value bytes
    fn tie_break(&self, other: &Version) -> Ordering {
        self.stamp
            .origin
            .cmp(&other.stamp.origin)
            .then_with(|| self.value.cmp(&other.value))
    }
}

/// Outcome of resolving a set of versions for one key
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub winner: Version,
    /// Concurrent versions that were collapsed, winner first; empty when causally ordered
    pub conflicts: Vec<Version>,
}

/// Pick the version a replica set should converge on
///
/// Previously resolved inputs are expanded back into their siblings first,
/// so a conflict keeps being reported until a write dominates all of them.
/// Returns `None` for an empty input.
pub fn resolve(versions: impl IntoIterator<Item = Version>) -> Option<Resolution> {
    // Keep only maximal versions: drop anything dominated, collapse equal clocks
    let mut maximal: Vec<Version> = Vec::new();
    for candidate in versions.into_iter().flat_map(Version::into_leaves) {
        let mut keep = true;
        let mut i = 0;
        while i < maximal.len() {
            match candidate.clock().compare(maximal[i].clock()) {
                ClockOrdering::Before => {
                    keep = false;
                    break;
                }
                ClockOrdering::Equal => {
                    if candidate.tie_break(&maximal[i]) == Ordering::Greater {
                        maximal.swap_remove(i);
                        continue;
                    }
                    keep = false;
                    break;
                }
                ClockOrdering::After => {
                    maximal.swap_remove(i);
                    continue;
                }
                ClockOrdering::Concurrent => {}
            }
            i += 1;
        }
        if keep {
            maximal.push(candidate);
        }
    }

    if maximal.len() <= 1 {
        return maximal.pop().map(|winner| Resolution {
            winner,
            conflicts: Vec::new(),
        });
    }

    maximal.sort_by(|a, b| b.tie_break(a));
    let mut merged = VectorClock::new();
    for version in &maximal {
        merged.merge(version.clock());
    }
    let winner = Version::new(
        maximal[0].value.clone(),
        Stamp {
            clock: merged,
            origin: maximal[0].stamp.origin,
            siblings: maximal.clone(),
        },
    );
    Some(Resolution {
        winner,
        conflicts: maximal,
    })
}

/// What a replica should do with an incoming version
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    /// Local copy already identical
    Unchanged,
    /// Local copy dominates the incoming one
    Stale,
    /// Incoming dominates (or nothing local); store it as is
    Replaced(Version),
    /// Clocks were concurrent; store the tie-break resolution with its siblings
    Resolved(Version),
}

/// Compare an incoming version against the local one
pub fn merge_version(local: Option<&Version>, incoming: Version) -> MergeOutcome {
    let local = match local {
        Some(local) => local,
        None => return MergeOutcome::Replaced(incoming),
    };

    match incoming.clock().compare(local.clock()) {
        ClockOrdering::After => MergeOutcome::Replaced(incoming),
        ClockOrdering::Before => MergeOutcome::Stale,
        ClockOrdering::Equal if incoming == *local => MergeOutcome::Unchanged,
        ClockOrdering::Equal | ClockOrdering::Concurrent => match resolve([local.clone(), incoming]) {
            Some(resolution) if resolution.winner == *local => MergeOutcome::Unchanged,
            Some(resolution) if resolution.conflicts.is_empty() => MergeOutcome::Replaced(resolution.winner),
            Some(resolution) => MergeOutcome::Resolved(resolution.winner),
            None => MergeOutcome::Unchanged,
        },
    }
}
