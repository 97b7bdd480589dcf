//! Anti-entropy digests
//!
//! A digest maps every key a node holds (tombstones included) to its
//! current stamp. Comparing two digests tells each side which versions to
//! send and which to ask for.

use std::collections::BTreeMap;

use crate::clock::{ClockOrdering, Stamp};

/// key → stamp of the local version
pub type Digest = BTreeMap<String, Stamp>;

/// What to exchange after comparing a local and a remote digest
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestDiff {
    /// Keys where the local version dominates, is missing remotely, or is concurrent
    pub send: Vec<String>,

    /// Keys where the remote version dominates, is missing locally, or is concurrent
    pub want: Vec<String>,
}

impl DigestDiff {
    pub fn is_empty(&self) -> bool {
        self.send.is_empty() && self.want.is_empty()
    }
}

/// Compare `local` against `remote`
pub fn diff_digests(local: &Digest, remote: &Digest) -> DigestDiff {
    let mut diff = DigestDiff::default();

    for (key, remote_stamp) in remote {
        match local.get(key) {
            None => diff.want.push(key.clone()),
            Some(local_stamp) => match local_stamp.clock.compare(&remote_stamp.clock) {
                ClockOrdering::After => diff.send.push(key.clone()),
                ClockOrdering::Before => diff.want.push(key.clone()),
                ClockOrdering::Concurrent => {
                    diff.send.push(key.clone());
                    diff.want.push(key.clone());
                }
                // Same clock, different sibling sets
                ClockOrdering::Equal if local_stamp != remote_stamp => {
                    diff.send.push(key.clone());
                    diff.want.push(key.clone());
                }
                ClockOrdering::Equal => {}
            },
        }
    }

    for key in local.keys() {
        if !remote.contains_key(key) {
            diff.send.push(key.clone());
        }
    }

    diff
}

/// Outcome of one gossip round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GossipStats {
    /// Versions received and merged locally
    pub pulled: usize,

    /// Versions pushed to the peer
    pub pushed: usize,
}

