//! Key placement
//!
//! Members sit on a ring in id order. A key's replicas are the N members
//! starting at `crc32(key) % members`, walking clockwise. Every node
//! computes the same list for the same key.

use crate::NodeId;

/// The N replicas responsible for `key`, in ring order
///
/// `members` must be sorted and free of duplicates.
pub fn preference_list(key: &str, members: &[NodeId], replication_factor: usize) -> Vec<NodeId> {
    if members.is_empty() {
        return Vec::new();
    }
    let n = replication_factor.min(members.len());
    let start = crc32fast::hash(key.as_bytes()) as usize % members.len();
    (0..n).map(|i| members[(start + i) % members.len()]).collect()
}

