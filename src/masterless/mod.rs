//! Masterless Replication
//!
//! Every node accepts reads and writes. Each key lives on N replicas; a
//! write needs W acknowledgements and a read R responses, with R + W > N.
//!
//! ## Write path
//! ```text
//!   coordinator: clock = local clock of key, increment own component
//!                store locally (ack 1) ──Put──► other replicas (acks 2..)
//!                W reached? ──yes──► Ok(stamp)
//!                           ──no───► QuorumNotReached
//! ```
//!
//! ## Read path
//! Query the replicas, wait for R, resolve by vector clock. Concurrent
//! versions are collapsed by the deterministic tie-break in `clock`, and
//! stale responders are repaired in the background.
//!
//! ## Anti-entropy
//! Each node periodically exchanges a digest (key → stamp) with one random
//! peer; both sides pull what they lack and push what the other lacks.

mod gossip;
mod node;
mod placement;
mod quorum;

pub use gossip::{diff_digests, Digest, DigestDiff, GossipStats};
pub use node::{MasterlessNode, ReadResult};
pub use placement::preference_list;
pub use quorum::QuorumTracker;
