//! Primary-Secondary Replication
//!
//! One elected primary per term accepts reads and writes; secondaries
//! replicate its log.
//!
//! ## Election
//! ```text
//!             timeout                 majority of votes
//!  Follower ───────────► Candidate ───────────────────► Leader
//!     ▲                     │  ▲ timeout (term + 1)        │
//!     │   higher term /     │  └──┘                        │
//!     └── valid leader ◄────┴──────────────────────────────┘
//!                         higher term seen
//! ```
//! A node votes at most once per term (persisted in `raft.state`) and only
//! for candidates whose log is at least as up to date as its own, so at
//! most one leader exists per term.
//!
//! ## Writes
//! The leader appends a write to `raft.log`, applies it to its store, then
//! ships it with `AppendEntries`. The client is acknowledged once a
//! majority (leader included) holds the entry. Followers apply entries to
//! their store only once the leader reports them committed; the highest
//! applied index is kept in `raft.applied`, so a restarted node resumes
//! applying where it stopped.

mod log;
mod node;
mod state;

pub use log::{AppendOutcome, LogEntry, ReplicationLog};
pub use node::{NodeStatus, PrimaryNode};
pub use state::{AppliedIndex, ElectionState, HardState, Role};
