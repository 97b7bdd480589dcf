//! # replikv
//!
//! A replicated key-value store with:
//! - Write-Ahead Logging (WAL) and snapshots for durability
//! - Crash recovery with idempotent replay and partial write handling
//! - Primary-secondary replication (term-based election, log replication)
//! - Masterless replication (vector clocks, N/W/R quorums, gossip)
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              TCP Server / LocalNetwork                      │
//! │               (Message → MessageHandler)                    │
//! └───────────────┬──────────────────────────┬──────────────────┘
//!                 │                          │
//!      ┌──────────▼──────────┐    ┌──────────▼──────────┐
//!      │    PrimaryNode      │    │   MasterlessNode    │
//!      │ election, log, acks │    │ clocks, quorums,    │
//!      │                     │    │ gossip              │
//!      └──────────┬──────────┘    └──────────┬──────────┘
//!                 └────────────┬─────────────┘
//!                              ▼
//!                    ┌───────────────────┐
//!                    │   DurableStore    │
//!                    │ (single writer)   │
//!                    └────┬─────────┬────┘
//!                         │         │
//!                         ▼         ▼
//!                  ┌─────────┐ ┌──────────┐   ┌──────────┐
//!                  │   WAL   │ │ MemTable │──►│ Snapshot │
//!                  │(Append) │ │ (RwLock) │   │ (Atomic) │
//!                  └─────────┘ └──────────┘   └──────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;

pub mod clock;
pub mod fault;
pub mod memtable;
pub mod service;
pub mod snapshot;
pub mod store;
pub mod wal;

pub mod masterless;
pub mod network;
pub mod primary;
pub mod protocol;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use clock::{ClockOrdering, Stamp, VectorClock, Version};
pub use config::{ClusterConfig, Config, ConflictPolicy, FaultInjection, WalSyncStrategy};
pub use error::{KvError, Result};
pub use masterless::{MasterlessNode, ReadResult};
pub use primary::{NodeStatus, PrimaryNode, Role};
pub use service::KvService;
pub use store::DurableStore;

/// Identifier of a cluster member
pub type NodeId = u64;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of replikv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
