//! Flush fault injection
//!
//! The WAL writer consults a `FaultStrategy` right before it writes and
//! fsyncs a record. Production stores use `NoFaults`; tests opt into
//! `RandomFlushLoss` through `Config::fault_injection`.

use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::FaultInjection;

/// Decides whether a durability flush is silently dropped
pub trait FaultStrategy: Send + Sync {
    /// `true` means the record must not reach the disk
    fn drop_flush(&self) -> bool;
}

/// Never drops anything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFaults;

impl FaultStrategy for NoFaults {
    fn drop_flush(&self) -> bool {
        false
    }
}

/// Drops a fixed fraction of flushes
pub struct RandomFlushLoss {
    rate: f64,
    rng: Mutex<StdRng>,
}

impl RandomFlushLoss {
    /// `rate` is clamped to 0.0..=1.0; a seed makes the drop pattern reproducible
    pub fn new(rate: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rate: rate.clamp(0.0, 1.0),
            rng: Mutex::new(rng),
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }
}

impl FaultStrategy for RandomFlushLoss {
    fn drop_flush(&self) -> bool {
        self.rng.lock().gen_bool(self.rate)
    }
}

/// Build the strategy selected by the storage config
pub fn strategy_for(fault: FaultInjection) -> Arc<dyn FaultStrategy> {
    match fault {
        FaultInjection::Disabled => Arc::new(NoFaults),
        FaultInjection::DropFlushes { rate, seed } => {
            tracing::warn!(rate, "flush fault injection enabled; acknowledged writes may be lost");
            Arc::new(RandomFlushLoss::new(rate, seed))
        }
    }
}
