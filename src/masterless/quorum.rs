//! Quorum bookkeeping

/// Counts acknowledgements toward a required quorum
#[derive(Debug, Clone)]
pub struct QuorumTracker {
    required: usize,
    total: usize,
    acks: usize,
    failures: usize,
}

impl QuorumTracker {
    /// `required` acks out of `total` replicas
    pub fn new(required: usize, total: usize) -> Self {
        Self {
            required,
            total,
            acks: 0,
            failures: 0,
        }
    }

    pub fn record_ack(&mut self) {
        self.acks += 1;
    }

    pub fn record_failure(&mut self) {
        self.failures += 1;
    }

    pub fn is_met(&self) -> bool {
        self.acks >= self.required
    }

    /// Too many replicas failed for the quorum to still be reachable
    pub fn is_lost(&self) -> bool {
        self.total.saturating_sub(self.failures) < self.required
    }

    /// Every replica has answered one way or the other
    pub fn is_complete(&self) -> bool {
        self.acks + self.failures >= self.total
    }

    pub fn acks(&self) -> usize {
        self.acks
    }

    pub fn required(&self) -> usize {
        self.required
    }
}

