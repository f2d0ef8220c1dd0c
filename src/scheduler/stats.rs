use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-stage pipeline counters. Every approval, tracking failure, dispatch
/// failure and reconciliation bumps exactly one of these.
#[derive(Debug, Default)]
pub struct PipelineStats {
    cycles: AtomicU64,
    candidates: AtomicU64,
    approved: AtomicU64,
    tracking_failures: AtomicU64,
    dispatched: AtomicU64,
    dispatch_failures: AtomicU64,
    broadcasts: AtomicU64,
    broadcast_failures: AtomicU64,
    reconciled: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSnapshot {
    pub cycles: u64,
    pub candidates: u64,
    pub approved: u64,
    pub tracking_failures: u64,
    pub dispatched: u64,
    pub dispatch_failures: u64,
    pub broadcasts: u64,
    pub broadcast_failures: u64,
    pub reconciled: u64,
}

fn bump(counter: &AtomicU64, n: u64) {
    counter.fetch_add(n, Ordering::Relaxed);
}

impl PipelineStats {
    pub fn cycle(&self, candidates: usize) {
        bump(&self.cycles, 1);
        bump(&self.candidates, candidates as u64);
    }

    pub fn approved(&self, n: usize) {
        bump(&self.approved, n as u64);
    }

    pub fn tracking_failure(&self) {
        bump(&self.tracking_failures, 1);
    }

    pub fn dispatched(&self) {
        bump(&self.dispatched, 1);
    }

    pub fn dispatch_failure(&self) {
        bump(&self.dispatch_failures, 1);
    }

    pub fn broadcast(&self) {
        bump(&self.broadcasts, 1);
    }

    pub fn broadcast_failure(&self) {
        bump(&self.broadcast_failures, 1);
    }

    pub fn reconciled(&self) {
        bump(&self.reconciled, 1);
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        PipelineSnapshot {
            cycles: get(&self.cycles),
            candidates: get(&self.candidates),
            approved: get(&self.approved),
            tracking_failures: get(&self.tracking_failures),
            dispatched: get(&self.dispatched),
            dispatch_failures: get(&self.dispatch_failures),
            broadcasts: get(&self.broadcasts),
            broadcast_failures: get(&self.broadcast_failures),
            reconciled: get(&self.reconciled),
        }
    }
}
