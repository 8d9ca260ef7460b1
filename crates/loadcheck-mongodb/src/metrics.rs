//! Per-phase timings reported by the workers.

use std::fmt;
use std::time::Duration;

/// Measured phases of a workload cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Insert,
    CatalogInsert,
    Match,
    FindIndexed,
    FindUnindexed,
    IncrementUpdate,
    ReplaceUpdate,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Insert => write!(f, "INSERT"),
            Phase::CatalogInsert => write!(f, "CATALOG"),
            Phase::Match => write!(f, "MATCH"),
            Phase::FindIndexed | Phase::FindUnindexed => write!(f, "FIND"),
            Phase::IncrementUpdate | Phase::ReplaceUpdate => write!(f, "UPDATE"),
        }
    }
}

/// Timing of one phase of one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTiming {
    pub phase: Phase,
    /// Number of store operations issued.
    pub operations: u64,
    /// Wall-clock time of the whole phase.
    pub elapsed: Duration,
}

impl PhaseTiming {
    pub fn new(phase: Phase, operations: u64, elapsed: Duration) -> Self {
        Self {
            phase,
            operations,
            elapsed,
        }
    }

    /// Mean latency per operation.
    pub fn average(&self) -> Duration {
        if self.operations == 0 {
            return Duration::ZERO;
        }
        let nanos = self.elapsed.as_nanos() / self.operations as u128;
        Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
    }
}

/// How many times slower the unindexed lookup was than the indexed one.
///
/// Integer division of the two elapsed times; an indexed lookup that measured
/// zero is counted as one nanosecond.
pub fn speedup(indexed: Duration, unindexed: Duration) -> u128 {
    unindexed.as_nanos() / indexed.as_nanos().max(1)
}

/// Everything measured during one cycle of one worker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Zero-based cycle number.
    pub cycle: u64,
    pub timings: Vec<PhaseTiming>,
    /// Indexed/unindexed speed ratio, when the lookup phases ran.
    pub speedup: Option<u128>,
    /// Fresh document count taken after the lookup phases.
    pub document_count: Option<u64>,
}

impl CycleReport {
    pub fn new(cycle: u64) -> Self {
        Self {
            cycle,
            ..Default::default()
        }
    }

    pub fn record(&mut self, timing: PhaseTiming) {
        self.timings.push(timing);
    }

    /// Timing of `phase`, if it ran during this cycle.
    pub fn timing(&self, phase: Phase) -> Option<&PhaseTiming> {
        self.timings.iter().find(|t| t.phase == phase)
    }

    /// Total time spent in measured phases.
    pub fn total(&self) -> Duration {
        self.timings.iter().map(|t| t.elapsed).sum()
    }
}
