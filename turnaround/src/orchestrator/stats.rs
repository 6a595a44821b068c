//! Session-wide orchestration statistics.
//!
//! Counters are updated from every orchestration pass and read for
//! diagnostics without taking any lock.

use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe orchestration counters.
///
/// # Example
///
/// ```
/// use turnaround::orchestrator::OrchestratorStats;
///
/// let stats = OrchestratorStats::new();
/// stats.record_pass();
/// stats.record_dispatch(true);
/// stats.record_dispatch(false);
///
/// let snapshot = stats.snapshot();
/// assert_eq!(snapshot.failures, 1);
/// ```
#[derive(Debug, Default)]
pub struct OrchestratorStats {
    /// Orchestration passes started
    passes: AtomicU64,
    /// Coordinator calls made, including retries
    dispatches: AtomicU64,
    /// Coordinator calls that failed
    failures: AtomicU64,
    /// Failures caused by the per-call time budget
    timeouts: AtomicU64,
    /// Explicit retries
    retries: AtomicU64,
}

/// Snapshot of orchestration statistics at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorStatsSnapshot {
    pub passes: u64,
    pub dispatches: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub retries: u64,
}

impl OrchestratorStatsSnapshot {
    /// Failed share of all coordinator calls, `0.0..=1.0`.
    pub fn failure_rate(&self) -> f64 {
        if self.dispatches == 0 {
            0.0
        } else {
            self.failures as f64 / self.dispatches as f64
        }
    }
}

impl OrchestratorStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_pass(&self) {
        self.passes.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one coordinator call and whether it succeeded.
    pub fn record_dispatch(&self, ok: bool) {
        self.dispatches.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> OrchestratorStatsSnapshot {
        OrchestratorStatsSnapshot {
            passes: self.passes.load(Ordering::Relaxed),
            dispatches: self.dispatches.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }
}
