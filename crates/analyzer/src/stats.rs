//! Lock-free pipeline counters.
//!
//! All fields use `Ordering::Relaxed`: monotonic counters where eventual
//! visibility is fine for status reads.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Default)]
pub struct AnalyzerStats {
    /// Flow events fully processed.
    pub events_processed: AtomicU64,
    /// Events whose analysis was abandoned (store dead, queue drained at
    /// shutdown).
    pub events_dropped_analysis: AtomicU64,
    /// Graph upserts that failed after retry exhaustion.
    pub store_failures_total: AtomicU64,
    /// Alerts pushed to the ring and published.
    pub alerts_emitted: AtomicU64,
    /// Events that received a non-neutral intelligence verdict.
    pub ml_scored: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyzerStatsSnapshot {
    pub events_processed: u64,
    pub events_dropped_analysis: u64,
    pub store_failures_total: u64,
    pub alerts_emitted: u64,
    pub ml_scored: u64,
}

impl AnalyzerStats {
    pub fn snapshot(&self) -> AnalyzerStatsSnapshot {
        AnalyzerStatsSnapshot {
            events_processed: self.events_processed.load(Ordering::Relaxed),
            events_dropped_analysis: self.events_dropped_analysis.load(Ordering::Relaxed),
            store_failures_total: self.store_failures_total.load(Ordering::Relaxed),
            alerts_emitted: self.alerts_emitted.load(Ordering::Relaxed),
            ml_scored: self.ml_scored.load(Ordering::Relaxed),
        }
    }
}
