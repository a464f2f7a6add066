//! Engine counters.
//!
//! - Counters only, monotonic
//! - Reset only on process start
//! - Relaxed atomics; exact totals, no cross-counter consistency

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters shared by every engine component
#[derive(Debug, Default)]
pub struct EngineMetrics {
    queries_executed: AtomicU64,
    queries_rejected: AtomicU64,
    streams_opened: AtomicU64,
    streams_closed: AtomicU64,
    rows_streamed: AtomicU64,
    mutations_executed: AtomicU64,
    mutations_failed: AtomicU64,
    bulk_batches_committed: AtomicU64,
    bulk_batches_failed: AtomicU64,
}

/// Point-in-time copy of [`EngineMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MetricsSnapshot {
    pub queries_executed: u64,
    pub queries_rejected: u64,
    pub streams_opened: u64,
    pub streams_closed: u64,
    pub rows_streamed: u64,
    pub mutations_executed: u64,
    pub mutations_failed: u64,
    pub bulk_batches_committed: u64,
    pub bulk_batches_failed: u64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    // Reads

    pub fn increment_queries_executed(&self) {
        self.queries_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_queries_rejected(&self) {
        self.queries_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_streams_opened(&self) {
        self.streams_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_streams_closed(&self) {
        self.streams_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_rows_streamed(&self, rows: u64) {
        self.rows_streamed.fetch_add(rows, Ordering::Relaxed);
    }

    // Writes

    pub fn increment_mutations_executed(&self) {
        self.mutations_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_mutations_failed(&self) {
        self.mutations_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_batches_committed(&self) {
        self.bulk_batches_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_batches_failed(&self) {
        self.bulk_batches_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queries_executed: self.queries_executed.load(Ordering::Relaxed),
            queries_rejected: self.queries_rejected.load(Ordering::Relaxed),
            streams_opened: self.streams_opened.load(Ordering::Relaxed),
            streams_closed: self.streams_closed.load(Ordering::Relaxed),
            rows_streamed: self.rows_streamed.load(Ordering::Relaxed),
            mutations_executed: self.mutations_executed.load(Ordering::Relaxed),
            mutations_failed: self.mutations_failed.load(Ordering::Relaxed),
            bulk_batches_committed: self.bulk_batches_committed.load(Ordering::Relaxed),
            bulk_batches_failed: self.bulk_batches_failed.load(Ordering::Relaxed),
        }
    }

    /// Snapshot as a JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.snapshot()).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        assert_eq!(EngineMetrics::new().snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_increments() {
        let metrics = EngineMetrics::new();
        metrics.increment_streams_opened();
        metrics.increment_streams_closed();
        metrics.add_rows_streamed(42);
        metrics.increment_batches_failed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.streams_opened, 1);
        assert_eq!(snapshot.streams_closed, 1);
        assert_eq!(snapshot.rows_streamed, 42);
        assert_eq!(snapshot.bulk_batches_failed, 1);
        assert!(metrics.to_json().contains("\"rows_streamed\":42"));
    }
}
