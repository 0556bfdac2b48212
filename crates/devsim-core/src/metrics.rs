use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

/// Counters for playback, polling, mutation, and batch activity.
#[derive(Debug, Default)]
pub struct SyncMetrics {
    // Playback
    pub loads: AtomicU64,
    pub load_errors: AtomicU64,
    pub stale_discards: AtomicU64,
    pub advances: AtomicU64,

    // Polling
    pub poll_ticks: AtomicU64,
    pub poll_fetches: AtomicU64,
    pub poll_errors: AtomicU64,
    pub poll_empty: AtomicU64,

    // Optimistic mutations
    pub mutations: AtomicU64,
    pub mutation_rejections: AtomicU64,
    pub reconciliations: AtomicU64,

    // Batches
    pub batch_runs: AtomicU64,
    pub batch_items: AtomicU64,
    pub batch_item_errors: AtomicU64,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_load(&self, ok: bool) {
        self.loads.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.load_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_stale_discard(&self) {
        self.stale_discards.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_advance(&self) {
        self.advances.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one completed poll tick.
    pub fn record_poll_tick(&self, fetched: u64, empty: u64, errors: u64) {
        self.poll_ticks.fetch_add(1, Ordering::Relaxed);
        self.poll_fetches.fetch_add(fetched + empty + errors, Ordering::Relaxed);
        self.poll_empty.fetch_add(empty, Ordering::Relaxed);
        self.poll_errors.fetch_add(errors, Ordering::Relaxed);
    }

    pub fn record_mutation(&self, rejected: bool) {
        self.mutations.fetch_add(1, Ordering::Relaxed);
        if rejected {
            self.mutation_rejections.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_reconciliation(&self) {
        self.reconciliations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch(&self, items: u64, errors: u64) {
        self.batch_runs.fetch_add(1, Ordering::Relaxed);
        self.batch_items.fetch_add(items, Ordering::Relaxed);
        self.batch_item_errors.fetch_add(errors, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            loads: get(&self.loads),
            load_errors: get(&self.load_errors),
            stale_discards: get(&self.stale_discards),
            advances: get(&self.advances),
            poll_ticks: get(&self.poll_ticks),
            poll_fetches: get(&self.poll_fetches),
            poll_errors: get(&self.poll_errors),
            poll_empty: get(&self.poll_empty),
            mutations: get(&self.mutations),
            mutation_rejections: get(&self.mutation_rejections),
            reconciliations: get(&self.reconciliations),
            batch_runs: get(&self.batch_runs),
            batch_items: get(&self.batch_items),
            batch_item_errors: get(&self.batch_item_errors),
        }
    }
}

/// Serializable snapshot of [`SyncMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub loads: u64,
    pub load_errors: u64,
    pub stale_discards: u64,
    pub advances: u64,
    pub poll_ticks: u64,
    pub poll_fetches: u64,
    pub poll_errors: u64,
    pub poll_empty: u64,
    pub mutations: u64,
    pub mutation_rejections: u64,
    pub reconciliations: u64,
    pub batch_runs: u64,
    pub batch_items: u64,
    pub batch_item_errors: u64,
}

/// Shared metrics handle.
pub type SharedMetrics = Arc<SyncMetrics>;

/// Create a new shared metrics instance.
pub fn create_metrics() -> SharedMetrics {
    Arc::new(SyncMetrics::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_tick_counts_every_fetch() {
        let metrics = SyncMetrics::new();
        metrics.record_poll_tick(3, 1, 2);
        metrics.record_poll_tick(1, 0, 0);
        let snap = metrics.snapshot();
        assert_eq!(snap.poll_ticks, 2);
        assert_eq!(snap.poll_fetches, 7);
        assert_eq!(snap.poll_empty, 1);
        assert_eq!(snap.poll_errors, 2);
    }

    #[test]
    fn test_snapshot_serializes() {
        let metrics = create_metrics();
        metrics.record_load(false);
        metrics.record_batch(5, 2);
        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(json["load_errors"], 1);
        assert_eq!(json["batch_item_errors"], 2);
    }
}
