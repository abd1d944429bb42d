//! In-process counters, no exporter. A hosting front-end that wants
//! Prometheus or similar reads these through [`StoreMetrics::snapshot`] and
//! does its own exporting.

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time values read from [`StoreMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    /// Records skipped during a scan because they failed to decode.
    pub corrupt_records_skipped: u64,
    /// Times `rebalance()` has run, whether triggered by corruption or
    /// explicit maintenance.
    pub rebalances_triggered: u64,
    /// Times `perform_maintenance()` has completed.
    pub maintenance_passes: u64,
    /// Times a freed slot was handed back out by the allocator.
    pub slots_reused: u64,
    /// Times a new slot was appended past the previous high-water mark.
    pub slots_appended: u64,
}

/// Lightweight atomics tracking the store's operational counters.
#[derive(Debug, Default)]
pub struct StoreMetrics {
    corrupt_records_skipped: AtomicU64,
    rebalances_triggered: AtomicU64,
    maintenance_passes: AtomicU64,
    slots_reused: AtomicU64,
    slots_appended: AtomicU64,
}

impl StoreMetrics {
    /// Builds a fresh, zeroed set of counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_corrupt_record_skipped(&self) {
        self.corrupt_records_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rebalance(&self) {
        self.rebalances_triggered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_maintenance_pass(&self) {
        self.maintenance_passes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_slot_reused(&self) {
        self.slots_reused.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_slot_appended(&self) {
        self.slots_appended.fetch_add(1, Ordering::Relaxed);
    }

    /// Reads all counters at once.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            corrupt_records_skipped: self.corrupt_records_skipped.load(Ordering::Relaxed),
            rebalances_triggered: self.rebalances_triggered.load(Ordering::Relaxed),
            maintenance_passes: self.maintenance_passes.load(Ordering::Relaxed),
            slots_reused: self.slots_reused.load(Ordering::Relaxed),
            slots_appended: self.slots_appended.load(Ordering::Relaxed),
        }
    }
}
