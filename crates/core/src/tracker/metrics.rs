use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct TrackerMetrics {
    pub accepted_total: AtomicU64,
    pub dropped_total: AtomicU64,
    pub flushed_events_total: AtomicU64,
    pub flushes_total: AtomicU64,
    pub failed_flushes_total: AtomicU64,
    pub discarded_events_total: AtomicU64,
    pub liveness_failures_total: AtomicU64,
    pub liveness_misses_total: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrackerSnapshot {
    pub accepted: u64,
    pub dropped: u64,
    pub flushed_events: u64,
    pub flushes: u64,
    pub failed_flushes: u64,
    pub discarded_events: u64,
    pub liveness_failures: u64,
    pub liveness_misses: u64,
}

impl TrackerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_accepted(&self) {
        self.accepted_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flush(&self, events: usize) {
        self.flushes_total.fetch_add(1, Ordering::Relaxed);
        self.flushed_events_total
            .fetch_add(events as u64, Ordering::Relaxed);
    }

    pub fn record_failed_flush(&self, events: usize) {
        self.failed_flushes_total.fetch_add(1, Ordering::Relaxed);
        self.discarded_events_total
            .fetch_add(events as u64, Ordering::Relaxed);
    }

    pub fn record_liveness_failure(&self) {
        self.liveness_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_liveness_misses(&self, missed: usize) {
        self.liveness_misses_total
            .fetch_add(missed as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        TrackerSnapshot {
            accepted: self.accepted_total.load(Ordering::Relaxed),
            dropped: self.dropped_total.load(Ordering::Relaxed),
            flushed_events: self.flushed_events_total.load(Ordering::Relaxed),
            flushes: self.flushes_total.load(Ordering::Relaxed),
            failed_flushes: self.failed_flushes_total.load(Ordering::Relaxed),
            discarded_events: self.discarded_events_total.load(Ordering::Relaxed),
            liveness_failures: self.liveness_failures_total.load(Ordering::Relaxed),
            liveness_misses: self.liveness_misses_total.load(Ordering::Relaxed),
        }
    }
}
