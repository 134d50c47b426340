//! Prefetch statistics.
//!
//! Aborted is tracked separately from errored: a growing abort count
//! indicates healthy cancellation-on-navigation, not a problem.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Atomically maintained prefetch counters.
///
/// Lock-free; shared across the director's fetch tasks via `Arc`.
#[derive(Debug, Default)]
pub struct PrefetchStats {
    issued: AtomicU64,
    completed: AtomicU64,
    errored: AtomicU64,
    aborted: AtomicU64,
    plane_hits: AtomicU64,
    plane_misses: AtomicU64,
    stale_discards: AtomicU64,
}

impl PrefetchStats {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// A prefetch fetch was issued.
    pub fn record_issued(&self) {
        self.issued.fetch_add(1, Ordering::Relaxed);
    }

    /// A prefetch fetch completed successfully.
    pub fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    /// A prefetch fetch failed with a real network error.
    pub fn record_errored(&self) {
        self.errored.fetch_add(1, Ordering::Relaxed);
    }

    /// A prefetch fetch was deliberately cancelled.
    pub fn record_aborted(&self) {
        self.aborted.fetch_add(1, Ordering::Relaxed);
    }

    /// A render request arrived for a plane that was prefetched.
    pub fn record_plane_hit(&self) {
        self.plane_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// A render request arrived for a plane that was not prefetched.
    pub fn record_plane_miss(&self) {
        self.plane_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// A stale completion notification was discarded.
    pub fn record_stale_discard(&self) {
        self.stale_discards.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot the counters.
    pub fn snapshot(&self) -> PrefetchStatsSnapshot {
        PrefetchStatsSnapshot {
            issued: self.issued.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            errored: self.errored.load(Ordering::Relaxed),
            aborted: self.aborted.load(Ordering::Relaxed),
            plane_hits: self.plane_hits.load(Ordering::Relaxed),
            plane_misses: self.plane_misses.load(Ordering::Relaxed),
            stale_discards: self.stale_discards.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`PrefetchStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrefetchStatsSnapshot {
    /// Fetches issued.
    pub issued: u64,
    /// Fetches completed successfully.
    pub completed: u64,
    /// Fetches failed with a network error.
    pub errored: u64,
    /// Fetches deliberately cancelled.
    pub aborted: u64,
    /// Render requests for prefetched planes.
    pub plane_hits: u64,
    /// Render requests for unprefetched planes.
    pub plane_misses: u64,
    /// Stale completion notifications discarded.
    pub stale_discards: u64,
}

impl PrefetchStatsSnapshot {
    /// Plane hit ratio over all observed render requests, or `None` when
    /// nothing was observed.
    pub fn hit_ratio(&self) -> Option<f64> {
        let total = self.plane_hits + self.plane_misses;
        if total == 0 {
            None
        } else {
            Some(self.plane_hits as f64 / total as f64)
        }
    }
}

impl fmt::Display for PrefetchStatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "issued {} / completed {} / errored {} / aborted {} / hits {} / misses {}",
            self.issued,
            self.completed,
            self.errored,
            self.aborted,
            self.plane_hits,
            self.plane_misses
        )
    }
}
