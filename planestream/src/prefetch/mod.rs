//! Predictive prefetch director.
//!
//! Given the predicted planes, the director issues background fetches that
//! populate the transparent cache before the renderer needs them, without
//! interfering with foreground traffic: prefetch bypasses the render
//! library entirely and runs under its own global concurrency cap.
//!
//! Prefetch is best-effort. Network failures are counted and logged, never
//! raised - the affected plane simply remains unprefetched and the
//! foreground scheduler fetches it when actually needed.

mod config;
mod plan;
mod registry;
mod stats;

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

pub use config::{
    PrefetchConfig, DEFAULT_DEBOUNCE_DELAY_MS, DEFAULT_FINEST_CHUNK_CAP, DEFAULT_MAX_CONCURRENT,
    DEFAULT_VIEWPORT_MARGIN,
};
pub use plan::{enumerate_chunk_urls, select_levels};
pub use registry::InFlightRegistry;
pub use stats::{PrefetchStats, PrefetchStatsSnapshot};

use crate::cache::Fetcher;
use crate::render::ViewportProbe;
use crate::store::LevelSet;

/// What a prefetch pass should warm: the current plane's context and the
/// predictor's ordered plane list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefetchTarget {
    /// Currently displayed plane.
    pub current_plane: u32,
    /// Predicted planes, most likely first.
    pub predicted: Vec<u32>,
}

/// The prefetch director.
///
/// Exclusively owns the in-flight registry and the prefetched-plane set; no
/// other component mutates them.
pub struct Director {
    fetcher: Arc<dyn Fetcher>,
    levels: Arc<LevelSet>,
    base_url: String,
    probe: Option<Arc<dyn ViewportProbe>>,
    config: PrefetchConfig,
    registry: InFlightRegistry,
    prefetched: Mutex<HashSet<u32>>,
    stats: Arc<PrefetchStats>,
    semaphore: Arc<Semaphore>,
    /// Debounce handle: the pending pass's cancellation token.
    pending: Mutex<Option<CancellationToken>>,
    last_target: Mutex<Option<PrefetchTarget>>,
    shutdown: CancellationToken,
}

impl Director {
    /// Create a director over the given store and transport.
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        levels: Arc<LevelSet>,
        base_url: impl Into<String>,
        probe: Option<Arc<dyn ViewportProbe>>,
        config: PrefetchConfig,
    ) -> Arc<Self> {
        let max_concurrent = config.max_concurrent;
        Arc::new(Self {
            fetcher,
            levels,
            base_url: base_url.into(),
            probe,
            config,
            registry: InFlightRegistry::new(),
            prefetched: Mutex::new(HashSet::new()),
            stats: Arc::new(PrefetchStats::new()),
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            pending: Mutex::new(None),
            last_target: Mutex::new(None),
            shutdown: CancellationToken::new(),
        })
    }

    /// Shared statistics handle.
    pub fn stats(&self) -> Arc<PrefetchStats> {
        Arc::clone(&self.stats)
    }

    /// Current statistics snapshot.
    pub fn stats_snapshot(&self) -> PrefetchStatsSnapshot {
        self.stats.snapshot()
    }

    /// Number of fetches currently in flight.
    pub fn in_flight(&self) -> usize {
        self.registry.len()
    }

    /// Whether at least one chunk of `plane` was prefetched this session.
    pub fn is_plane_prefetched(&self, plane: u32) -> bool {
        self.prefetched.lock().contains(&plane)
    }

    /// Record a foreground render request for hit/miss statistics.
    ///
    /// Advisory only; issues no network traffic.
    pub fn note_render_request(&self, plane: u32) {
        if self.prefetched.lock().contains(&plane) {
            self.stats.record_plane_hit();
        } else {
            self.stats.record_plane_miss();
        }
    }

    /// Schedule a debounced prefetch pass for `target`.
    ///
    /// Every trigger cancels and replaces any previously scheduled pass, so
    /// a fast slider drag coalesces into one decision instead of one per
    /// intermediate plane.
    pub fn schedule_pass(self: &Arc<Self>, target: PrefetchTarget) {
        if self.shutdown.is_cancelled() {
            return;
        }
        *self.last_target.lock() = Some(target.clone());

        let token = self.shutdown.child_token();
        if let Some(previous) = self.pending.lock().replace(token.clone()) {
            previous.cancel();
        }

        let director = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(director.config.debounce_delay) => {
                    director.run_pass(&target);
                }
            }
        });
    }

    /// Re-run the last scheduled pass (after an idle restore).
    pub fn reschedule(self: &Arc<Self>) {
        let target = self.last_target.lock().clone();
        if let Some(target) = target {
            self.schedule_pass(target);
        }
    }

    /// React to a plane switch: immediately cancel in-flight fetches that
    /// are no longer relevant, then schedule a debounced pass for the new
    /// target.
    pub fn retarget(self: &Arc<Self>, target: PrefetchTarget) {
        let relevant = self.relevant_urls(&target);
        let cancelled = self.registry.cancel_not_in(&relevant);
        if cancelled > 0 {
            debug!(cancelled, plane = target.current_plane, "Cancelled stale prefetches");
        }
        self.schedule_pass(target);
    }

    /// Execute one prefetch pass synchronously (fetches are spawned).
    fn run_pass(self: &Arc<Self>, target: &PrefetchTarget) {
        if self.shutdown.is_cancelled() {
            return;
        }

        let level_indices = select_levels(&self.levels, self.config.finest_chunk_cap);
        let mut claimed = 0usize;

        for &plane in &target.predicted {
            for &level_index in &level_indices {
                let Some(level) = self.levels.get(level_index) else {
                    continue;
                };
                let urls = enumerate_chunk_urls(
                    &self.base_url,
                    level,
                    plane,
                    self.config.timepoint,
                    self.probe.as_deref(),
                    self.config.viewport_margin,
                );
                for url in urls {
                    // Claim-check: skip URLs another prefetch already covers.
                    let Some(token) = self.registry.claim(&url) else {
                        continue;
                    };
                    claimed += 1;
                    self.stats.record_issued();
                    self.spawn_fetch(url, plane, token);
                }
            }
        }

        trace!(
            plane = target.current_plane,
            predicted = ?target.predicted,
            levels = ?level_indices,
            claimed,
            "Prefetch pass"
        );
    }

    fn spawn_fetch(self: &Arc<Self>, url: String, plane: u32, token: CancellationToken) {
        let director = Arc::clone(self);
        tokio::spawn(async move {
            let permit = tokio::select! {
                _ = token.cancelled() => {
                    director.stats.record_aborted();
                    director.registry.release(&url);
                    return;
                }
                permit = director.semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        director.registry.release(&url);
                        return;
                    }
                },
            };
            let _permit = permit;

            tokio::select! {
                _ = token.cancelled() => {
                    director.stats.record_aborted();
                }
                result = director.fetcher.fetch(&url) => match result {
                    Ok(_) => {
                        director.stats.record_completed();
                        director.prefetched.lock().insert(plane);
                    }
                    Err(e) => {
                        // Non-fatal: the foreground path fetches this chunk
                        // normally when it is actually needed.
                        director.stats.record_errored();
                        warn!(url = %url, error = %e, "Prefetch fetch failed");
                    }
                },
            }
            director.registry.release(&url);
        });
    }

    /// URLs still relevant for a target: the current plane plus every
    /// predicted plane, across all selected levels.
    fn relevant_urls(&self, target: &PrefetchTarget) -> HashSet<String> {
        let level_indices = select_levels(&self.levels, self.config.finest_chunk_cap);
        let mut relevant = HashSet::new();

        let mut planes = Vec::with_capacity(target.predicted.len() + 1);
        planes.push(target.current_plane);
        planes.extend_from_slice(&target.predicted);

        for plane in planes {
            for &level_index in &level_indices {
                let Some(level) = self.levels.get(level_index) else {
                    continue;
                };
                relevant.extend(enumerate_chunk_urls(
                    &self.base_url,
                    level,
                    plane,
                    self.config.timepoint,
                    self.probe.as_deref(),
                    self.config.viewport_margin,
                ));
            }
        }
        relevant
    }

    /// Cancel all in-flight work and clear session state.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        if let Some(pending) = self.pending.lock().take() {
            pending.cancel();
        }
        self.registry.cancel_all();
        self.prefetched.lock().clear();
        *self.last_target.lock() = None;
    }
}
