//! The engine instance.
//!
//! Owns the scheduler, prefetch director, velocity tracker, coverage
//! estimator, and generation counter, constructed with injected
//! dependencies and an explicit `init`/`shutdown` lifecycle. There is no
//! ambient global state; independent engines never interfere.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::info;

use crate::cache::Fetcher;
use crate::coord::ViewportRect;
use crate::coverage::{CoverageConfig, CoverageEstimator, CoverageSample, GenerationCounter};
use crate::error::{EngineError, EngineResult};
use crate::predictor::{PredictorConfig, VelocityTracker};
use crate::prefetch::{Director, PrefetchConfig, PrefetchStatsSnapshot, PrefetchTarget};
use crate::render::{RenderStateView, TileRequest, TileSink, ViewportProbe};
use crate::scheduler::{Scheduler, SchedulerConfig};
use crate::store::{plane_from_path, LevelSet, StoreClient};

/// Complete engine configuration; every recognized option in one typed
/// structure, validated at construction.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Priority scheduler options.
    pub scheduler: SchedulerConfig,
    /// Velocity predictor options.
    pub predictor: PredictorConfig,
    /// Prefetch director options.
    pub prefetch: PrefetchConfig,
    /// Coverage estimator options.
    pub coverage: CoverageConfig,
}

impl EngineConfig {
    /// Validate every section.
    pub fn validate(&self) -> EngineResult<()> {
        self.scheduler.validate()?;
        self.predictor.validate()?;
        self.prefetch.validate()?;
        self.coverage.validate()
    }
}

/// Injected collaborators.
pub struct EngineDeps {
    /// The render library's wrapped submission entry point.
    pub sink: Arc<dyn TileSink>,
    /// Read-only render state access.
    pub view: Arc<dyn RenderStateView>,
    /// Transport (normally a [`crate::cache::CachingFetcher`]).
    pub fetcher: Arc<dyn Fetcher>,
    /// Optional viewport tile-range accessor.
    pub probe: Option<Arc<dyn ViewportProbe>>,
}

/// The tile scheduling and predictive-prefetch engine.
pub struct Engine {
    levels: Arc<LevelSet>,
    scheduler: Arc<Scheduler>,
    director: Arc<Director>,
    coverage: Arc<CoverageEstimator>,
    tracker: Mutex<VelocityTracker>,
    generation: GenerationCounter,
    viewport: Mutex<Option<(ViewportRect, f64)>>,
    z_count: u32,
    z_chunk_size: u64,
}

impl Engine {
    /// Initialize an engine for the store at `base_url`.
    ///
    /// Fetches one metadata document per resolution level (the count comes
    /// from the externally loaded catalog), wires the components, and
    /// schedules the initial prefetch pass.
    pub async fn init(
        base_url: &str,
        level_count: usize,
        deps: EngineDeps,
        config: EngineConfig,
    ) -> EngineResult<Self> {
        config.validate()?;

        let client = StoreClient::new(base_url, Arc::clone(&deps.fetcher));
        let levels = Arc::new(client.load_levels(level_count).await?);
        let z_count = levels.plane_count();
        let z_chunk_size = levels
            .finest()
            .map(|l| l.z_chunk_size())
            .ok_or(EngineError::EmptyPyramid)?;

        let coverage = Arc::new(CoverageEstimator::new(
            Arc::clone(&deps.view),
            Arc::clone(&levels),
            config.coverage.clone(),
        ));

        let scheduler = Scheduler::new(
            deps.sink,
            deps.view,
            Arc::clone(&coverage),
            z_chunk_size,
            config.scheduler.clone(),
        );

        let director = Director::new(
            deps.fetcher,
            Arc::clone(&levels),
            client.base_url(),
            deps.probe,
            config.prefetch.clone(),
        );

        // After the settle window restores the idle limit, predictive
        // prefetch picks back up where it left off.
        let idle_director = Arc::clone(&director);
        scheduler.set_idle_callback(Arc::new(move || idle_director.reschedule()));

        let tracker = VelocityTracker::new(config.predictor.clone(), 0);

        let engine = Self {
            levels,
            scheduler,
            director,
            coverage,
            tracker: Mutex::new(tracker),
            generation: GenerationCounter::new(),
            viewport: Mutex::new(None),
            z_count,
            z_chunk_size,
        };

        info!(
            base_url,
            levels = engine.levels.len(),
            planes = z_count,
            "Engine initialized"
        );

        // Initial load is itself a prefetch trigger.
        let initial = engine.current_target();
        engine.director.schedule_pass(initial);

        Ok(engine)
    }

    /// The loaded level pyramid.
    pub fn levels(&self) -> &Arc<LevelSet> {
        &self.levels
    }

    /// Number of Z planes.
    pub fn plane_count(&self) -> u32 {
        self.z_count
    }

    /// Currently displayed plane.
    pub fn current_plane(&self) -> u32 {
        self.tracker.lock().current_z()
    }

    /// Smoothed Z velocity in planes/second.
    pub fn velocity(&self) -> f64 {
        self.tracker.lock().velocity()
    }

    /// Current generation (bumped on every explicit plane switch).
    pub fn generation(&self) -> u64 {
        self.generation.current()
    }

    /// Intercepted tile submission from the render library.
    pub fn submit_tile(&self, request: TileRequest) {
        let plane = request
            .plane
            .or_else(|| plane_from_path(&request.url).map(|zc| (zc * self.z_chunk_size) as u32));
        if let Some(plane) = plane {
            self.director.note_render_request(plane);
        }
        self.scheduler.submit(request);
    }

    /// A dispatched tile finished loading (successfully or not).
    pub fn on_tile_complete(&self) {
        self.scheduler.on_job_complete();
    }

    /// Explicit plane switch. Returns the new generation for tagging
    /// asynchronous completions.
    pub fn on_plane_change(&self, plane: u32) -> u64 {
        let generation = self.generation.bump();
        {
            let mut tracker = self.tracker.lock();
            tracker.record_change(plane, Instant::now());
        }
        self.scheduler.set_current_plane(plane);
        self.director.retarget(self.current_target());
        generation
    }

    /// Viewport moved or zoom changed.
    pub fn on_viewport_change(&self, viewport: ViewportRect, zoom: f64) {
        *self.viewport.lock() = Some((viewport, zoom));
        self.scheduler.set_viewport(viewport, zoom);
    }

    /// Pan/zoom/animation started.
    pub fn on_animation_start(&self, viewport: Option<ViewportRect>) {
        self.scheduler.on_animation_start(viewport);
    }

    /// Pan/zoom/animation finished.
    pub fn on_animation_finish(&self) {
        self.scheduler.on_animation_finish();
    }

    /// Deliver an asynchronous "viewport finished loading" notification
    /// tagged with the generation it was issued under.
    ///
    /// Returns `true` when the notification is current; stale notifications
    /// are discarded (and counted) so a late callback from an abandoned
    /// switch cannot mark the new switch complete.
    pub fn notify_viewport_loaded(&self, generation: u64) -> bool {
        if self.generation.is_current(generation) {
            true
        } else {
            self.director.stats().record_stale_discard();
            false
        }
    }

    /// Coverage for the current plane under the current viewport.
    pub fn current_coverage(&self) -> Option<CoverageSample> {
        let (viewport, zoom) = (*self.viewport.lock())?;
        Some(
            self.coverage
                .coverage_for_current(self.current_plane(), &viewport, zoom),
        )
    }

    /// Aggregate Z progress over the configured window.
    pub fn window_progress(&self) -> Option<f64> {
        let (viewport, zoom) = (*self.viewport.lock())?;
        Some(
            self.coverage
                .window_progress(self.current_plane(), &viewport, zoom),
        )
    }

    /// Prefetch statistics snapshot.
    pub fn prefetch_stats(&self) -> PrefetchStatsSnapshot {
        self.director.stats_snapshot()
    }

    /// Jobs waiting in the scheduler queue.
    pub fn queue_len(&self) -> usize {
        self.scheduler.queue_len()
    }

    /// Jobs dropped by queue-cap enforcement.
    pub fn dropped_jobs(&self) -> u64 {
        self.scheduler.dropped_jobs()
    }

    /// Tear the engine down: stop timers, cancel in-flight prefetches,
    /// clear session state.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
        self.director.shutdown();
        self.tracker.lock().reset();
        info!("Engine shut down");
    }

    fn current_target(&self) -> PrefetchTarget {
        let tracker = self.tracker.lock();
        PrefetchTarget {
            current_plane: tracker.current_z(),
            predicted: tracker.predict(self.z_count),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default_validates() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_config_rejects_bad_section() {
        let config = EngineConfig {
            scheduler: SchedulerConfig {
                queue_cap: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
