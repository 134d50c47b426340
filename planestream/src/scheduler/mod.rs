//! Priority scheduler wrapping the render library's tile submission.
//!
//! Every intercepted tile request is queued and dispatched to the real
//! submission function in `(priority, sequence)` order, under one of two
//! concurrency limits: a small one while the view is animating and a larger
//! one at rest. Dispatch is idempotent and is re-invoked from three places:
//! job completion (the primary trigger), a short safety-net retry when a
//! pass moves nothing, and a heartbeat tick that also covers the known
//! defect class where the renderer's completion signal never arrives.
//!
//! While the queue is drained and nothing is in flight, the heartbeat
//! instead checks for a *resolution mismatch* - stale low-resolution
//! placeholder tiles that the renderer fails to supersede after certain
//! navigation sequences - and repairs it at most once per (plane, zoom)
//! pair within a cooldown window.

mod config;
mod job;
mod queue;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub use config::{
    SchedulerConfig, DEFAULT_ANIMATING_LIMIT, DEFAULT_HEARTBEAT_INTERVAL_MS, DEFAULT_IDLE_LIMIT,
    DEFAULT_QUEUE_CAP, DEFAULT_REPAIR_COOLDOWN_SECS, DEFAULT_RETRY_DELAY_MS,
    DEFAULT_SETTLE_DELAY_MS, DEFAULT_VIEWPORT_OVERLAP_THRESHOLD,
};
pub use job::{
    Priority, SchedulingContext, PRIORITY_BACKGROUND, PRIORITY_NEIGHBOR, PRIORITY_VIEWPORT,
};
pub use queue::{JobQueue, TileJob};

use crate::coord::ViewportRect;
use crate::coverage::CoverageEstimator;
use crate::render::{RenderStateView, TileRequest, TileSink};

/// Callback invoked after the idle limit is restored post-settle.
pub type IdleCallback = Arc<dyn Fn() + Send + Sync>;

/// Scale applied to zoom when keying the repair cooldown, so float jitter
/// cannot defeat the rate limit.
const REPAIR_ZOOM_QUANTUM: f64 = 100.0;

#[derive(Default)]
struct SchedState {
    queue: JobQueue,
    context: SchedulingContext,
    zoom: f64,
    in_flight: usize,
    animating: bool,
    last_viewport: Option<ViewportRect>,
    settle: Option<CancellationToken>,
    heartbeat_running: bool,
    retry_scheduled: bool,
    repair_history: HashMap<(u32, i64), Instant>,
}

/// The priority scheduler. Exclusively owns the job queue.
pub struct Scheduler {
    sink: Arc<dyn TileSink>,
    view: Arc<dyn RenderStateView>,
    coverage: Arc<CoverageEstimator>,
    config: SchedulerConfig,
    /// Z chunk extent of the finest level, for path-fallback plane
    /// recovery.
    z_chunk_size: u64,
    state: Mutex<SchedState>,
    dropped_jobs: AtomicU64,
    repairs: AtomicU64,
    idle_callback: Mutex<Option<IdleCallback>>,
    shutdown: CancellationToken,
}

impl Scheduler {
    /// Create a scheduler over the given sink and render view.
    pub fn new(
        sink: Arc<dyn TileSink>,
        view: Arc<dyn RenderStateView>,
        coverage: Arc<CoverageEstimator>,
        z_chunk_size: u64,
        config: SchedulerConfig,
    ) -> Arc<Self> {
        sink.set_concurrency_limit(config.idle_limit);
        Arc::new(Self {
            sink,
            view,
            coverage,
            config,
            z_chunk_size: z_chunk_size.max(1),
            state: Mutex::new(SchedState::default()),
            dropped_jobs: AtomicU64::new(0),
            repairs: AtomicU64::new(0),
            idle_callback: Mutex::new(None),
            shutdown: CancellationToken::new(),
        })
    }

    /// Register the callback run after the idle limit is restored.
    pub fn set_idle_callback(&self, callback: IdleCallback) {
        *self.idle_callback.lock() = Some(callback);
    }

    /// Intercept a tile submission.
    ///
    /// The request is queued at its computed priority; the real submission
    /// happens from [`pump`](Self::pump) when a slot frees up. Queue
    /// overflow drops the lowest-priority tail, never this request.
    pub fn submit(self: &Arc<Self>, request: TileRequest) {
        {
            let mut state = self.state.lock();
            let priority = state.context.classify(&request, self.z_chunk_size);
            let sequence = state.queue.enqueue(request, priority);
            let dropped = state.queue.enforce_cap(self.config.queue_cap, sequence);
            if dropped > 0 {
                self.dropped_jobs.fetch_add(dropped as u64, Ordering::Relaxed);
                debug!(dropped, cap = self.config.queue_cap, "Queue cap enforced");
            }
        }
        self.pump();
        self.ensure_heartbeat();
    }

    /// Notify the scheduler that a dispatched job finished (successfully or
    /// not), freeing a slot. This is the primary dispatch trigger.
    pub fn on_job_complete(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
        }
        self.pump();
    }

    /// Update the current plane and recompute queued priorities.
    pub fn set_current_plane(self: &Arc<Self>, plane: u32) {
        {
            let mut state = self.state.lock();
            state.context.current_plane = plane;
            Self::reprioritize_locked(&mut state, self.z_chunk_size);
        }
        self.pump();
        self.ensure_heartbeat();
    }

    /// Update the viewport and zoom and recompute queued priorities.
    pub fn set_viewport(self: &Arc<Self>, viewport: ViewportRect, zoom: f64) {
        {
            let mut state = self.state.lock();
            state.context.viewport = Some(viewport);
            state.zoom = zoom;
            Self::reprioritize_locked(&mut state, self.z_chunk_size);
        }
        self.pump();
        self.ensure_heartbeat();
    }

    /// Pan/zoom/animation started.
    ///
    /// Switches to the animating limit immediately, cancels any pending
    /// idle restore, and - when the new viewport barely overlaps the last
    /// known one - purges background-tier queue entries: directly relevant
    /// work stays, speculation for the old viewport does not.
    pub fn on_animation_start(self: &Arc<Self>, viewport: Option<ViewportRect>) {
        let mut state = self.state.lock();
        state.animating = true;
        if let Some(settle) = state.settle.take() {
            settle.cancel();
        }

        if let (Some(new), Some(last)) = (viewport, state.last_viewport) {
            let overlap = last.overlap_ratio(&new);
            if overlap < self.config.viewport_overlap_threshold {
                let purged = state.queue.retain(|j| j.priority > Priority::BACKGROUND);
                if purged > 0 {
                    debug!(purged, overlap, "Purged stale speculative jobs");
                }
            }
        }
        if let Some(new) = viewport {
            state.last_viewport = Some(new);
        }
        drop(state);

        self.sink.set_concurrency_limit(self.config.animating_limit);
    }

    /// Pan/zoom/animation finished.
    ///
    /// The idle limit is restored only after a settle window, so rapid
    /// successive interactions do not thrash the limit.
    pub fn on_animation_finish(self: &Arc<Self>) {
        let token = CancellationToken::new();
        {
            let mut state = self.state.lock();
            if let Some(previous) = state.settle.replace(token.clone()) {
                previous.cancel();
            }
        }

        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(scheduler.config.settle_delay) => {
                    {
                        let mut state = scheduler.state.lock();
                        state.animating = false;
                        state.settle = None;
                    }
                    scheduler
                        .sink
                        .set_concurrency_limit(scheduler.config.idle_limit);
                    scheduler.pump();
                    let callback = scheduler.idle_callback.lock().clone();
                    if let Some(callback) = callback {
                        callback();
                    }
                }
            }
        });
    }

    /// Dispatch as many queued jobs as free slots allow, highest priority
    /// first. Idempotent; safe to call from any trigger.
    pub fn pump(self: &Arc<Self>) {
        if self.shutdown.is_cancelled() {
            return;
        }

        let mut to_submit = Vec::new();
        {
            let mut state = self.state.lock();
            let limit = if state.animating {
                self.config.animating_limit
            } else {
                self.config.idle_limit
            };
            let available = limit.saturating_sub(state.in_flight);

            if available == 0 {
                // All slots busy with work still queued: arm the safety
                // net. The primary re-trigger remains job completion.
                if !state.queue.is_empty() && !state.retry_scheduled {
                    state.retry_scheduled = true;
                    let scheduler = Arc::clone(self);
                    tokio::spawn(async move {
                        tokio::time::sleep(scheduler.config.retry_delay).await;
                        scheduler.state.lock().retry_scheduled = false;
                        scheduler.pump();
                    });
                }
                return;
            }

            for _ in 0..available {
                match state.queue.pop() {
                    Some(job) => {
                        state.in_flight += 1;
                        to_submit.push(job);
                    }
                    None => break,
                }
            }
        }

        for job in to_submit {
            debug!(
                url = %job.request.url,
                priority = %job.priority,
                waited_ms = job.wait_time().as_millis() as u64,
                "Dispatching tile job"
            );
            self.sink.submit(&job.request);
        }
    }

    /// Start the heartbeat if it has work to watch. The tick loop stops
    /// itself the moment the queue drains with no resolution mismatch, so
    /// there is no idle background cost at rest.
    pub fn ensure_heartbeat(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            if state.heartbeat_running {
                return;
            }
            state.heartbeat_running = true;
        }

        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(scheduler.config.heartbeat_interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first interval tick completes immediately; skip it.
            tick.tick().await;

            loop {
                tokio::select! {
                    _ = scheduler.shutdown.cancelled() => break,
                    _ = tick.tick() => {
                        let has_queue = !scheduler.state.lock().queue.is_empty();
                        if has_queue {
                            // Covers completion signals that never arrived.
                            scheduler.pump();
                            continue;
                        }
                        if !scheduler.check_resolution_mismatch() {
                            break;
                        }
                    }
                }
            }
            scheduler.state.lock().heartbeat_running = false;
        });
    }

    /// Detect and repair a resolution mismatch.
    ///
    /// Returns `true` while a mismatch is being monitored (so the
    /// heartbeat stays alive through the repair cooldown).
    fn check_resolution_mismatch(&self) -> bool {
        let (plane, zoom, idle) = {
            let state = self.state.lock();
            (
                state.context.current_plane,
                state.zoom,
                state.in_flight == 0,
            )
        };

        // Jobs still in flight mean "still loading", not a mismatch.
        if !idle || self.view.jobs_in_flight() > 0 || zoom <= 0.0 {
            return false;
        }

        let needed = self.coverage.needed_level(zoom);
        let Some(finest_drawn) = self.coverage.finest_drawn_level(plane) else {
            return false;
        };
        if finest_drawn <= needed {
            return false;
        }

        let key = (plane, (zoom * REPAIR_ZOOM_QUANTUM).round() as i64);
        let now = Instant::now();
        {
            let mut state = self.state.lock();
            if let Some(last) = state.repair_history.get(&key) {
                if now.duration_since(*last) < self.config.repair_cooldown {
                    return true;
                }
            }
            state
                .repair_history
                .retain(|_, at| now.duration_since(*at) < self.config.repair_cooldown * 4);
            state.repair_history.insert(key, now);
        }

        info!(
            plane,
            zoom,
            needed_level = needed,
            drawn_level = finest_drawn,
            "Repairing stale placeholder resolution"
        );
        self.view.clear_plane_coverage(plane);
        self.view.force_redraw();
        self.repairs.fetch_add(1, Ordering::Relaxed);
        true
    }

    fn reprioritize_locked(state: &mut SchedState, z_chunk_size: u64) {
        let context = state.context.clone();
        state
            .queue
            .reprioritize(|request| context.classify(request, z_chunk_size));
    }

    /// Number of jobs currently queued.
    pub fn queue_len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Number of jobs currently dispatched and not yet completed.
    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight
    }

    /// Jobs dropped by queue-cap enforcement.
    pub fn dropped_jobs(&self) -> u64 {
        self.dropped_jobs.load(Ordering::Relaxed)
    }

    /// Resolution-mismatch repairs performed.
    pub fn repair_count(&self) -> u64 {
        self.repairs.load(Ordering::Relaxed)
    }

    /// Stop all timers and drop queued work.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        let mut state = self.state.lock();
        state.queue.clear();
        if let Some(settle) = state.settle.take() {
            settle.cancel();
        }
    }
}
