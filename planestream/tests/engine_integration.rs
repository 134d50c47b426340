//! Cross-component engine tests against mock collaborators.
//!
//! These drive the full engine - metadata load, scheduling, prediction,
//! prefetch, coverage, staleness - with a canned store and no network.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;

use planestream::cache::{BoxFuture, CachingFetcher, FetchError, Fetcher};
use planestream::coord::{TileRange, ViewportRect};
use planestream::render::{DrawnTile, RenderStateView, TileRequest, TileSink, ViewportProbe};
use planestream::store::ResolutionLevel;
use planestream::{Engine, EngineConfig, EngineDeps};

const BASE: &str = "http://store.test/image.zarr";

/// Store double: serves metadata documents and counts chunk GETs.
#[derive(Default)]
struct FakeStore {
    chunk_calls: AtomicUsize,
    chunk_urls: Mutex<Vec<String>>,
}

impl FakeStore {
    fn chunk_count(&self) -> usize {
        self.chunk_calls.load(Ordering::Relaxed)
    }

    fn chunk_urls(&self) -> Vec<String> {
        self.chunk_urls.lock().clone()
    }
}

impl Fetcher for FakeStore {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Bytes, FetchError>> {
        // Two-level pyramid: 1024px and 512px, 256px chunks, 50 planes.
        let body = if url.ends_with("/0/.zarray") {
            r#"{"shape":[1,1,50,1024,1024],"chunks":[1,1,1,256,256],"dimension_separator":"/"}"#
                .to_string()
        } else if url.ends_with("/1/.zarray") {
            r#"{"shape":[1,1,50,512,512],"chunks":[1,1,1,256,256],"dimension_separator":"/"}"#
                .to_string()
        } else {
            self.chunk_calls.fetch_add(1, Ordering::Relaxed);
            self.chunk_urls.lock().push(url.to_string());
            String::new()
        };
        Box::pin(async move { Ok(Bytes::from(body)) })
    }
}

/// Sink double recording the deferred submissions.
#[derive(Default)]
struct FakeSink {
    submitted: Mutex<Vec<String>>,
    limit: AtomicUsize,
}

impl FakeSink {
    fn urls(&self) -> Vec<String> {
        self.submitted.lock().clone()
    }
}

impl TileSink for FakeSink {
    fn submit(&self, request: &TileRequest) {
        self.submitted.lock().push(request.url.clone());
    }

    fn set_concurrency_limit(&self, limit: usize) {
        self.limit.store(limit, Ordering::Relaxed);
    }
}

/// Render view double with an adjustable drawn list.
#[derive(Default)]
struct FakeView {
    drawn: Mutex<Vec<DrawnTile>>,
}

impl RenderStateView for FakeView {
    fn drawn_tiles(&self, _plane: u32) -> Vec<DrawnTile> {
        self.drawn.lock().clone()
    }

    fn has_tile(&self, _plane: u32, _level: usize, _row: u32, _col: u32) -> bool {
        false
    }

    fn reports_loaded(&self, _plane: u32) -> bool {
        true
    }

    fn jobs_in_flight(&self) -> usize {
        0
    }

    fn clear_plane_coverage(&self, _plane: u32) {}

    fn force_redraw(&self) {}
}

struct FixedProbe(TileRange);

impl ViewportProbe for FixedProbe {
    fn tile_range(&self, _level: &ResolutionLevel) -> Option<TileRange> {
        Some(self.0)
    }
}

struct Harness {
    engine: Engine,
    store: Arc<FakeStore>,
    sink: Arc<FakeSink>,
    view: Arc<FakeView>,
}

async fn start_engine(probe: Option<Arc<dyn ViewportProbe>>) -> Harness {
    let store = Arc::new(FakeStore::default());
    let sink = Arc::new(FakeSink::default());
    let view = Arc::new(FakeView::default());

    let engine = Engine::init(
        BASE,
        2,
        EngineDeps {
            sink: sink.clone(),
            view: view.clone(),
            fetcher: store.clone(),
            probe,
        },
        EngineConfig::default(),
    )
    .await
    .expect("engine init");

    Harness {
        engine,
        store,
        sink,
        view,
    }
}

fn chunk_request(plane: u32, row: u32, col: u32) -> TileRequest {
    TileRequest::new(
        format!("{BASE}/0/0/0/{plane}/{row}/{col}"),
        0,
        Some(plane),
        None,
    )
}

#[tokio::test(start_paused = true)]
async fn init_loads_ordered_pyramid() {
    let h = start_engine(None).await;
    assert_eq!(h.engine.levels().len(), 2);
    assert_eq!(h.engine.plane_count(), 50);
    assert_eq!(h.engine.levels().get(0).unwrap().width(), 1024);
    assert_eq!(h.engine.levels().get(1).unwrap().width(), 512);
    h.engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn plane_switch_warms_predicted_planes_full_grid() {
    // Scenario E shape: no viewport probe configured, so the director
    // enumerates the full chunk grid for each target plane/level.
    let h = start_engine(None).await;

    h.engine.on_plane_change(6);
    tokio::time::sleep(Duration::from_millis(500)).await;

    // Symmetric prediction around 6: planes 7, 5, 8, 4. Each plane warms
    // the coarsest level (2x2 = 4 chunks) and the finest (4x4 = 16).
    assert_eq!(h.store.chunk_count(), 4 * 20);

    // Full grid for plane 7 at the finest level: all 16 positions.
    let plane7_finest: Vec<_> = h
        .store
        .chunk_urls()
        .into_iter()
        .filter(|u| u.starts_with(&format!("{BASE}/0/0/0/7/")))
        .collect();
    assert_eq!(plane7_finest.len(), 16);
    h.engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn viewport_probe_restricts_prefetch() {
    let probe: Arc<dyn ViewportProbe> = Arc::new(FixedProbe(TileRange::new(0, 0, 0, 0)));
    let h = start_engine(Some(probe)).await;

    h.engine.on_plane_change(6);
    tokio::time::sleep(Duration::from_millis(500)).await;

    // Single-position range plus default margin 1 => 2x2 at the finest
    // level, clamped 2x2 at the coarsest: 8 chunks per plane, 4 planes.
    assert_eq!(h.store.chunk_count(), 4 * 8);
    h.engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn prefetched_plane_hit_issues_no_network_traffic() {
    // Scenario B: a render request for an already-warmed plane counts a
    // hit and triggers zero network requests.
    let h = start_engine(None).await;

    h.engine.on_plane_change(6); // warms planes 7, 5, 8, 4
    tokio::time::sleep(Duration::from_millis(500)).await;
    let warmed = h.store.chunk_count();
    assert!(warmed > 0);

    h.engine.submit_tile(chunk_request(7, 0, 0));

    let stats = h.engine.prefetch_stats();
    assert_eq!(stats.plane_hits, 1);
    assert_eq!(h.store.chunk_count(), warmed);
    // The request itself went to the render library's sink, deferred
    assert_eq!(h.sink.urls().len(), 1);
    h.engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn animating_limit_bounds_dispatch() {
    // Scenario C: 20 jobs during animation with the default animating
    // limit of 2 never exceed 2 concurrent dispatches.
    let h = start_engine(None).await;

    h.engine.on_animation_start(None);
    for i in 0..20 {
        h.engine.submit_tile(chunk_request(0, i / 4, i % 4));
    }
    assert_eq!(h.sink.urls().len(), 2);

    // A completion frees exactly one slot
    h.engine.on_tile_complete();
    assert_eq!(h.sink.urls().len(), 3);
    h.engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn settle_window_restores_full_capacity() {
    let h = start_engine(None).await;

    h.engine.on_animation_start(None);
    for i in 0..10 {
        h.engine.submit_tile(chunk_request(0, i / 4, i % 4));
    }
    assert_eq!(h.sink.urls().len(), 2);

    h.engine.on_animation_finish();
    tokio::time::sleep(Duration::from_millis(600)).await;

    // Idle limit (6) minus the 2 still in flight: 4 more dispatched
    assert_eq!(h.sink.urls().len(), 6);
    assert_eq!(h.sink.limit.load(Ordering::Relaxed), 6);
    h.engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn stale_generation_notification_discarded() {
    // Scenario D: two rapid switches; the first switch's async callback
    // lands after the second and must be discarded.
    let h = start_engine(None).await;

    let first = h.engine.on_plane_change(5);
    let second = h.engine.on_plane_change(6);
    assert!(second > first);

    assert!(!h.engine.notify_viewport_loaded(first));
    assert!(h.engine.notify_viewport_loaded(second));
    assert_eq!(h.engine.prefetch_stats().stale_discards, 1);
    h.engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn directed_travel_biases_prediction() {
    // Scenario A shape at the engine boundary: fast forward travel warms
    // planes ahead plus exactly one behind.
    let h = start_engine(None).await;

    // Step forward quickly: 4 planes/sec instantaneous
    h.engine.on_plane_change(10);
    for z in [11u32, 12, 13, 14] {
        tokio::time::sleep(Duration::from_millis(250)).await;
        h.engine.on_plane_change(z);
    }
    assert!(h.engine.velocity() > 1.5);

    tokio::time::sleep(Duration::from_millis(500)).await;
    let urls = h.store.chunk_urls();

    // Ahead of 14 (15, 16) warmed; one behind (13) warmed; planes outside
    // every prediction along the way never warmed
    let warmed = |plane: u32| {
        urls.iter()
            .any(|u| u.starts_with(&format!("{BASE}/1/0/0/{plane}/")))
    };
    assert!(warmed(15));
    assert!(warmed(16));
    assert!(warmed(13));
    assert!(!warmed(7));
    assert!(!warmed(20));
    h.engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn transparent_cache_serves_repeat_fetches() {
    // Warmed chunks resolve instantly for the foreground path when both
    // share one caching fetcher.
    let store = Arc::new(FakeStore::default());
    let caching: Arc<dyn Fetcher> = Arc::new(CachingFetcher::new(store.clone()));
    let sink = Arc::new(FakeSink::default());
    let view = Arc::new(FakeView::default());

    let engine = Engine::init(
        BASE,
        2,
        EngineDeps {
            sink,
            view,
            fetcher: caching.clone(),
            probe: None,
        },
        EngineConfig::default(),
    )
    .await
    .unwrap();

    engine.on_plane_change(6);
    tokio::time::sleep(Duration::from_millis(500)).await;
    let after_warm = store.chunk_count();
    assert!(after_warm > 0);

    // The renderer's own store client re-requests a warmed URL
    let url = format!("{BASE}/1/0/0/7/0/0");
    caching.fetch(&url).await.unwrap();
    assert_eq!(store.chunk_count(), after_warm, "served from cache");

    engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn coverage_reflects_drawn_state() {
    let h = start_engine(None).await;

    h.engine
        .on_viewport_change(ViewportRect::new(0.0, 0.0, 1024.0, 1024.0), 1.0);

    // Nothing drawn yet
    let sample = h.engine.current_coverage().unwrap();
    assert_eq!(sample.ratio, 0.0);

    // Half the needed-level positions drawn
    {
        let mut drawn = h.view.drawn.lock();
        for row in 0..2 {
            for col in 0..4 {
                drawn.push(DrawnTile { level: 0, row, col });
            }
        }
    }
    let sample = h.engine.current_coverage().unwrap();
    assert!((sample.ratio - 0.5).abs() < 1e-9);
    assert!(sample.ratio >= 0.0 && sample.ratio <= 1.0);
    h.engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn shutdown_is_quiescent() {
    let h = start_engine(None).await;

    h.engine.on_plane_change(6);
    h.engine.shutdown();
    let settled = h.store.chunk_count();

    // Nothing new fires after shutdown
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.store.chunk_count(), settled);
    assert_eq!(h.engine.queue_len(), 0);
}
