//! Prefetch pass planning: level selection and chunk enumeration.

use crate::render::ViewportProbe;
use crate::store::{chunk_url, LevelSet, ResolutionLevel};

/// Pick the resolution levels worth prefetching.
///
/// Always the coarsest (cheapest, fastest to arrive, improves perceived
/// responsiveness first); a mid-pyramid level when three or more levels
/// exist; the finest only when its per-plane chunk count stays under
/// `finest_chunk_cap` - full resolution is only worth fetching eagerly when
/// it is cheap.
pub fn select_levels(levels: &LevelSet, finest_chunk_cap: u64) -> Vec<usize> {
    let count = levels.len();
    if count == 0 {
        return Vec::new();
    }

    let mut selected = vec![count - 1];

    if count >= 3 {
        let mid = count / 2;
        if !selected.contains(&mid) {
            selected.push(mid);
        }
    }

    if let Some(finest) = levels.finest() {
        if finest.chunks_per_plane() <= finest_chunk_cap && !selected.contains(&0) {
            selected.push(0);
        }
    }

    selected
}

/// Enumerate chunk URLs for one plane at one level.
///
/// When a viewport probe is available the enumeration is restricted to the
/// viewport tile range plus `margin`; otherwise the entire chunk grid is
/// enumerated - graceful degradation, not a failure.
pub fn enumerate_chunk_urls(
    base: &str,
    level: &ResolutionLevel,
    plane: u32,
    timepoint: u64,
    probe: Option<&dyn ViewportProbe>,
    margin: u32,
) -> Vec<String> {
    let z_chunk = level.z_chunk_for_plane(plane);
    let grid_rows = level.grid_rows();
    let grid_cols = level.grid_cols();

    let range = probe
        .and_then(|p| p.tile_range(level))
        .map(|r| r.expanded(margin, grid_rows, grid_cols));

    let mut urls = Vec::new();
    for channel in 0..level.channel_count() {
        match &range {
            Some(range) => {
                for (row, col) in range.positions() {
                    urls.push(chunk_url(
                        base,
                        level,
                        timepoint,
                        channel,
                        z_chunk,
                        row as u64,
                        col as u64,
                    ));
                }
            }
            None => {
                for row in 0..grid_rows as u64 {
                    for col in 0..grid_cols as u64 {
                        urls.push(chunk_url(
                            base, level, timepoint, channel, z_chunk, row, col,
                        ));
                    }
                }
            }
        }
    }
    urls
}
