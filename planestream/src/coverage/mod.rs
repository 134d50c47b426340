//! Coverage and progress estimation.
//!
//! Reports what fraction of the tiles needed for the current viewport is
//! actually present - on the current plane and on each neighbor in a fixed
//! window - without ever trusting the renderer's "fully loaded" flag in
//! isolation. That flag is observed to report stale values immediately
//! after a plane switch, before the renderer has recomputed what "needed"
//! means for the newly visible plane.
//!
//! Samples are ephemeral: recomputed on demand, never cached across frames,
//! so they always reflect current renderer state.

mod config;

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub use config::{CoverageConfig, DEFAULT_NEAR_COMPLETE_THRESHOLD, DEFAULT_WINDOW_RADIUS};

use crate::coord::{TileRange, ViewportRect};
use crate::render::RenderStateView;
use crate::store::{LevelSet, ResolutionLevel};

/// One coverage measurement. Ephemeral; never cache across frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverageSample {
    /// Plane the sample describes.
    pub plane: u32,
    /// Pyramid level the current zoom requires.
    pub needed_level: usize,
    /// Fraction of needed tile positions present, in `[0, 1]`.
    pub ratio: f64,
}

/// Monotonic generation counter for discarding stale async completions.
///
/// Bumped on every explicit Z-switch. An async "viewport finished loading"
/// notification carries the generation it was issued under; once the
/// current generation has moved past it, the notification is discarded so
/// a late callback from an abandoned switch cannot prematurely mark the new
/// switch complete.
#[derive(Debug, Default)]
pub struct GenerationCounter {
    value: AtomicU64,
}

impl GenerationCounter {
    /// Create a counter at generation 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current generation.
    pub fn current(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }

    /// Advance to a new generation, returning it.
    pub fn bump(&self) -> u64 {
        self.value.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Whether a tagged completion is still current.
    pub fn is_current(&self, generation: u64) -> bool {
        self.current() == generation
    }
}

/// Estimates viewport coverage from read-only render state.
pub struct CoverageEstimator {
    view: Arc<dyn RenderStateView>,
    levels: Arc<LevelSet>,
    config: CoverageConfig,
}

impl CoverageEstimator {
    /// Create an estimator over the given render view and level pyramid.
    pub fn new(
        view: Arc<dyn RenderStateView>,
        levels: Arc<LevelSet>,
        config: CoverageConfig,
    ) -> Self {
        Self {
            view,
            levels,
            config,
        }
    }

    /// The coarsest pyramid level that still provides adequate on-screen
    /// resolution for `zoom` (screen pixels per full-resolution image
    /// pixel).
    pub fn needed_level(&self, zoom: f64) -> usize {
        let required = if zoom > 0.0 { (1.0 / zoom).max(1.0) } else { f64::MAX };
        for level in (0..self.levels.len()).rev() {
            if self.levels.scale_factor(level) <= required {
                return level;
            }
        }
        0
    }

    /// Tile-index bounding box at `level` covering the viewport.
    pub fn viewport_tile_range(
        &self,
        level: &ResolutionLevel,
        viewport: &ViewportRect,
    ) -> TileRange {
        let factor = self.levels.scale_factor(level.index);
        let span_x = level.chunk_cols() as f64 * factor;
        let span_y = level.chunk_rows() as f64 * factor;

        let max_row_idx = level.grid_rows().saturating_sub(1);
        let max_col_idx = level.grid_cols().saturating_sub(1);

        let clamp = |v: f64, max: u32| -> u32 { (v.max(0.0) as u32).min(max) };

        let min_row = clamp((viewport.min_y / span_y).floor(), max_row_idx);
        let max_row = clamp(((viewport.max_y - 1.0) / span_y).floor(), max_row_idx);
        let min_col = clamp((viewport.min_x / span_x).floor(), max_col_idx);
        let max_col = clamp(((viewport.max_x - 1.0) / span_x).floor(), max_col_idx);

        TileRange::new(min_row, max_row.max(min_row), min_col, max_col.max(min_col))
    }

    /// Finest level among the tiles currently drawn for a plane.
    pub fn finest_drawn_level(&self, plane: u32) -> Option<usize> {
        self.view
            .drawn_tiles(plane)
            .iter()
            .map(|t| t.level)
            .min()
    }

    /// Coverage for the *current* plane, from the drawn-tile list.
    ///
    /// While the finest drawn level is still coarser than the needed level,
    /// the score is the ratio of the two scale factors - a partial value
    /// that can never report false completeness on placeholder resolution.
    pub fn coverage_for_current(
        &self,
        plane: u32,
        viewport: &ViewportRect,
        zoom: f64,
    ) -> CoverageSample {
        let needed = self.needed_level(zoom);
        let Some(needed_level) = self.levels.get(needed) else {
            return CoverageSample {
                plane,
                needed_level: needed,
                ratio: 0.0,
            };
        };

        let range = self.viewport_tile_range(needed_level, viewport);
        let total = range.count();
        if total == 0 {
            return CoverageSample {
                plane,
                needed_level: needed,
                ratio: 1.0,
            };
        }

        let drawn = self.view.drawn_tiles(plane);
        let mut covered: HashSet<(u32, u32)> = HashSet::new();
        let mut finest_in_view: Option<usize> = None;

        for tile in &drawn {
            let Some((row, col)) = self.map_to_level(tile.level, tile.row, tile.col, needed)
            else {
                continue;
            };
            if !range.contains(row, col) {
                continue;
            }
            finest_in_view = Some(finest_in_view.map_or(tile.level, |f| f.min(tile.level)));
            if tile.level <= needed {
                covered.insert((row, col));
            }
        }

        let ratio = match finest_in_view {
            None => 0.0,
            Some(finest) if finest > needed => {
                // Placeholder resolution only: proportional partial score.
                let needed_factor = self.levels.scale_factor(needed);
                let drawn_factor = self.levels.scale_factor(finest);
                if drawn_factor > 0.0 {
                    (needed_factor / drawn_factor).clamp(0.0, 1.0)
                } else {
                    0.0
                }
            }
            Some(_) => covered.len() as f64 / total as f64,
        };

        CoverageSample {
            plane,
            needed_level: needed,
            ratio: ratio.clamp(0.0, 1.0),
        }
    }

    /// Coverage for a *neighbor* plane, from its tile matrix.
    ///
    /// Checks the plane's own tile matrix position-by-position instead of
    /// its "fully loaded" flag - slower, but trustworthy.
    pub fn coverage_for_plane(
        &self,
        plane: u32,
        viewport: &ViewportRect,
        zoom: f64,
    ) -> CoverageSample {
        let needed = self.needed_level(zoom);
        let Some(needed_level) = self.levels.get(needed) else {
            return CoverageSample {
                plane,
                needed_level: needed,
                ratio: 0.0,
            };
        };

        let range = self.viewport_tile_range(needed_level, viewport);
        let total = range.count();
        if total == 0 {
            return CoverageSample {
                plane,
                needed_level: needed,
                ratio: 1.0,
            };
        }

        let covered = range
            .positions()
            .filter(|&(row, col)| self.view.has_tile(plane, needed, row, col))
            .count() as u64;

        CoverageSample {
            plane,
            needed_level: needed,
            ratio: (covered as f64 / total as f64).clamp(0.0, 1.0),
        }
    }

    /// Aggregate Z progress: fraction of planes in the window around
    /// `current` whose coverage is at or above the near-complete threshold.
    pub fn window_progress(&self, current: u32, viewport: &ViewportRect, zoom: f64) -> f64 {
        let plane_count = self.levels.plane_count();
        if plane_count == 0 {
            return 0.0;
        }

        let radius = self.config.window_radius as i64;
        let current = current as i64;
        let max = plane_count as i64;

        let mut total = 0u32;
        let mut ready = 0u32;
        for z in (current - radius)..=(current + radius) {
            if !(0..max).contains(&z) {
                continue;
            }
            let z = z as u32;
            total += 1;
            let sample = if z as i64 == current {
                self.coverage_for_current(z, viewport, zoom)
            } else {
                self.coverage_for_plane(z, viewport, zoom)
            };
            if sample.ratio >= self.config.near_complete_threshold {
                ready += 1;
            }
        }

        if total == 0 {
            0.0
        } else {
            ready as f64 / total as f64
        }
    }

    /// Map tile coordinates from one level onto another by the grid-scale
    /// ratio.
    fn map_to_level(
        &self,
        from_level: usize,
        row: u32,
        col: u32,
        to_level: usize,
    ) -> Option<(u32, u32)> {
        if from_level == to_level {
            return Some((row, col));
        }
        let from = self.levels.get(from_level)?;
        let to = self.levels.get(to_level)?;

        let from_factor = self.levels.scale_factor(from_level);
        let to_factor = self.levels.scale_factor(to_level);

        // Image-space origin of the source tile, mapped into target grid.
        let y0 = row as f64 * from.chunk_rows() as f64 * from_factor;
        let x0 = col as f64 * from.chunk_cols() as f64 * from_factor;
        let to_row = (y0 / (to.chunk_rows() as f64 * to_factor)).floor();
        let to_col = (x0 / (to.chunk_cols() as f64 * to_factor)).floor();
        if to_row < 0.0 || to_col < 0.0 {
            return None;
        }
        Some((to_row as u32, to_col as u32))
    }
}
