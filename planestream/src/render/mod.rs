//! Collaborator traits for the external rendering library.
//!
//! The engine never owns rendering. It wraps the library's tile submission
//! entry point ([`TileSink`]), reads its per-plane tile state
//! ([`RenderStateView`]), and optionally asks it for the current viewport's
//! tile range ([`ViewportProbe`]). Render state is read-only except for two
//! documented repair mutations used by the resolution-mismatch fix.

use crate::coord::{TileRange, ViewportRect};
use crate::store::ResolutionLevel;

/// Descriptor for one tile the render library wants fetched.
///
/// Created by the embedding glue on every intercepted submission. `plane`
/// is `None` when the owning render item could not report it (a known
/// timing race during plane switches); the scheduler then falls back to
/// parsing the resource path.
#[derive(Debug, Clone, PartialEq)]
pub struct TileRequest {
    /// Resource path the library will GET for this tile.
    pub url: String,
    /// Pyramid level the tile belongs to.
    pub level: usize,
    /// Owning Z plane, when determinable.
    pub plane: Option<u32>,
    /// Tile footprint in image coordinates, when known.
    pub bounds: Option<ViewportRect>,
}

impl TileRequest {
    /// Create a request with full context.
    pub fn new(
        url: impl Into<String>,
        level: usize,
        plane: Option<u32>,
        bounds: Option<ViewportRect>,
    ) -> Self {
        Self {
            url: url.into(),
            level,
            plane,
            bounds,
        }
    }
}

/// The render library's tile submission entry point, wrapped by the
/// scheduler.
///
/// The original submit function is preserved and still invoked - just
/// deferred and reordered. The mutable concurrency limit is the sole
/// admission-control surface the library exposes.
pub trait TileSink: Send + Sync + 'static {
    /// Hand a tile request to the library's real submission function.
    fn submit(&self, request: &TileRequest);

    /// Set the library's concurrency limit property.
    fn set_concurrency_limit(&self, limit: usize);
}

/// One tile currently drawn by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawnTile {
    /// Pyramid level of the drawn tile.
    pub level: usize,
    /// Tile row at that level.
    pub row: u32,
    /// Tile column at that level.
    pub col: u32,
}

/// Read-only view of per-plane render state.
///
/// Everything here is observational except [`clear_plane_coverage`] and
/// [`force_redraw`], which exist solely for the rate-limited
/// resolution-mismatch repair and must not be generalized.
///
/// [`clear_plane_coverage`]: RenderStateView::clear_plane_coverage
/// [`force_redraw`]: RenderStateView::force_redraw
pub trait RenderStateView: Send + Sync + 'static {
    /// Tiles currently drawn for a plane.
    fn drawn_tiles(&self, plane: u32) -> Vec<DrawnTile>;

    /// Whether a plane's tile matrix holds a tile at `(level, row, col)`.
    fn has_tile(&self, plane: u32, level: usize, row: u32, col: u32) -> bool;

    /// The renderer's own "fully loaded" flag for a plane.
    ///
    /// Observed to report stale values immediately after a plane switch;
    /// never trust it in isolation (see the coverage estimator).
    fn reports_loaded(&self, plane: u32) -> bool;

    /// Number of tile jobs the renderer itself reports in flight.
    fn jobs_in_flight(&self) -> usize;

    /// Repair mutation: clear the renderer's per-plane tile-coverage
    /// bookkeeping so stale placeholder tiles can be superseded.
    fn clear_plane_coverage(&self, plane: u32);

    /// Repair mutation: force a redraw of the current viewport.
    fn force_redraw(&self);
}

/// Optional accessor for the viewport's tile range at a given level.
///
/// When absent, the prefetch director degrades to enumerating the whole
/// chunk grid for a plane/level - slower but correct.
pub trait ViewportProbe: Send + Sync + 'static {
    /// Tile range covering the current viewport at `level`, if known.
    fn tile_range(&self, level: &ResolutionLevel) -> Option<TileRange>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_request_new() {
        let req = TileRequest::new("http://store.test/0/0/0/5/1/2", 0, Some(5), None);
        assert_eq!(req.level, 0);
        assert_eq!(req.plane, Some(5));
        assert!(req.bounds.is_none());
    }

    #[test]
    fn test_drawn_tile_equality() {
        let a = DrawnTile {
            level: 1,
            row: 2,
            col: 3,
        };
        let b = DrawnTile {
            level: 1,
            row: 2,
            col: 3,
        };
        assert_eq!(a, b);
    }
}
