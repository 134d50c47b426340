//! Job priority assignment.

use crate::coord::ViewportRect;
use crate::render::TileRequest;
use crate::store::plane_from_path;

/// Priority value for tiles on the current plane inside the viewport.
pub const PRIORITY_VIEWPORT: i32 = 100;

/// Priority value for tiles on an adjacent plane inside the viewport, and
/// the fallback when a tile's plane cannot be determined.
pub const PRIORITY_NEIGHBOR: i32 = 50;

/// Priority value for background/speculative tiles.
pub const PRIORITY_BACKGROUND: i32 = 0;

/// Tile scheduling priority (higher values dispatch first).
///
/// # Priority Bands
///
/// - [`Priority::VIEWPORT`] (100): current plane, intersecting the viewport
/// - [`Priority::NEIGHBOR`] (50): plane within ±1 of current, intersecting
///   the viewport; also the fallback when the plane is unknown
/// - [`Priority::BACKGROUND`] (0): everything else
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(pub i32);

impl Priority {
    /// Tiles the user is looking at right now.
    pub const VIEWPORT: Priority = Priority(PRIORITY_VIEWPORT);

    /// Tiles one plane away from what the user is looking at.
    pub const NEIGHBOR: Priority = Priority(PRIORITY_NEIGHBOR);

    /// Speculative and off-viewport tiles.
    pub const BACKGROUND: Priority = Priority(PRIORITY_BACKGROUND);

    /// Create a priority with an explicit value.
    pub fn new(value: i32) -> Self {
        Self(value)
    }

    /// Numeric priority value.
    pub fn value(&self) -> i32 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::NEIGHBOR
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::VIEWPORT => write!(f, "Viewport(100)"),
            Self::NEIGHBOR => write!(f, "Neighbor(50)"),
            Self::BACKGROUND => write!(f, "Background(0)"),
            Self(v) => write!(f, "Priority({})", v),
        }
    }
}

/// Context against which job priorities are computed.
///
/// Recomputed priorities flow through the queue whenever the current plane
/// or viewport changes.
#[derive(Debug, Clone, Default)]
pub struct SchedulingContext {
    /// Currently displayed plane.
    pub current_plane: u32,
    /// Current viewport bounds, when known.
    pub viewport: Option<ViewportRect>,
}

impl SchedulingContext {
    /// Assign a priority band to a request.
    ///
    /// When the request carries no plane (owning-item timing race), the
    /// plane is recovered from the resource path; `z_chunk_size` converts
    /// the path's Z-chunk index back to a plane index. If both fail, the
    /// request gets the default band rather than an error.
    pub fn classify(&self, request: &TileRequest, z_chunk_size: u64) -> Priority {
        let plane = request.plane.or_else(|| {
            plane_from_path(&request.url).map(|zc| (zc * z_chunk_size) as u32)
        });

        let Some(plane) = plane else {
            return Priority::default();
        };

        let intersects = match (&request.bounds, &self.viewport) {
            (Some(bounds), Some(viewport)) => bounds.intersects(viewport),
            // Without both rectangles we cannot rule intersection out.
            _ => true,
        };

        let distance = (plane as i64 - self.current_plane as i64).abs();
        match (distance, intersects) {
            (0, true) => Priority::VIEWPORT,
            (1, true) => Priority::NEIGHBOR,
            _ => Priority::BACKGROUND,
        }
    }
}
