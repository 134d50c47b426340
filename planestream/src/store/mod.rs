//! Chunk store model: level geometry, metadata loading, URL construction.
//!
//! The store exposes a 5-dimensional array (t, c, z, y, x) per resolution
//! level. Level 0 is the finest; indices increase toward the coarsest. The
//! level set is populated once at engine init and is immutable thereafter.

mod keys;
mod level;
mod metadata;

pub use keys::{chunk_url, plane_from_path};
pub use level::{LevelSet, ResolutionLevel};
pub use metadata::{LevelMetadata, StoreClient, DEFAULT_DIMENSION_SEPARATOR};

/// Axis positions in the 5-dimensional store arrays.
pub mod axis {
    /// Time axis.
    pub const T: usize = 0;
    /// Channel axis.
    pub const C: usize = 1;
    /// Depth (Z-plane) axis.
    pub const Z: usize = 2;
    /// Row axis.
    pub const Y: usize = 3;
    /// Column axis.
    pub const X: usize = 4;
}
