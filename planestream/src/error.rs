//! Error types for the engine.

use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur while building or running the engine.
///
/// Prefetch network failures are deliberately *not* represented here: they
/// are counted in [`crate::prefetch::PrefetchStats`] and logged, never
/// surfaced as errors (see the error-handling contract).
#[derive(Debug, Error)]
pub enum EngineError {
    /// Failed to fetch a per-level metadata document.
    #[error("metadata fetch failed for {url}: {reason}")]
    MetadataFetch { url: String, reason: String },

    /// A metadata document was fetched but could not be parsed.
    #[error("metadata parse failed for {url}: {reason}")]
    MetadataParse { url: String, reason: String },

    /// A level slot was still empty after the metadata load completed.
    #[error("resolution level {index} missing after metadata load")]
    LevelMissing { index: usize },

    /// The store reported zero resolution levels.
    #[error("store has no resolution levels")]
    EmptyPyramid,

    /// A configuration value failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
