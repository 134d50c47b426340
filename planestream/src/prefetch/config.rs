//! Configuration for the prefetch director.

use std::time::Duration;

use crate::error::{EngineError, EngineResult};

/// Default debounce window between a trigger and the prefetch pass it
/// schedules.
pub const DEFAULT_DEBOUNCE_DELAY_MS: u64 = 200;

/// Default global cap on concurrent prefetch fetches.
pub const DEFAULT_MAX_CONCURRENT: usize = 4;

/// Default per-plane chunk-count cap above which the finest level is not
/// prefetched eagerly.
pub const DEFAULT_FINEST_CHUNK_CAP: u64 = 64;

/// Default margin, in tiles, added around the viewport tile range.
pub const DEFAULT_VIEWPORT_MARGIN: u32 = 1;

/// Configuration for [`Director`](super::Director).
#[derive(Debug, Clone)]
pub struct PrefetchConfig {
    /// Debounce window; rapid successive triggers coalesce into one pass.
    pub debounce_delay: Duration,

    /// Global concurrency cap for prefetch traffic, independent of the
    /// scheduler's limits.
    pub max_concurrent: usize,

    /// Skip the finest level when its per-plane chunk count exceeds this.
    pub finest_chunk_cap: u64,

    /// Tiles of margin around the viewport range when a probe is available.
    pub viewport_margin: u32,

    /// Timepoint index used in chunk keys.
    pub timepoint: u64,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            debounce_delay: Duration::from_millis(DEFAULT_DEBOUNCE_DELAY_MS),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            finest_chunk_cap: DEFAULT_FINEST_CHUNK_CAP,
            viewport_margin: DEFAULT_VIEWPORT_MARGIN,
            timepoint: 0,
        }
    }
}

impl PrefetchConfig {
    /// Validate every field.
    pub fn validate(&self) -> EngineResult<()> {
        if self.max_concurrent == 0 {
            return Err(EngineError::InvalidConfig(
                "prefetch concurrency cap must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
