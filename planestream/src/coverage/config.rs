//! Configuration for the coverage estimator.

use crate::error::{EngineError, EngineResult};

/// Default neighbor window radius for aggregate Z progress.
pub const DEFAULT_WINDOW_RADIUS: u32 = 2;

/// Default coverage ratio at which a plane counts as ready.
pub const DEFAULT_NEAR_COMPLETE_THRESHOLD: f64 = 0.95;

/// Configuration for [`CoverageEstimator`](super::CoverageEstimator).
#[derive(Debug, Clone)]
pub struct CoverageConfig {
    /// Planes on each side of current included in aggregate Z progress.
    pub window_radius: u32,

    /// Coverage ratio at or above which a plane counts as near-complete.
    pub near_complete_threshold: f64,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            window_radius: DEFAULT_WINDOW_RADIUS,
            near_complete_threshold: DEFAULT_NEAR_COMPLETE_THRESHOLD,
        }
    }
}

impl CoverageConfig {
    /// Validate every field.
    pub fn validate(&self) -> EngineResult<()> {
        if !(0.0..=1.0).contains(&self.near_complete_threshold) {
            return Err(EngineError::InvalidConfig(format!(
                "near-complete threshold must be in [0, 1], got {}",
                self.near_complete_threshold
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_validates() {
        assert!(CoverageConfig::default().validate().is_ok());
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let config = CoverageConfig {
            near_complete_threshold: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
