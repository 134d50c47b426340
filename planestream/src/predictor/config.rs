//! Configuration for the Z-velocity predictor.

use std::time::Duration;

use crate::error::{EngineError, EngineResult};

/// Default recency window; a longer gap between Z changes resets velocity.
pub const DEFAULT_RECENCY_WINDOW_MS: u64 = 2000;

/// Default EMA decay constant; close to but below 1 for responsive-but-stable
/// tracking.
pub const DEFAULT_VELOCITY_DECAY: f64 = 0.8;

/// Default velocity threshold (planes/second) separating idle browsing from
/// directed travel.
pub const DEFAULT_VELOCITY_THRESHOLD: f64 = 1.5;

/// Default symmetric prediction radius while browsing slowly.
pub const DEFAULT_PREDICTION_RADIUS: u32 = 2;

/// Default maximum look-ahead depth while travelling.
pub const DEFAULT_MAX_DEPTH: u32 = 5;

/// Configuration for [`VelocityTracker`](super::VelocityTracker).
#[derive(Debug, Clone)]
pub struct PredictorConfig {
    /// Gap beyond which the previous change is not "recent" and velocity
    /// resets to 0.
    pub recency_window: Duration,

    /// EMA blend: `velocity = velocity * decay + instant * (1 - decay)`.
    pub decay: f64,

    /// Speed (planes/second) at or above which prediction becomes
    /// direction-biased.
    pub velocity_threshold: f64,

    /// Planes predicted on each side of current while below threshold.
    pub radius: u32,

    /// Cap on planes predicted ahead while above threshold.
    pub max_depth: u32,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            recency_window: Duration::from_millis(DEFAULT_RECENCY_WINDOW_MS),
            decay: DEFAULT_VELOCITY_DECAY,
            velocity_threshold: DEFAULT_VELOCITY_THRESHOLD,
            radius: DEFAULT_PREDICTION_RADIUS,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl PredictorConfig {
    /// Validate every field, rejecting values that would destabilize the
    /// estimate.
    pub fn validate(&self) -> EngineResult<()> {
        if !(0.0..1.0).contains(&self.decay) {
            return Err(EngineError::InvalidConfig(format!(
                "predictor decay must be in [0, 1), got {}",
                self.decay
            )));
        }
        if self.velocity_threshold <= 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "velocity threshold must be positive, got {}",
                self.velocity_threshold
            )));
        }
        if self.radius == 0 {
            return Err(EngineError::InvalidConfig(
                "prediction radius must be at least 1".to_string(),
            ));
        }
        if self.max_depth == 0 {
            return Err(EngineError::InvalidConfig(
                "prediction max depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
