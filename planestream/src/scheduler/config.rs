//! Configuration for the priority scheduler.

use std::time::Duration;

use crate::error::{EngineError, EngineResult};

/// Default concurrency limit while the view is animating.
pub const DEFAULT_ANIMATING_LIMIT: usize = 2;

/// Default concurrency limit at rest.
pub const DEFAULT_IDLE_LIMIT: usize = 6;

/// Default hard cap on queued jobs.
pub const DEFAULT_QUEUE_CAP: usize = 256;

/// Default settle window before restoring the idle limit.
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 300;

/// Default safety-net redispatch delay when all slots are busy.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 150;

/// Default heartbeat tick interval.
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 1000;

/// Default viewport overlap ratio below which speculative queue entries are
/// purged on animation start.
pub const DEFAULT_VIEWPORT_OVERLAP_THRESHOLD: f64 = 0.5;

/// Default cooldown between resolution-mismatch repairs for one
/// (plane, zoom) pair.
pub const DEFAULT_REPAIR_COOLDOWN_SECS: u64 = 10;

/// Configuration for [`Scheduler`](super::Scheduler).
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Concurrency limit while panning/zooming.
    pub animating_limit: usize,

    /// Concurrency limit at rest.
    pub idle_limit: usize,

    /// Hard cap on pending jobs; overflow drops the lowest-priority tail.
    pub queue_cap: usize,

    /// Delay after animation-finish before the idle limit is restored.
    pub settle_delay: Duration,

    /// Safety-net redispatch delay when a dispatch pass moves nothing.
    pub retry_delay: Duration,

    /// Heartbeat tick interval (runs only while there is work to do).
    pub heartbeat_interval: Duration,

    /// Viewport overlap ratio below which background-tier queue entries are
    /// purged on animation start.
    pub viewport_overlap_threshold: f64,

    /// Minimum time between mismatch repairs for one (plane, zoom) pair.
    pub repair_cooldown: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            animating_limit: DEFAULT_ANIMATING_LIMIT,
            idle_limit: DEFAULT_IDLE_LIMIT,
            queue_cap: DEFAULT_QUEUE_CAP,
            settle_delay: Duration::from_millis(DEFAULT_SETTLE_DELAY_MS),
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            heartbeat_interval: Duration::from_millis(DEFAULT_HEARTBEAT_INTERVAL_MS),
            viewport_overlap_threshold: DEFAULT_VIEWPORT_OVERLAP_THRESHOLD,
            repair_cooldown: Duration::from_secs(DEFAULT_REPAIR_COOLDOWN_SECS),
        }
    }
}

impl SchedulerConfig {
    /// Validate every field.
    pub fn validate(&self) -> EngineResult<()> {
        if self.animating_limit == 0 || self.idle_limit == 0 {
            return Err(EngineError::InvalidConfig(
                "concurrency limits must be at least 1".to_string(),
            ));
        }
        if self.queue_cap == 0 {
            return Err(EngineError::InvalidConfig(
                "queue cap must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.viewport_overlap_threshold) {
            return Err(EngineError::InvalidConfig(format!(
                "viewport overlap threshold must be in [0, 1], got {}",
                self.viewport_overlap_threshold
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
        assert!(SchedulerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_limit_rejected() {
        let config = SchedulerConfig {
            animating_limit: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_queue_cap_rejected() {
        let config = SchedulerConfig {
            queue_cap: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overlap_threshold_out_of_range_rejected() {
        let config = SchedulerConfig {
            viewport_overlap_threshold: 1.2,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
