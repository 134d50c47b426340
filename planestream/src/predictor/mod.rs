//! Z-axis velocity tracking and plane prediction.
//!
//! The tracker maintains an exponentially smoothed, signed velocity
//! (planes/second) from the stream of Z-change events and derives the
//! ordered list of planes the user is likely to visit next. It is a pure
//! state machine: no timers, no I/O - callers feed it `Instant`s.

mod config;

use std::time::Instant;

pub use config::{
    PredictorConfig, DEFAULT_MAX_DEPTH, DEFAULT_PREDICTION_RADIUS, DEFAULT_RECENCY_WINDOW_MS,
    DEFAULT_VELOCITY_DECAY, DEFAULT_VELOCITY_THRESHOLD,
};

/// Smoothed Z-velocity state.
///
/// Mutated only by [`record_change`](Self::record_change). Velocity decays
/// to exactly 0 when a change arrives after a gap longer than the recency
/// window: a long pause means the user stopped, not that they are moving
/// infinitely fast.
#[derive(Debug, Clone)]
pub struct VelocityTracker {
    config: PredictorConfig,
    current_z: u32,
    last_z: u32,
    last_change: Option<Instant>,
    velocity: f64,
}

impl VelocityTracker {
    /// Create a tracker starting at plane `initial_z`.
    pub fn new(config: PredictorConfig, initial_z: u32) -> Self {
        Self {
            config,
            current_z: initial_z,
            last_z: initial_z,
            last_change: None,
            velocity: 0.0,
        }
    }

    /// Current plane.
    pub fn current_z(&self) -> u32 {
        self.current_z
    }

    /// Smoothed signed velocity in planes/second (positive = increasing Z).
    pub fn velocity(&self) -> f64 {
        self.velocity
    }

    /// Record a Z change observed at `now`.
    ///
    /// Recent changes blend an instantaneous velocity into the estimate;
    /// a change after a long pause resets the estimate to 0.
    pub fn record_change(&mut self, new_z: u32, now: Instant) {
        if new_z == self.current_z {
            return;
        }

        match self.last_change {
            Some(last) if now.duration_since(last) <= self.config.recency_window => {
                let elapsed = now.duration_since(last).as_secs_f64();
                if elapsed > 0.0 {
                    let instant = (new_z as f64 - self.current_z as f64) / elapsed;
                    self.velocity = self.velocity * self.config.decay
                        + instant * (1.0 - self.config.decay);
                }
            }
            _ => {
                self.velocity = 0.0;
            }
        }

        self.last_z = self.current_z;
        self.current_z = new_z;
        self.last_change = Some(now);
    }

    /// Clear all motion state (session reset).
    pub fn reset(&mut self) {
        self.velocity = 0.0;
        self.last_change = None;
        self.last_z = self.current_z;
    }

    /// Planes likely to be visited next, most likely first.
    ///
    /// Below the velocity threshold the list is symmetric around the
    /// current plane out to the configured radius (slow browsing - either
    /// direction equally likely). At or above it the list is
    /// direction-biased: `min(max_depth, ceil(|v| / threshold))` planes
    /// ahead, closest first, plus exactly one plane behind to cover an
    /// immediate reversal. All entries are clipped to `[0, z_count)` and
    /// the current plane is never included.
    pub fn predict(&self, z_count: u32) -> Vec<u32> {
        if z_count == 0 {
            return Vec::new();
        }

        let z = self.current_z as i64;
        let max = z_count as i64;
        let mut planes = Vec::new();
        let mut push = |candidate: i64| {
            if (0..max).contains(&candidate) && candidate != z {
                let candidate = candidate as u32;
                if !planes.contains(&candidate) {
                    planes.push(candidate);
                }
            }
        };

        if self.velocity.abs() < self.config.velocity_threshold {
            for step in 1..=self.config.radius as i64 {
                push(z + step);
                push(z - step);
            }
        } else {
            let direction: i64 = if self.velocity > 0.0 { 1 } else { -1 };
            let depth = (self.velocity.abs() / self.config.velocity_threshold).ceil() as i64;
            let depth = depth.min(self.config.max_depth as i64);
            for step in 1..=depth {
                push(z + direction * step);
            }
            push(z - direction);
        }

        planes
    }
}
