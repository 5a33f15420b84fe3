//! Differential-drive wheel odometry from cumulative encoder counts.

use tracing::trace;

/// Converts encoder pulse deltas into robot displacement.
pub struct WheelOdometry {
    /// Meters of wheel travel per encoder pulse
    meters_per_pulse: f64,
    /// Distance between the drive wheels (m)
    wheel_base: f64,
    /// Previous cumulative counts (left, right)
    last: Option<(i64, i64)>,
    /// Accumulated |forward| distance since reset
    total_distance: f64,
}

impl WheelOdometry {
    pub fn new(wheel_radius: f64, pulses_per_rev: u32, wheel_base: f64) -> Self {
        let circumference = 2.0 * std::f64::consts::PI * wheel_radius;
        Self {
            meters_per_pulse: circumference / pulses_per_rev as f64,
            wheel_base,
            last: None,
            total_distance: 0.0,
        }
    }

    /// Update with new cumulative counts.
    ///
    /// Returns `(d_linear, d_theta)` displacement since the previous call,
    /// or None on the first reading (no baseline yet).
    pub fn update(&mut self, left: i64, right: i64) -> Option<(f64, f64)> {
        let Some((last_left, last_right)) = self.last else {
            self.last = Some((left, right));
            return None;
        };
        self.last = Some((left, right));

        let d_left = (left.wrapping_sub(last_left)) as f64 * self.meters_per_pulse;
        let d_right = (right.wrapping_sub(last_right)) as f64 * self.meters_per_pulse;

        let d_linear = (d_left + d_right) / 2.0;
        let d_theta = (d_right - d_left) / self.wheel_base;

        self.total_distance += d_linear.abs();
        trace!(d_linear, d_theta, "odometry delta");

        Some((d_linear, d_theta))
    }

    pub fn total_distance(&self) -> f64 {
        self.total_distance
    }

    pub fn reset(&mut self) {
        self.last = None;
        self.total_distance = 0.0;
    }
}
