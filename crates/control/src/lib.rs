//! Motor mixing and velocity control for the mower.

use std::time::{Duration, Instant};
use types::Twist;

/// Chassis geometry parameters.
#[derive(Debug, Clone)]
pub struct ChassisParams {
    /// Wheel radius in meters
    pub wheel_radius: f64,
    /// Distance between the drive wheels in meters
    pub wheel_base: f64,
}

impl ChassisParams {
    pub fn new(wheel_diameter: f64, wheel_base: f64) -> Self {
        Self {
            wheel_radius: wheel_diameter / 2.0,
            wheel_base,
        }
    }
}

/// Differential drive mixer.
///
/// Converts body-frame velocity commands (linear, angular) into the
/// normalized [-1, 1] wheel speeds the motor HAL accepts.
pub struct DiffDriveMixer {
    params: ChassisParams,
    /// Wheel surface speed at 100% duty (m/s)
    max_wheel_speed: f64,
}

impl DiffDriveMixer {
    pub fn new(params: ChassisParams, max_wheel_speed: f64) -> Self {
        Self {
            params,
            max_wheel_speed,
        }
    }

    /// Convert a twist to (left, right) normalized wheel speeds.
    ///
    /// - Left wheel: v - ω·L/2
    /// - Right wheel: v + ω·L/2
    ///
    /// Both outputs are clamped to [-1, 1]; if either side saturates, both
    /// are scaled down together so the turn curvature is preserved.
    pub fn mix(&self, twist: Twist) -> (f64, f64) {
        let half_base = self.params.wheel_base / 2.0;
        let left = (twist.linear - twist.angular * half_base) / self.max_wheel_speed;
        let right = (twist.linear + twist.angular * half_base) / self.max_wheel_speed;

        let peak = left.abs().max(right.abs());
        if peak > 1.0 {
            (left / peak, right / peak)
        } else {
            (left, right)
        }
    }

    pub fn params(&self) -> &ChassisParams {
        &self.params
    }
}

/// Velocity and acceleration limits.
#[derive(Debug, Clone)]
pub struct Limits {
    pub max_linear: f64,
    pub max_angular: f64,
    pub max_linear_accel: f64,
    pub max_angular_accel: f64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_linear: 0.5,
            max_angular: 1.0,
            max_linear_accel: 0.5,
            max_angular_accel: 1.0,
        }
    }
}

/// Rate limiter for smooth acceleration.
pub struct RateLimiter {
    limits: Limits,
    last_twist: Twist,
    last_time: Option<Instant>,
}

impl RateLimiter {
    pub fn new(limits: Limits) -> Self {
        Self {
            limits,
            last_twist: Twist::default(),
            last_time: None,
        }
    }

    /// Clamp a twist to the velocity limits and bound its rate of change.
    pub fn limit(&mut self, mut twist: Twist) -> Twist {
        twist.linear = twist
            .linear
            .clamp(-self.limits.max_linear, self.limits.max_linear);
        twist.angular = twist
            .angular
            .clamp(-self.limits.max_angular, self.limits.max_angular);

        let now = Instant::now();
        if let Some(last) = self.last_time {
            let dt = now.duration_since(last).as_secs_f64();

            let max_dv = self.limits.max_linear_accel * dt;
            let dv = twist.linear - self.last_twist.linear;
            if dv.abs() > max_dv {
                twist.linear = self.last_twist.linear + dv.signum() * max_dv;
            }

            let max_dw = self.limits.max_angular_accel * dt;
            let dw = twist.angular - self.last_twist.angular;
            if dw.abs() > max_dw {
                twist.angular = self.last_twist.angular + dw.signum() * max_dw;
            }
        }

        self.last_twist = twist;
        self.last_time = Some(now);

        twist
    }

    /// Reset the limiter (e.g. after an e-stop).
    pub fn reset(&mut self) {
        self.last_twist = Twist::default();
        self.last_time = None;
    }
}

/// Command watchdog — triggers a safe stop when commands stop arriving.
pub struct Watchdog {
    timeout: Duration,
    last_command: Option<Instant>,
}

impl Watchdog {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_command: None,
        }
    }

    /// Mark that a command was received.
    pub fn feed(&mut self) {
        self.last_command = Some(Instant::now());
    }

    pub fn is_timed_out(&self) -> bool {
        match self.last_command {
            Some(t) => t.elapsed() > self.timeout,
            None => true,
        }
    }

    pub fn reset(&mut self) {
        self.last_command = None;
    }
}
