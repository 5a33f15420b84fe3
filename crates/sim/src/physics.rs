//! 2D unicycle physics for the simulated mower.

use transforms::normalize_angle;
use types::Twist;

/// Integrates commanded velocities into a pose.
pub struct Physics {
    x: f64,
    y: f64,
    theta: f64,
    linear_vel: f64,
    angular_vel: f64,
}

impl Physics {
    pub fn new() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            theta: 0.0,
            linear_vel: 0.0,
            angular_vel: 0.0,
        }
    }

    /// Advance the pose by `dt` seconds under the commanded twist.
    ///
    /// Uses exact arc integration when turning, straight-line otherwise.
    pub fn update(&mut self, cmd: Twist, dt: f64) {
        self.linear_vel = cmd.linear;
        self.angular_vel = cmd.angular;

        if self.angular_vel.abs() < 1e-3 {
            self.x += self.linear_vel * self.theta.cos() * dt;
            self.y += self.linear_vel * self.theta.sin() * dt;
        } else {
            let r = self.linear_vel / self.angular_vel;
            let dtheta = self.angular_vel * dt;
            self.x += r * ((self.theta + dtheta).sin() - self.theta.sin());
            self.y += r * (self.theta.cos() - (self.theta + dtheta).cos());
            self.theta += dtheta;
        }

        self.theta = normalize_angle(self.theta);
    }

    /// Current position (x, y, theta).
    pub fn position(&self) -> (f64, f64, f64) {
        (self.x, self.y, self.theta)
    }

    /// Current velocity (linear, angular).
    pub fn velocity(&self) -> (f64, f64) {
        (self.linear_vel, self.angular_vel)
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Set the pose directly (for spawning/resetting in tests).
    pub fn set_position(&mut self, x: f64, y: f64, theta: f64) {
        self.x = x;
        self.y = y;
        self.theta = normalize_angle(theta);
    }
}

impl Default for Physics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_straight_line() {
        let mut physics = Physics::new();
        physics.update(Twist::new(0.5, 0.0), 2.0);

        let (x, y, theta) = physics.position();
        assert!((x - 1.0).abs() < 1e-9);
        assert!(y.abs() < 1e-9);
        assert!(theta.abs() < 1e-9);
    }

    #[test]
    fn test_rotate_in_place() {
        let mut physics = Physics::new();
        physics.update(Twist::new(0.0, 0.5), 1.0);

        let (x, y, theta) = physics.position();
        assert!(x.abs() < 1e-9);
        assert!(y.abs() < 1e-9);
        assert!((theta - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_quarter_circle_arc() {
        let mut physics = Physics::new();
        // v = r * omega with r = 1: after pi/2 worth of turn we are at (1, 1)
        let omega = 0.5;
        let steps = 100;
        let dt = (PI / 2.0) / omega / steps as f64;
        for _ in 0..steps {
            physics.update(Twist::new(omega, omega), dt);
        }

        let (x, y, theta) = physics.position();
        assert!((x - 1.0).abs() < 0.01, "x = {x}");
        assert!((y - 1.0).abs() < 0.01, "y = {y}");
        assert!((theta - PI / 2.0).abs() < 0.01, "theta = {theta}");
    }

    #[test]
    fn test_theta_stays_normalized() {
        let mut physics = Physics::new();
        for _ in 0..1000 {
            physics.update(Twist::new(0.0, 1.0), 0.1);
            let (_, _, theta) = physics.position();
            assert!(theta > -PI && theta <= PI, "theta {theta} escaped (-pi, pi]");
        }
    }

    #[test]
    fn test_set_position_normalizes() {
        let mut physics = Physics::new();
        physics.set_position(1.0, 2.0, 3.0 * PI);
        let (_, _, theta) = physics.position();
        assert!((theta - PI).abs() < 1e-9);
    }
}
