//! Six-state Kalman filter over pose and velocity.
//!
//! State vector: (x, y, theta, vx, vy, vtheta). The constant-velocity
//! transition couples position to velocity; GPS updates observe (x, y),
//! odometry updates observe (x, y, theta).

use nalgebra::{SMatrix, SVector};
use transforms::normalize_angle;

type Vec6 = SVector<f64, 6>;
type Mat6 = SMatrix<f64, 6, 6>;
type Mat2 = SMatrix<f64, 2, 2>;
type Mat3 = SMatrix<f64, 3, 3>;
type Mat2x6 = SMatrix<f64, 2, 6>;
type Mat3x6 = SMatrix<f64, 3, 6>;

pub struct KalmanFilter {
    /// State estimate
    x: Vec6,
    /// Estimate covariance
    p: Mat6,
    /// Process noise
    q: Mat6,
    /// GPS measurement noise
    r_gps: Mat2,
    /// Odometry measurement noise
    r_odom: Mat3,
}

impl KalmanFilter {
    pub fn new() -> Self {
        Self {
            x: Vec6::zeros(),
            p: Mat6::identity(),
            q: Mat6::identity() * 0.1,
            r_gps: Mat2::identity() * 0.5,
            r_odom: Mat3::identity() * 0.05,
        }
    }

    /// Propagate the state by `dt` seconds.
    pub fn predict(&mut self, dt: f64) {
        let mut f = Mat6::identity();
        f[(0, 3)] = dt;
        f[(1, 4)] = dt;
        f[(2, 5)] = dt;

        self.x = f * self.x;
        self.x[2] = normalize_angle(self.x[2]);
        self.p = f * self.p * f.transpose() + self.q;
    }

    /// Fuse a GPS position measurement (local frame meters).
    pub fn update_gps(&mut self, zx: f64, zy: f64) {
        let mut h = Mat2x6::zeros();
        h[(0, 0)] = 1.0;
        h[(1, 1)] = 1.0;

        let z = SVector::<f64, 2>::new(zx, zy);
        let innovation = z - h * self.x;
        let s = h * self.p * h.transpose() + self.r_gps;
        let Some(s_inv) = s.try_inverse() else {
            return;
        };
        let k = self.p * h.transpose() * s_inv;

        self.x += k * innovation;
        self.x[2] = normalize_angle(self.x[2]);
        self.p = (Mat6::identity() - k * h) * self.p;
    }

    /// Fuse an odometry pose measurement.
    pub fn update_odometry(&mut self, zx: f64, zy: f64, ztheta: f64) {
        let mut h = Mat3x6::zeros();
        h[(0, 0)] = 1.0;
        h[(1, 1)] = 1.0;
        h[(2, 2)] = 1.0;

        let predicted = h * self.x;
        let innovation = SVector::<f64, 3>::new(
            zx - predicted[0],
            zy - predicted[1],
            // Heading residual must wrap
            normalize_angle(ztheta - predicted[2]),
        );

        let s = h * self.p * h.transpose() + self.r_odom;
        let Some(s_inv) = s.try_inverse() else {
            return;
        };
        let k = self.p * h.transpose() * s_inv;

        self.x += k * innovation;
        self.x[2] = normalize_angle(self.x[2]);
        self.p = (Mat6::identity() - k * h) * self.p;
    }

    pub fn position(&self) -> (f64, f64, f64) {
        (self.x[0], self.x[1], self.x[2])
    }

    pub fn velocity(&self) -> (f64, f64, f64) {
        (self.x[3], self.x[4], self.x[5])
    }

    /// Overwrite the pose estimate (reset / manual correction).
    pub fn set_pose(&mut self, x: f64, y: f64, theta: f64) {
        self.x[0] = x;
        self.x[1] = y;
        self.x[2] = normalize_angle(theta);
        self.p = Mat6::identity();
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for KalmanFilter {
    fn default() -> Self {
        Self::new()
    }
}
