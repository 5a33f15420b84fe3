//! Sensor fusion localization for the mower.
//!
//! [`Localizer`] owns the pose: a Kalman filter fuses wheel odometry
//! (high rate, drifts) with GPS fixes (absolute, noisy). Everything else
//! reads pose snapshots through [`Localizer::current_pose`].

pub mod kalman;
pub mod odometry;

pub use kalman::KalmanFilter;
pub use odometry::WheelOdometry;

use tracing::{debug, info};
use transforms::{normalize_angle, GeoReference};
use types::{Point, Pose, SensorFrame, Twist};

pub struct Localizer {
    filter: KalmanFilter,
    odometry: WheelOdometry,
    /// Projection reference, established by the first accepted GPS fix
    geo: Option<GeoReference>,
    /// Local-frame position of the robot when the reference was set;
    /// keeps local zero at the start position even if odometry ran first
    gps_offset: Point,
    /// Fixes with worse accuracy than this are rejected (m)
    min_gps_accuracy: f32,
}

impl Localizer {
    pub fn new(wheel_radius: f64, pulses_per_rev: u32, wheel_base: f64) -> Self {
        Self {
            filter: KalmanFilter::new(),
            odometry: WheelOdometry::new(wheel_radius, pulses_per_rev, wheel_base),
            geo: None,
            gps_offset: Point::default(),
            min_gps_accuracy: 10.0,
        }
    }

    pub fn with_min_gps_accuracy(mut self, accuracy: f32) -> Self {
        self.min_gps_accuracy = accuracy;
        self
    }

    /// One localization tick: predict, then fold in whatever measurements
    /// this frame carries. Prediction always precedes updates.
    pub fn update(&mut self, frame: &SensorFrame, dt: f64) {
        self.filter.predict(dt);

        if frame.encoders.valid {
            if let Some((d_linear, d_theta)) = self
                .odometry
                .update(frame.encoders.left_pulses, frame.encoders.right_pulses)
            {
                // Midpoint integration from the current estimate
                let (x, y, theta) = self.filter.position();
                let mid = theta + d_theta / 2.0;
                let zx = x + d_linear * mid.cos();
                let zy = y + d_linear * mid.sin();
                let ztheta = normalize_angle(theta + d_theta);
                self.filter.update_odometry(zx, zy, ztheta);
            }
        }

        if frame.gps.valid {
            if let Some(coord) = frame.gps.coord {
                if coord.accuracy > 0.0 && coord.accuracy <= self.min_gps_accuracy {
                    match self.geo {
                        None => {
                            self.geo = Some(GeoReference::from_coord(&coord));
                            let (x, y, _) = self.filter.position();
                            self.gps_offset = Point::new(x, y);
                            info!(lat = coord.lat, lon = coord.lon, "GPS reference established");
                        }
                        Some(ref geo) => {
                            let local = geo.to_local(coord.lat, coord.lon);
                            let zx = local.x + self.gps_offset.x;
                            let zy = local.y + self.gps_offset.y;
                            self.filter.update_gps(zx, zy);
                            debug!(zx, zy, "GPS update");
                        }
                    }
                }
            }
        }
    }

    /// Latest pose estimate. Never blocks, never stale beyond one tick.
    pub fn current_pose(&self) -> Pose {
        let (x, y, theta) = self.filter.position();
        Pose { x, y, theta }
    }

    /// Estimated body velocity: forward speed and yaw rate.
    pub fn current_velocity(&self) -> Twist {
        let (vx, vy, vtheta) = self.filter.velocity();
        let (_, _, theta) = self.filter.position();
        // Project world-frame velocity onto the heading
        let forward = vx * theta.cos() + vy * theta.sin();
        Twist::new(forward, vtheta)
    }

    /// Current position as GPS coordinates, once a reference exists.
    pub fn current_gps(&self) -> Option<(f64, f64)> {
        let geo = self.geo.as_ref()?;
        let pose = self.current_pose();
        let local = Point::new(pose.x - self.gps_offset.x, pose.y - self.gps_offset.y);
        Some(geo.to_gps(&local))
    }

    pub fn geo_reference(&self) -> Option<&GeoReference> {
        self.geo.as_ref()
    }

    /// Project an arbitrary GPS coordinate into the pose frame.
    pub fn gps_to_local(&self, lat: f64, lon: f64) -> Option<Point> {
        let geo = self.geo.as_ref()?;
        let local = geo.to_local(lat, lon);
        Some(Point::new(
            local.x + self.gps_offset.x,
            local.y + self.gps_offset.y,
        ))
    }

    pub fn set_pose(&mut self, pose: Pose) {
        self.filter.set_pose(pose.x, pose.y, pose.theta);
    }

    pub fn total_distance(&self) -> f64 {
        self.odometry.total_distance()
    }

    pub fn reset(&mut self) {
        self.filter.reset();
        self.odometry.reset();
        self.geo = None;
        self.gps_offset = Point::default();
    }
}
