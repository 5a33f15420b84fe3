//! Deterministic robot simulation for development and testing.
//!
//! The simulator is a first-class backend, not a mock: motor commands
//! drive a unicycle physics model, and every sensor read is synthesized
//! from the resulting state. All state lives behind a single [`SimHandle`]
//! that only the simulator HAL backend holds.

pub mod camera;
pub mod physics;

use camera::CameraModel;
use image::RgbImage;
use physics::Physics;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use transforms::GeoReference;
use types::{
    BumperReading, EStopReading, EncoderReading, GpsCoord, GpsReading, ImuReading, MotorStatus,
    Point, Pose, PowerReading, Twist,
};

/// Simulation parameters, filled in from the configuration tree.
#[derive(Debug, Clone)]
pub struct SimParams {
    pub wheel_radius: f64,
    pub wheel_base: f64,
    pub pulses_per_rev: u32,
    /// Wheel surface speed at 100% duty (m/s)
    pub max_wheel_speed: f64,
    /// GPS coordinates of the start position
    pub origin_lat: f64,
    pub origin_lon: f64,
    pub initial_battery_percent: f64,
    /// Deterministic bumper press schedule (test hook)
    pub bumper_schedule_enabled: bool,
    pub bumper_interval: f64,
    pub camera: CameraModel,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            wheel_radius: 0.065,
            wheel_base: 0.30,
            pulses_per_rev: 360,
            max_wheel_speed: 0.6,
            origin_lat: 39.9334,
            origin_lon: 32.8597,
            initial_battery_percent: 100.0,
            bumper_schedule_enabled: false,
            bumper_interval: 10.0,
            camera: CameraModel {
                width: 640,
                height: 480,
                focal_px: 500.0,
                height_m: 0.15,
            },
        }
    }
}

/// The complete simulation state.
pub struct SimWorld {
    params: SimParams,
    physics: Physics,
    geo: GeoReference,
    /// Simulated time since start (s)
    elapsed: f64,
    battery_percent: f64,
    charging: bool,
    left_pulses: f64,
    right_pulses: f64,
    motor: MotorStatus,
    emergency_latched: bool,
    /// Test hooks
    bumper_forced: bool,
    estop_forced: bool,
    /// Obstacles visible to the synthetic camera: (center, radius)
    camera_obstacles: Vec<(Point, f64)>,
}

impl SimWorld {
    pub fn new(params: SimParams) -> Self {
        let geo = GeoReference::new(params.origin_lat, params.origin_lon);
        Self {
            battery_percent: params.initial_battery_percent,
            params,
            physics: Physics::new(),
            geo,
            elapsed: 0.0,
            charging: false,
            left_pulses: 0.0,
            right_pulses: 0.0,
            motor: MotorStatus {
                active: true,
                ..MotorStatus::default()
            },
            emergency_latched: false,
            bumper_forced: false,
            estop_forced: false,
            camera_obstacles: Vec::new(),
        }
    }

    /// Advance the simulation by `dt` seconds.
    pub fn tick(&mut self, dt: f64) {
        let left_v = self.motor.left_speed * self.params.max_wheel_speed;
        let right_v = self.motor.right_speed * self.params.max_wheel_speed;
        let twist = Twist::new(
            (left_v + right_v) / 2.0,
            (right_v - left_v) / self.params.wheel_base,
        );
        self.physics.update(twist, dt);

        let circumference = 2.0 * std::f64::consts::PI * self.params.wheel_radius;
        self.left_pulses += left_v * dt / circumference * self.params.pulses_per_rev as f64;
        self.right_pulses += right_v * dt / circumference * self.params.pulses_per_rev as f64;

        if self.charging {
            self.battery_percent = (self.battery_percent + 0.5 * dt).min(100.0);
        } else {
            let mut drain = 0.005;
            drain += 0.03 * twist.linear.abs() / self.params.max_wheel_speed;
            for on in [
                self.motor.main_brush,
                self.motor.side_brush_left,
                self.motor.side_brush_right,
                self.motor.fan,
            ] {
                if on {
                    drain += 0.008;
                }
            }
            self.battery_percent = (self.battery_percent - drain * dt).max(0.0);
        }

        self.elapsed += dt;
    }

    // --- motor side -----------------------------------------------------

    /// Command wheel speeds, each clamped to [-1, 1]. Ignored while the
    /// emergency latch is set.
    pub fn set_wheel_speeds(&mut self, left: f64, right: f64) {
        if self.emergency_latched {
            return;
        }
        self.motor.left_speed = left.clamp(-1.0, 1.0);
        self.motor.right_speed = right.clamp(-1.0, 1.0);
    }

    pub fn set_brushes(&mut self, main: bool, left: bool, right: bool) {
        if self.emergency_latched {
            return;
        }
        self.motor.main_brush = main;
        self.motor.side_brush_left = left;
        self.motor.side_brush_right = right;
    }

    pub fn set_fan(&mut self, on: bool) {
        if self.emergency_latched {
            return;
        }
        self.motor.fan = on;
    }

    /// Zero everything and refuse further commands until cleared.
    pub fn emergency_stop(&mut self) {
        debug!("sim motor emergency stop");
        self.motor = MotorStatus {
            active: false,
            ..MotorStatus::default()
        };
        self.emergency_latched = true;
    }

    pub fn clear_emergency(&mut self) {
        self.emergency_latched = false;
        self.motor.active = true;
    }

    pub fn motor_status(&self) -> MotorStatus {
        self.motor
    }

    // --- sensor side ----------------------------------------------------

    pub fn imu_reading(&self) -> ImuReading {
        let (v, w) = self.physics.velocity();
        let moving = v.abs() > 0.01 || w.abs() > 0.01;
        // Mild sinusoidal sway while moving, near-level at rest
        let sway = if moving { 0.02 } else { 0.002 };
        let phase = self.elapsed * 2.0 * std::f64::consts::PI * 0.7;
        let (_, _, theta) = self.physics.position();

        ImuReading {
            roll: sway * phase.sin(),
            pitch: sway * (phase * 0.8).cos(),
            yaw: theta,
            accel: [
                0.1 * v + 0.05 * phase.sin(),
                0.05 * (phase * 1.3).cos(),
                9.81 + 0.02 * (phase * 2.1).sin(),
            ],
            gyro: [0.0, 0.0, w],
            valid: true,
            error: None,
        }
    }

    pub fn gps_reading(&self) -> GpsReading {
        let (x, y, _) = self.physics.position();
        let (lat, lon) = self.geo.to_gps(&Point::new(x, y));
        GpsReading {
            coord: Some(GpsCoord {
                lat,
                lon,
                alt: 850.0,
                accuracy: 1.2,
            }),
            satellites: 9,
            valid: true,
            error: None,
        }
    }

    pub fn power_reading(&self) -> PowerReading {
        let (v, _) = self.physics.velocity();
        let voltage = if self.charging {
            11.8
        } else {
            10.0 + 2.6 * self.battery_percent / 100.0
        };
        let mut current = 0.4 + 1.5 * v.abs() / self.params.max_wheel_speed;
        for on in [
            self.motor.main_brush,
            self.motor.side_brush_left,
            self.motor.side_brush_right,
        ] {
            if on {
                current += 0.8;
            }
        }
        if self.motor.fan {
            current += 0.6;
        }
        if self.charging {
            current = 1.2;
        }
        PowerReading {
            voltage,
            current,
            battery_percent: self.battery_percent,
            valid: true,
            error: None,
        }
    }

    pub fn encoder_reading(&self) -> EncoderReading {
        EncoderReading {
            left_pulses: self.left_pulses as i64,
            right_pulses: self.right_pulses as i64,
            valid: true,
            error: None,
        }
    }

    pub fn bumper_reading(&self) -> BumperReading {
        let scheduled = self.params.bumper_schedule_enabled
            && self.params.bumper_interval > 0.0
            && self.elapsed > 0.0
            && self.elapsed % self.params.bumper_interval < 0.2;
        BumperReading {
            pressed: self.bumper_forced || scheduled,
            valid: true,
            error: None,
        }
    }

    pub fn estop_reading(&self) -> EStopReading {
        EStopReading {
            pressed: self.estop_forced,
            valid: true,
            error: None,
        }
    }

    pub fn camera_frame(&self) -> RgbImage {
        let pose = self.pose();
        camera::render_frame(&self.params.camera, &pose, &self.camera_obstacles)
    }

    // --- state access and test hooks ------------------------------------

    pub fn pose(&self) -> Pose {
        let (x, y, theta) = self.physics.position();
        Pose { x, y, theta }
    }

    pub fn set_pose(&mut self, x: f64, y: f64, theta: f64) {
        self.physics.set_position(x, y, theta);
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn battery_percent(&self) -> f64 {
        self.battery_percent
    }

    pub fn set_battery_percent(&mut self, percent: f64) {
        self.battery_percent = percent.clamp(0.0, 100.0);
    }

    pub fn set_charging(&mut self, charging: bool) {
        self.charging = charging;
    }

    pub fn force_bumper(&mut self, pressed: bool) {
        self.bumper_forced = pressed;
    }

    pub fn force_estop(&mut self, pressed: bool) {
        self.estop_forced = pressed;
    }

    pub fn set_camera_obstacles(&mut self, obstacles: Vec<(Point, f64)>) {
        self.camera_obstacles = obstacles;
    }

    pub fn geo(&self) -> &GeoReference {
        &self.geo
    }
}

/// Shared handle to the simulation. Cloned into every simulated device so
/// that motor writes are visible to sensor reads.
#[derive(Clone)]
pub struct SimHandle {
    inner: Arc<Mutex<SimWorld>>,
}

impl SimHandle {
    pub fn new(params: SimParams) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SimWorld::new(params))),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, SimWorld> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
