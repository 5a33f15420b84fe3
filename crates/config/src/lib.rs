//! Typed configuration tree for the mower.
//!
//! Every tunable the control stack uses comes from this tree; the crates
//! themselves hold no magic constants. A missing file falls back to the
//! documented defaults with a warning. Calibration updates are written
//! back atomically with a `.bak` copy of the previous file.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Root configuration tree (mower.toml).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MowerConfig {
    pub robot: RobotConfig,
    pub navigation: NavigationConfig,
    pub missions: MissionsConfig,
    pub safety: SafetyConfig,
    pub charging: ChargingConfig,
    pub sensors: SensorsConfig,
    pub motors: MotorsConfig,
    pub web_interface: WebInterfaceConfig,
    pub logging: LoggingConfig,
    /// Garden polygon, ordered, >= 3 vertices, treated as closed
    pub boundary_coordinates: Vec<BoundaryVertex>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    pub name: String,
    /// Main loop rate in Hz
    pub tick_rate_hz: f64,
    /// How long the ERROR state waits before retrying (s)
    pub error_grace_secs: f64,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            name: "mower-01".to_string(),
            tick_rate_hz: 10.0,
            error_grace_secs: 5.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    /// Drive wheel diameter in meters
    pub wheel_diameter: f64,
    /// Distance between drive wheels in meters
    pub wheel_base: f64,
    /// Encoder pulses per wheel revolution
    pub encoder_pulses_per_rev: u32,
    /// A waypoint counts as reached within this distance (m)
    pub waypoint_tolerance: f64,
    pub max_linear_speed: f64,
    pub max_angular_speed: f64,
    pub max_linear_accel: f64,
    pub max_angular_accel: f64,
    pub path_planning: PathPlanningConfig,
    pub avoidance: AvoidanceConfig,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            wheel_diameter: 0.13,
            wheel_base: 0.30,
            encoder_pulses_per_rev: 360,
            waypoint_tolerance: 0.3,
            max_linear_speed: 0.5,
            max_angular_speed: 1.0,
            max_linear_accel: 0.5,
            max_angular_accel: 1.0,
            path_planning: PathPlanningConfig::default(),
            avoidance: AvoidanceConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathPlanningConfig {
    /// Occupancy grid cell size in meters
    pub grid_resolution: f64,
    /// Inflation added around each static obstacle (m)
    pub obstacle_padding: f64,
    /// Hard cap on A* expansions; search fails rather than blow the tick budget
    pub max_nodes: usize,
}

impl Default for PathPlanningConfig {
    fn default() -> Self {
        Self {
            grid_resolution: 0.1,
            obstacle_padding: 0.2,
            max_nodes: 20_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AvoidanceConfig {
    /// Robot body radius (m)
    pub robot_radius: f64,
    /// Extra clearance kept beyond the body radius (m)
    pub safety_distance: f64,
    /// Forward simulation horizon (s)
    pub lookahead_time: f64,
    /// Forward simulation step (s)
    pub sim_step: f64,
    /// Linear velocity sampling step (m/s)
    pub velocity_resolution: f64,
    /// Angular velocity sampling step (rad/s)
    pub angular_resolution: f64,
    /// Obstacles older than this are pruned (s)
    pub obstacle_ttl: f64,
    /// Ticks without a feasible sample before the controller declares stuck
    pub stuck_limit: u32,
    pub goal_weight: f64,
    pub obstacle_weight: f64,
    pub speed_weight: f64,
    pub smoothness_weight: f64,
}

impl Default for AvoidanceConfig {
    fn default() -> Self {
        Self {
            robot_radius: 0.3,
            safety_distance: 0.5,
            lookahead_time: 2.0,
            sim_step: 0.1,
            velocity_resolution: 0.05,
            angular_resolution: 0.1,
            obstacle_ttl: 5.0,
            stuck_limit: 20,
            goal_weight: 1.0,
            obstacle_weight: 2.0,
            speed_weight: 0.5,
            smoothness_weight: 0.3,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MissionsConfig {
    pub mowing: MowingConfig,
    pub charging: ChargeMissionConfig,
    pub accessories: AccessoriesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MowingConfig {
    /// Strip overlap in meters
    pub overlap: f64,
    /// Nominal mowing speed (m/s)
    pub speed: f64,
    /// Cutting width of the main brush (m)
    pub brush_width: f64,
}

impl Default for MowingConfig {
    fn default() -> Self {
        Self {
            overlap: 0.05,
            speed: 0.3,
            brush_width: 0.25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChargeMissionConfig {
    /// Battery percentage that triggers CHARGE_SEEK
    pub battery_low_threshold: f64,
    /// Battery percentage that ends CHARGING
    pub battery_full_threshold: f64,
    pub dock_gps: DockGpsConfig,
}

impl Default for ChargeMissionConfig {
    fn default() -> Self {
        Self {
            battery_low_threshold: 30.0,
            battery_full_threshold: 95.0,
            dock_gps: DockGpsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DockGpsConfig {
    pub latitude: f64,
    pub longitude: f64,
    /// GPS accuracy radius around the dock (m); inside it the planner
    /// switches to the dense slow-approach regime
    pub accuracy_radius: f64,
}

impl Default for DockGpsConfig {
    fn default() -> Self {
        Self {
            latitude: 39.9334,
            longitude: 32.8597,
            accuracy_radius: 3.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessoriesConfig {
    /// Minimum speed at which mowing is effective (m/s)
    pub min_mowing_speed: f64,
    /// Side brushes are forced off above this speed (m/s)
    pub max_side_brush_speed: f64,
    /// Battery percentage below which everything shuts off
    pub critical_battery: f64,
    /// Battery percentage below which the fan shuts off
    pub low_battery: f64,
    /// Side brushes off when an obstacle is nearer than this (m)
    pub safe_obstacle_distance: f64,
    /// Main brush off too when an obstacle is nearer than this (m)
    pub main_brush_obstacle_distance: f64,
    /// All accessories off when an obstacle is nearer than this (m)
    pub emergency_obstacle_distance: f64,
    /// Side brushes off within this distance of the garden boundary (m)
    pub boundary_safety_distance: f64,
}

impl Default for AccessoriesConfig {
    fn default() -> Self {
        Self {
            min_mowing_speed: 0.1,
            max_side_brush_speed: 0.3,
            critical_battery: 20.0,
            low_battery: 40.0,
            safe_obstacle_distance: 0.5,
            main_brush_obstacle_distance: 0.35,
            emergency_obstacle_distance: 0.2,
            boundary_safety_distance: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Tilt beyond this is an emergency (degrees)
    pub max_tilt_angle: f64,
    /// Emergency braking engages against obstacles within this range (m)
    pub obstacle_distance: f64,
    /// Battery voltage below this is an emergency (V)
    pub min_battery_voltage: f64,
    /// Voltage sag beyond this fraction in one tick draws a warning
    pub battery_drop_warn_fraction: f64,
    /// Current draw above this draws a warning (A)
    pub max_current: f64,
    /// Sensor silence longer than this trips the watchdog (s)
    pub watchdog_timeout: f64,
    /// GPIO pin of the hardware e-stop input
    pub emergency_stop_pin: u8,
    /// Consecutive clear ticks required to leave EMERGENCY automatically
    pub emergency_clear_ticks: u32,
    /// Danger band inside the garden boundary (m)
    pub boundary_buffer: f64,
    /// Warning band inside the garden boundary (m)
    pub boundary_warning: f64,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            max_tilt_angle: 25.0,
            obstacle_distance: 0.5,
            min_battery_voltage: 10.5,
            battery_drop_warn_fraction: 0.05,
            max_current: 5.0,
            watchdog_timeout: 5.0,
            emergency_stop_pin: 17,
            emergency_clear_ticks: 10,
            boundary_buffer: 1.0,
            boundary_warning: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChargingConfig {
    /// Coarse GPS navigation hands over to the tag approach inside this range (m)
    pub apriltag_detection_range: f64,
    /// Within this distance of the dock the planner drops A* for direct
    /// GPS-guided waypoints (m)
    pub gps_medium_range: f64,
    /// Id of the dock's tag (36h11 family)
    pub tag_id: u32,
    /// Physical tag edge length (m)
    pub tag_size: f64,
    /// Distance at which APPROACH hands over to PRECISE_POSITION (m)
    pub precise_distance: f64,
    /// Distance tolerance for CONTACT (m)
    pub position_tolerance: f64,
    /// Heading tolerance for approach and contact (degrees)
    pub angle_tolerance_deg: f64,
    pub approach_speed: f64,
    pub precise_speed: f64,
    pub search_rotation_speed: f64,
    /// Charge contact is confirmed at or above this voltage (V)
    pub connect_voltage: f64,
    /// ... and this current (A)
    pub connect_current: f64,
    /// Give up waiting for contact after this long (s)
    pub contact_timeout: f64,
    /// Missed detections before APPROACH falls back to SEARCH
    pub max_missed_frames: u32,
    /// Stricter threshold during PRECISE_POSITION
    pub precise_missed_frames: u32,
}

impl Default for ChargingConfig {
    fn default() -> Self {
        Self {
            apriltag_detection_range: 0.5,
            gps_medium_range: 10.0,
            tag_id: 0,
            tag_size: 0.08,
            precise_distance: 0.08,
            position_tolerance: 0.02,
            angle_tolerance_deg: 5.0,
            approach_speed: 0.1,
            precise_speed: 0.02,
            search_rotation_speed: 0.2,
            connect_voltage: 11.0,
            connect_current: 0.1,
            contact_timeout: 30.0,
            max_missed_frames: 10,
            precise_missed_frames: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorsConfig {
    /// Backend selection: "auto", "simulation" or "hardware"
    pub r#type: String,
    /// GPIO pin of the bumper contact switch
    pub bumper_pin: u8,
    pub encoders: EncoderPins,
    pub camera: CameraConfig,
    pub sim: SimConfig,
}

impl Default for SensorsConfig {
    fn default() -> Self {
        Self {
            r#type: "auto".to_string(),
            bumper_pin: 22,
            encoders: EncoderPins::default(),
            camera: CameraConfig::default(),
            sim: SimConfig::default(),
        }
    }
}

/// Quadrature encoder GPIO pins (A/B per wheel).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderPins {
    pub left_a: u8,
    pub left_b: u8,
    pub right_a: u8,
    pub right_b: u8,
}

impl Default for EncoderPins {
    fn default() -> Self {
        Self {
            left_a: 23,
            left_b: 24,
            right_a: 25,
            right_b: 27,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Pinhole focal length in pixels (~65 deg horizontal FOV at 640 px)
    pub focal_length_px: f64,
    /// Camera height above the ground plane (m)
    pub height_m: f64,
    pub detection: DetectionConfig,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30,
            focal_length_px: 500.0,
            height_m: 0.15,
            detection: DetectionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub canny_low: f32,
    pub canny_high: f32,
    /// Contours smaller than this many pixels are noise
    pub min_contour_area: f64,
    /// ... larger than this are terrain/shadow
    pub max_contour_area: f64,
    /// Detections below this confidence are dropped
    pub detection_threshold: f64,
    /// Any obstacle inside this range raises the emergency flag (m)
    pub close_range: f64,
    /// Nearest-neighbour gate for track association (m)
    pub max_tracking_distance: f64,
    /// Per-track history ring size
    pub tracking_history: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            canny_low: 50.0,
            canny_high: 150.0,
            min_contour_area: 200.0,
            max_contour_area: 60_000.0,
            detection_threshold: 0.5,
            close_range: 0.5,
            max_tracking_distance: 1.0,
            tracking_history: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Deterministic bumper press schedule (test hook)
    pub bumper_schedule_enabled: bool,
    /// Seconds between scheduled bumper presses
    pub bumper_interval: f64,
    /// Starting battery percentage
    pub initial_battery_percent: f64,
    /// GPS reference of the simulated start position
    pub origin_latitude: f64,
    pub origin_longitude: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            bumper_schedule_enabled: false,
            bumper_interval: 10.0,
            initial_battery_percent: 100.0,
            origin_latitude: 39.9334,
            origin_longitude: 32.8597,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MotorsConfig {
    /// Backend selection: "simulation" or "hardware"
    pub r#type: String,
    pub left: WheelPins,
    pub right: WheelPins,
    pub main_brush_pin: u8,
    pub side_brush_left_pin: u8,
    pub side_brush_right_pin: u8,
    pub fan_pin: u8,
}

impl Default for MotorsConfig {
    fn default() -> Self {
        Self {
            r#type: "simulation".to_string(),
            left: WheelPins {
                pwm_pin: 12,
                forward_pin: 5,
                backward_pin: 6,
            },
            right: WheelPins {
                pwm_pin: 13,
                forward_pin: 20,
                backward_pin: 21,
            },
            main_brush_pin: 16,
            side_brush_left_pin: 19,
            side_brush_right_pin: 26,
            fan_pin: 24,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct WheelPins {
    pub pwm_pin: u8,
    pub forward_pin: u8,
    pub backward_pin: u8,
}

impl Default for WheelPins {
    fn default() -> Self {
        Self {
            pwm_pin: 12,
            forward_pin: 5,
            backward_pin: 6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebInterfaceConfig {
    pub enabled: bool,
    pub port: u16,
    /// Telemetry publish rate over the WebSocket (Hz)
    pub telemetry_hz: u32,
}

impl Default for WebInterfaceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8765,
            telemetry_hz: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub dir: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: "logs".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BoundaryVertex {
    pub latitude: f64,
    pub longitude: f64,
}

impl MowerConfig {
    /// Load from a TOML file, falling back to defaults if it is missing.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: MowerConfig = toml::from_str(&content)?;
            info!(path = %path.display(), "Loaded config");
            Ok(config)
        } else {
            warn!(path = %path.display(), "Config file not found, using defaults");
            Ok(MowerConfig::default())
        }
    }

    /// Write the tree back atomically, keeping the previous file as `.bak`.
    ///
    /// Calibration results (camera intrinsics, encoder pulses-per-meter,
    /// wheelbase correction) are persisted through this path.
    pub fn save_with_backup(&self, path: &Path) -> Result<(), ConfigError> {
        let serialized = toml::to_string_pretty(self)?;

        if path.exists() {
            let backup = path.with_extension("toml.bak");
            std::fs::copy(path, &backup)?;
        }

        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, serialized)?;
        std::fs::rename(&tmp, path)?;
        info!(path = %path.display(), "Config saved");
        Ok(())
    }

    /// Pulses the encoders emit per meter of wheel travel.
    pub fn encoder_pulses_per_meter(&self) -> f64 {
        let circumference = std::f64::consts::PI * self.navigation.wheel_diameter;
        self.navigation.encoder_pulses_per_rev as f64 / circumference
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documented_defaults() {
        let config = MowerConfig::default();
        assert!((config.navigation.path_planning.grid_resolution - 0.1).abs() < 1e-9);
        assert!((config.navigation.waypoint_tolerance - 0.3).abs() < 1e-9);
        assert!((config.safety.max_tilt_angle - 25.0).abs() < 1e-9);
        assert!((config.safety.min_battery_voltage - 10.5).abs() < 1e-9);
        assert!((config.safety.watchdog_timeout - 5.0).abs() < 1e-9);
        assert!((config.charging.apriltag_detection_range - 0.5).abs() < 1e-9);
        assert!((config.charging.tag_size - 0.08).abs() < 1e-9);
        assert!((config.missions.charging.battery_full_threshold - 95.0).abs() < 1e-9);
        assert!((config.missions.accessories.critical_battery - 20.0).abs() < 1e-9);
        assert!((config.navigation.avoidance.obstacle_ttl - 5.0).abs() < 1e-9);
        assert_eq!(config.navigation.avoidance.stuck_limit, 20);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let toml_str = r#"
            [robot]
            name = "test-mower"

            [navigation]
            wheel_diameter = 0.15

            [[boundary_coordinates]]
            latitude = 39.9335
            longitude = 32.8595

            [[boundary_coordinates]]
            latitude = 39.9336
            longitude = 32.8599

            [[boundary_coordinates]]
            latitude = 39.9333
            longitude = 32.85985
        "#;
        let config: MowerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.robot.name, "test-mower");
        assert!((config.navigation.wheel_diameter - 0.15).abs() < 1e-9);
        // Untouched sections keep their defaults
        assert!((config.navigation.wheel_base - 0.30).abs() < 1e-9);
        assert!((config.safety.max_tilt_angle - 25.0).abs() < 1e-9);
        assert_eq!(config.boundary_coordinates.len(), 3);
    }

    #[test]
    fn test_pulses_per_meter() {
        let config = MowerConfig::default();
        // 360 pulses over a 0.13 m diameter wheel: ~881 pulses/m
        let ppm = config.encoder_pulses_per_meter();
        assert!(ppm > 800.0 && ppm < 900.0);
    }

    #[test]
    fn test_save_with_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mower.toml");

        let mut config = MowerConfig::default();
        config.save_with_backup(&path).unwrap();
        assert!(path.exists());

        // Second save creates the backup of the first
        config.navigation.wheel_diameter = 0.14;
        config.save_with_backup(&path).unwrap();
        assert!(dir.path().join("mower.toml.bak").exists());

        let reloaded = MowerConfig::load(&path).unwrap();
        assert!((reloaded.navigation.wheel_diameter - 0.14).abs() < 1e-9);
    }

    #[test]
    fn test_missing_file_defaults() {
        let config = MowerConfig::load(Path::new("/nonexistent/mower.toml")).unwrap();
        assert_eq!(config.robot.name, "mower-01");
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = MowerConfig::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let decoded: MowerConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(decoded.robot.name, config.robot.name);
        assert!(
            (decoded.missions.mowing.brush_width - config.missions.mowing.brush_width).abs()
                < 1e-9
        );
    }
}
