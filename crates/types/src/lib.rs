//! Shared types and message definitions for the mower.

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// A point in the local metric frame (meters).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance_to(&self, other: &Point) -> f64 {
        ((other.x - self.x).powi(2) + (other.y - self.y).powi(2)).sqrt()
    }

    /// Bearing from this point towards another, in radians.
    pub fn bearing_to(&self, other: &Point) -> f64 {
        (other.y - self.y).atan2(other.x - self.x)
    }
}

/// Velocity command: linear (m/s) and angular (rad/s).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Twist {
    /// Linear velocity in m/s (positive = forward)
    pub linear: f64,
    /// Angular velocity in rad/s (positive = counter-clockwise)
    pub angular: f64,
}

impl Twist {
    pub fn new(linear: f64, angular: f64) -> Self {
        Self { linear, angular }
    }

    /// The all-stop command.
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_zero(&self) -> bool {
        self.linear == 0.0 && self.angular == 0.0
    }
}

/// 2D pose in the local frame (meters, radians).
/// Origin is the robot's position when the first GPS fix was accepted.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Pose {
    /// X position in meters (positive = east at the reference point)
    pub x: f64,
    /// Y position in meters (positive = north at the reference point)
    pub y: f64,
    /// Heading in radians, normalized to (-pi, pi]
    pub theta: f64,
}

impl Pose {
    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// GPS coordinates (WGS84).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct GpsCoord {
    /// Latitude in degrees
    pub lat: f64,
    /// Longitude in degrees
    pub lon: f64,
    /// Altitude in meters (above WGS84 ellipsoid)
    pub alt: f64,
    /// Horizontal accuracy in meters (0 = unknown)
    pub accuracy: f32,
}

/// Top-level robot state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RobotState {
    /// Booting, self-tests running
    #[default]
    Startup,
    /// Ready, waiting for a mission
    Idle,
    /// Executing a coverage mission
    Mowing,
    /// Navigating towards the charging dock (coarse GPS phase)
    ChargeSeek,
    /// AprilTag fine approach in progress
    Docking,
    /// On the dock, motors off
    Charging,
    /// Safety trip, motors zeroed
    Emergency,
    /// Unrecoverable tick failure, waiting out the grace delay
    Error,
}

/// Task phase used by the accessory policy engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    #[default]
    Idle,
    Mowing,
    PointToPoint,
    ChargeSeek,
    Docked,
    Emergency,
}

/// A single target along a route.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Waypoint {
    /// Target position in the local frame
    pub position: Point,
    /// Target heading at the waypoint (radians)
    pub heading: f64,
    /// Target speed approaching the waypoint (m/s)
    pub speed: f64,
    /// Whether brushes/fan should be enabled on this segment
    pub accessories_on: bool,
}

impl Waypoint {
    pub fn new(position: Point, heading: f64, speed: f64, accessories_on: bool) -> Self {
        Self {
            position,
            heading,
            speed,
            accessories_on,
        }
    }
}

/// An ordered waypoint sequence, consumed index-forward.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Route {
    waypoints: Vec<Waypoint>,
    index: usize,
}

impl Route {
    pub fn new(waypoints: Vec<Waypoint>) -> Self {
        Self {
            waypoints,
            index: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    /// The waypoint currently being driven towards, if any.
    pub fn current(&self) -> Option<&Waypoint> {
        self.waypoints.get(self.index)
    }

    /// Return the next pending waypoint and advance the index.
    pub fn next_waypoint(&mut self) -> Option<Waypoint> {
        let wp = self.waypoints.get(self.index).copied();
        if wp.is_some() {
            self.index += 1;
        }
        wp
    }

    /// Mark the current waypoint as reached and move to the next.
    pub fn advance(&mut self) {
        if self.index < self.waypoints.len() {
            self.index += 1;
        }
    }

    /// True once every waypoint has been consumed.
    pub fn is_complete(&self) -> bool {
        self.index >= self.waypoints.len()
    }

    /// (completed, total) waypoint counts.
    pub fn progress(&self) -> (usize, usize) {
        (self.index.min(self.waypoints.len()), self.waypoints.len())
    }

    /// Completion as a percentage in [0, 100].
    pub fn progress_percent(&self) -> f64 {
        if self.waypoints.is_empty() {
            return 100.0;
        }
        self.index.min(self.waypoints.len()) as f64 / self.waypoints.len() as f64 * 100.0
    }

    /// Total path length in meters.
    pub fn length_m(&self) -> f64 {
        self.waypoints
            .windows(2)
            .map(|w| w[0].position.distance_to(&w[1].position))
            .sum()
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }
}

/// A dynamic obstacle observed by the detector.
///
/// Not serializable: `detected_at` is a monotonic instant used for TTL
/// pruning. Telemetry carries a plain summary instead.
#[derive(Debug, Clone)]
pub struct DynamicObstacle {
    /// Center in the local frame
    pub position: Point,
    /// Estimated radius in meters
    pub radius: f64,
    /// Speed magnitude in m/s (0 = static)
    pub speed: f64,
    /// Direction of travel in radians
    pub heading: f64,
    /// When the detection was made
    pub detected_at: Instant,
    /// Detection confidence in [0, 1]
    pub confidence: f64,
    /// Tracker-assigned id, if the detection was matched
    pub track_id: Option<u32>,
}

impl DynamicObstacle {
    /// A static obstacle detected right now.
    pub fn at(position: Point, radius: f64, confidence: f64) -> Self {
        Self {
            position,
            radius,
            speed: 0.0,
            heading: 0.0,
            detected_at: Instant::now(),
            confidence,
            track_id: None,
        }
    }
}

/// IMU reading (orientation + inertial rates).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImuReading {
    /// Roll in radians
    pub roll: f64,
    /// Pitch in radians
    pub pitch: f64,
    /// Yaw in radians
    pub yaw: f64,
    /// Linear acceleration [x, y, z] in m/s^2
    pub accel: [f64; 3],
    /// Angular rate [x, y, z] in rad/s
    pub gyro: [f64; 3],
    pub valid: bool,
    pub error: Option<String>,
}

/// GPS receiver reading.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GpsReading {
    /// Coordinates when a fix is held
    pub coord: Option<GpsCoord>,
    /// Number of satellites used
    pub satellites: u8,
    pub valid: bool,
    pub error: Option<String>,
}

/// Power monitor reading.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PowerReading {
    /// Battery voltage (V)
    pub voltage: f64,
    /// System current draw (A)
    pub current: f64,
    /// Estimated charge in [0, 100]
    pub battery_percent: f64,
    pub valid: bool,
    pub error: Option<String>,
}

/// Bumper contact reading.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BumperReading {
    pub pressed: bool,
    pub valid: bool,
    pub error: Option<String>,
}

/// Cumulative wheel encoder counts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EncoderReading {
    pub left_pulses: i64,
    pub right_pulses: i64,
    pub valid: bool,
    pub error: Option<String>,
}

/// Hardware emergency-stop input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EStopReading {
    pub pressed: bool,
    pub valid: bool,
    pub error: Option<String>,
}

/// One tick worth of sensor data. Stale or missing readings are carried
/// with `valid = false` and a reason, never dropped silently.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SensorFrame {
    /// Capture time, milliseconds since the unix epoch
    pub timestamp_ms: u64,
    pub imu: ImuReading,
    pub gps: GpsReading,
    pub power: PowerReading,
    pub bumper: BumperReading,
    pub encoders: EncoderReading,
    pub estop: EStopReading,
}

/// Actuator state as last commanded.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MotorStatus {
    /// Left wheel normalized speed in [-1, 1]
    pub left_speed: f64,
    /// Right wheel normalized speed in [-1, 1]
    pub right_speed: f64,
    pub main_brush: bool,
    pub side_brush_left: bool,
    pub side_brush_right: bool,
    pub fan: bool,
    /// Whether the driver is accepting commands
    pub active: bool,
}

/// Mission selection for `Command::StartMission`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionKind {
    Mowing,
    PointToPoint { x: f64, y: f64 },
}

/// Command from the operator UI to the robot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    StartMission(MissionKind),
    StopMission,
    EmergencyStop,
    EmergencyRelease,
    /// Manual drive; preempts autonomy while commands keep arriving
    ManualMove {
        linear: f64,
        angular: f64,
    },
    SetBrushes {
        active: bool,
    },
    SetFan {
        active: bool,
    },
    ReturnToDock,
    /// Keep-alive for the command watchdog
    Heartbeat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert!((a.distance_to(&b) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_point_bearing() {
        let a = Point::new(0.0, 0.0);
        assert!((a.bearing_to(&Point::new(1.0, 0.0))).abs() < 1e-9);
        assert!((a.bearing_to(&Point::new(0.0, 1.0)) - std::f64::consts::FRAC_PI_2).abs() < 1e-9);
    }

    #[test]
    fn test_twist_zero() {
        assert!(Twist::zero().is_zero());
        assert!(!Twist::new(0.1, 0.0).is_zero());
    }

    #[test]
    fn test_pose_serde_roundtrip() {
        let pose = Pose {
            x: 12.5,
            y: -3.25,
            theta: std::f64::consts::PI / 3.0,
        };
        let json = serde_json::to_string(&pose).unwrap();
        let decoded: Pose = serde_json::from_str(&json).unwrap();
        assert!((decoded.x - pose.x).abs() < 1e-9);
        assert!((decoded.y - pose.y).abs() < 1e-9);
        assert!((decoded.theta - pose.theta).abs() < 1e-9);
    }

    #[test]
    fn test_robot_state_serde_roundtrip() {
        for state in [
            RobotState::Startup,
            RobotState::Idle,
            RobotState::Mowing,
            RobotState::ChargeSeek,
            RobotState::Docking,
            RobotState::Charging,
            RobotState::Emergency,
            RobotState::Error,
        ] {
            let json = serde_json::to_string(&state).unwrap();
            let decoded: RobotState = serde_json::from_str(&json).unwrap();
            assert_eq!(decoded, state);
        }
    }

    #[test]
    fn test_route_iteration() {
        let wps = vec![
            Waypoint::new(Point::new(0.0, 0.0), 0.0, 0.3, true),
            Waypoint::new(Point::new(1.0, 0.0), 0.0, 0.3, true),
            Waypoint::new(Point::new(2.0, 0.0), 0.0, 0.3, false),
        ];
        let mut route = Route::new(wps);

        assert!(!route.is_complete());
        assert_eq!(route.len(), 3);

        let first = route.next_waypoint().unwrap();
        assert!((first.position.x - 0.0).abs() < 1e-9);

        let second = route.next_waypoint().unwrap();
        assert!((second.position.x - 1.0).abs() < 1e-9);

        route.next_waypoint().unwrap();
        assert!(route.is_complete());
        assert!(route.next_waypoint().is_none());
    }

    #[test]
    fn test_route_progress() {
        let wps = vec![
            Waypoint::new(Point::new(0.0, 0.0), 0.0, 0.3, true),
            Waypoint::new(Point::new(4.0, 0.0), 0.0, 0.3, true),
        ];
        let mut route = Route::new(wps);

        assert_eq!(route.progress(), (0, 2));
        assert!((route.length_m() - 4.0).abs() < 1e-9);

        route.advance();
        assert_eq!(route.progress(), (1, 2));
        assert!((route.progress_percent() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_route_complete() {
        let mut route = Route::default();
        assert!(route.is_complete());
        assert!(route.next_waypoint().is_none());
        assert!((route.progress_percent() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_command_serde_roundtrip() {
        let commands = vec![
            Command::StartMission(MissionKind::Mowing),
            Command::StartMission(MissionKind::PointToPoint { x: 2.0, y: 3.0 }),
            Command::StopMission,
            Command::EmergencyStop,
            Command::EmergencyRelease,
            Command::ManualMove {
                linear: 0.2,
                angular: -0.1,
            },
            Command::SetBrushes { active: true },
            Command::SetFan { active: false },
            Command::ReturnToDock,
            Command::Heartbeat,
        ];
        for cmd in commands {
            let json = serde_json::to_string(&cmd).unwrap();
            let decoded: Command = serde_json::from_str(&json).unwrap();
            assert_eq!(decoded, cmd);
        }
    }

    #[test]
    fn test_sensor_frame_default_invalid() {
        let frame = SensorFrame::default();
        assert!(!frame.imu.valid);
        assert!(!frame.gps.valid);
        assert!(!frame.power.valid);
        assert!(!frame.bumper.valid);
        assert!(!frame.encoders.valid);
        assert!(!frame.estop.valid);
    }

    #[test]
    fn test_motor_status_default() {
        let status = MotorStatus::default();
        assert_eq!(status.left_speed, 0.0);
        assert_eq!(status.right_speed, 0.0);
        assert!(!status.main_brush);
        assert!(!status.fan);
        assert!(!status.active);
    }

    #[test]
    fn test_dynamic_obstacle_at() {
        let obs = DynamicObstacle::at(Point::new(1.0, 2.0), 0.3, 0.9);
        assert!((obs.radius - 0.3).abs() < 1e-9);
        assert!(obs.track_id.is_none());
        assert_eq!(obs.speed, 0.0);
    }
}
