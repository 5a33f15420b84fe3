//! Telemetry publishing and command intake for the operator UI.
//!
//! The control loop publishes [`Telemetry`] snapshots into a watch
//! channel; connected WebSocket clients receive them as JSON at the
//! configured rate and send [`types::Command`]s back through an mpsc
//! channel. The UI itself is a separate collaborator; only this boundary
//! lives in the robot.

pub mod ws;

pub use ws::{WsConfig, WsServer};

use boundary::BoundarySeverity;
use docking::DockingStatus;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use types::{GpsReading, ImuReading, MotorStatus, PowerReading, RobotState};

#[derive(Error, Debug)]
pub enum TeleopError {
    #[error("network error: {0}")]
    Network(#[from] std::io::Error),
    #[error("websocket error: {0}")]
    WebSocket(String),
}

/// Position block of the snapshot.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PositionStatus {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
}

/// Robot block of the snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RobotStatus {
    pub state: RobotState,
    /// Battery percentage in [0, 100]
    pub battery_level: f64,
    pub position: PositionStatus,
    /// Route completion in [0, 100]
    pub mission_progress: f64,
}

/// Raw sensor block of the snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SensorStatus {
    pub gps: GpsReading,
    pub imu: ImuReading,
    pub battery: PowerReading,
}

/// Actuator block of the snapshot.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MotorTelemetry {
    pub left_speed: f64,
    pub right_speed: f64,
    pub brushes_active: bool,
    pub fan_active: bool,
}

impl From<MotorStatus> for MotorTelemetry {
    fn from(status: MotorStatus) -> Self {
        Self {
            left_speed: status.left_speed,
            right_speed: status.right_speed,
            brushes_active: status.main_brush
                || status.side_brush_left
                || status.side_brush_right,
            fan_active: status.fan,
        }
    }
}

/// Charging dock block of the snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChargingStationStatus {
    /// Dock position (lat, lon)
    pub gps_coordinates: (f64, f64),
    /// Straight-line distance from the robot (m)
    pub distance: f64,
    /// Bearing from the robot (radians)
    pub bearing: f64,
    /// Dock GPS accuracy radius (m)
    pub accuracy: f64,
}

/// Latest garden-boundary check, shaped for the UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundaryStatus {
    pub inside: bool,
    /// Distance to the nearest boundary vertex (m)
    pub distance: f64,
    pub severity: BoundarySeverity,
}

/// Mission counters and diagnostics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MissionStats {
    pub waypoints_completed: usize,
    pub waypoints_total: usize,
    /// Odometer since boot (m)
    pub total_distance_m: f64,
    /// Live obstacle count in the avoider
    pub obstacle_count: usize,
    /// Last safety gate finding, empty when clear
    pub last_safety_reason: String,
    pub boundary: Option<BoundaryStatus>,
    pub docking: Option<DockingStatus>,
}

/// One full telemetry snapshot, published every tick.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Telemetry {
    /// Milliseconds since the unix epoch
    pub timestamp: u64,
    pub robot_status: RobotStatus,
    pub sensors: SensorStatus,
    pub motors: MotorTelemetry,
    pub charging_station: ChargingStationStatus,
    pub mission_stats: MissionStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telemetry_serializes_with_expected_keys() {
        let telemetry = Telemetry::default();
        let json = serde_json::to_value(&telemetry).unwrap();

        assert!(json.get("timestamp").is_some());
        assert!(json["robot_status"].get("state").is_some());
        assert!(json["robot_status"]["position"].get("heading").is_some());
        assert!(json["sensors"].get("gps").is_some());
        assert!(json["motors"].get("left_speed").is_some());
        assert!(json["charging_station"].get("distance").is_some());
        assert!(json["mission_stats"].get("last_safety_reason").is_some());
    }

    #[test]
    fn test_telemetry_roundtrip() {
        let mut telemetry = Telemetry::default();
        telemetry.robot_status.state = RobotState::Mowing;
        telemetry.robot_status.battery_level = 72.5;
        telemetry.mission_stats.waypoints_total = 40;

        let json = serde_json::to_string(&telemetry).unwrap();
        let decoded: Telemetry = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.robot_status.state, RobotState::Mowing);
        assert!((decoded.robot_status.battery_level - 72.5).abs() < 1e-9);
        assert_eq!(decoded.mission_stats.waypoints_total, 40);
    }

    #[test]
    fn test_motor_telemetry_from_status() {
        let status = MotorStatus {
            left_speed: 0.4,
            right_speed: -0.2,
            main_brush: true,
            side_brush_left: false,
            side_brush_right: false,
            fan: false,
            active: true,
        };
        let telemetry = MotorTelemetry::from(status);
        assert!(telemetry.brushes_active);
        assert!(!telemetry.fan_active);
        assert!((telemetry.right_speed + 0.2).abs() < 1e-9);
    }
}
