//! AprilTag fine approach to the charging dock.
//!
//! The coarse GPS phase parks the robot within tag range; from there this
//! state machine rotates to find the dock tag, lines up, creeps in, and
//! confirms charge contact from the power readings.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use types::{PowerReading, Twist};
use vision::AprilTagDetection;

/// Fine-approach phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DockingState {
    /// Rotating in place, looking for the dock tag
    #[default]
    Search,
    /// Tag acquired, deciding the approach
    Detected,
    /// Driving towards the tag
    Approach,
    /// Millimetric corrections just short of the dock
    PrecisePosition,
    /// Touching the contacts, waiting for charge current
    Contact,
    Completed,
    Error,
}

/// One tick's output.
#[derive(Debug, Clone, Copy)]
pub struct DockingCommand {
    pub twist: Twist,
    pub state: DockingState,
}

/// Telemetry snapshot of the approach.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockingStatus {
    pub state: DockingState,
    pub detections: u32,
    pub missed_frames: u32,
    pub last_distance: Option<f64>,
    pub last_bearing: Option<f64>,
}

pub struct DockingApproach {
    config: config::ChargingConfig,
    state: DockingState,
    detections: u32,
    missed_frames: u32,
    contact_elapsed: f64,
    last_detection: Option<AprilTagDetection>,
    /// In simulation the charge contact completes on a short timeout
    simulation: bool,
}

/// Minimum confidence to accept a tag sighting.
const MIN_TAG_CONFIDENCE: f64 = 0.5;
/// Simulated contact completes after this long (s).
const SIM_CONTACT_SECS: f64 = 2.0;

impl DockingApproach {
    pub fn new(config: &config::ChargingConfig, simulation: bool) -> Self {
        Self {
            config: config.clone(),
            state: DockingState::Search,
            detections: 0,
            missed_frames: 0,
            contact_elapsed: 0.0,
            last_detection: None,
            simulation,
        }
    }

    pub fn state(&self) -> DockingState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, DockingState::Completed | DockingState::Error)
    }

    pub fn status(&self) -> DockingStatus {
        DockingStatus {
            state: self.state,
            detections: self.detections,
            missed_frames: self.missed_frames,
            last_distance: self.last_detection.as_ref().map(|d| d.distance),
            last_bearing: self.last_detection.as_ref().map(|d| d.bearing),
        }
    }

    /// Restart the approach from SEARCH.
    pub fn reset(&mut self) {
        info!("docking approach reset");
        self.state = DockingState::Search;
        self.detections = 0;
        self.missed_frames = 0;
        self.contact_elapsed = 0.0;
        self.last_detection = None;
    }

    /// Advance one tick with the latest tag observation and power reading.
    pub fn update(
        &mut self,
        detection: Option<AprilTagDetection>,
        power: &PowerReading,
        dt: f64,
    ) -> DockingCommand {
        // Only the configured dock tag with believable geometry counts
        let detection = detection.filter(|d| {
            d.id == self.config.tag_id && d.confidence >= MIN_TAG_CONFIDENCE
        });
        if let Some(ref d) = detection {
            self.detections += 1;
            self.missed_frames = 0;
            self.last_detection = Some(d.clone());
        }

        let old_state = self.state;
        let twist = match self.state {
            DockingState::Search => self.tick_search(&detection),
            DockingState::Detected => self.tick_detected(&detection),
            DockingState::Approach => self.tick_approach(&detection),
            DockingState::PrecisePosition => self.tick_precise(&detection),
            DockingState::Contact => self.tick_contact(power, dt),
            DockingState::Completed | DockingState::Error => Twist::zero(),
        };

        if self.state != old_state {
            info!(from = ?old_state, to = ?self.state, "docking transition");
        }

        DockingCommand {
            twist,
            state: self.state,
        }
    }

    fn tick_search(&mut self, detection: &Option<AprilTagDetection>) -> Twist {
        if detection.is_some() {
            self.state = DockingState::Detected;
            return Twist::zero();
        }
        // Slow in-place scan
        Twist::new(0.0, self.config.search_rotation_speed)
    }

    fn tick_detected(&mut self, detection: &Option<AprilTagDetection>) -> Twist {
        match detection {
            None => {
                self.state = DockingState::Search;
                Twist::zero()
            }
            Some(d) => {
                if d.distance <= self.config.precise_distance {
                    self.state = DockingState::PrecisePosition;
                } else {
                    self.state = DockingState::Approach;
                }
                Twist::zero()
            }
        }
    }

    fn tick_approach(&mut self, detection: &Option<AprilTagDetection>) -> Twist {
        let Some(d) = detection else {
            self.missed_frames += 1;
            if self.missed_frames > self.config.max_missed_frames {
                warn!(
                    missed = self.missed_frames,
                    "tag lost during approach, back to search"
                );
                self.missed_frames = 0;
                self.state = DockingState::Search;
            }
            return Twist::zero();
        };

        if d.distance <= self.config.precise_distance {
            self.state = DockingState::PrecisePosition;
            return Twist::zero();
        }

        let angle_tolerance = self.config.angle_tolerance_deg.to_radians();
        if d.bearing.abs() > angle_tolerance {
            // Square up before driving
            Twist::new(0.0, self.config.search_rotation_speed * d.bearing.signum())
        } else {
            debug!(distance = d.distance, "approaching tag");
            Twist::new(self.config.approach_speed, d.bearing * 0.5)
        }
    }

    fn tick_precise(&mut self, detection: &Option<AprilTagDetection>) -> Twist {
        let Some(d) = detection else {
            self.missed_frames += 1;
            // Stricter during the final centimeters
            if self.missed_frames > self.config.precise_missed_frames {
                warn!("tag lost during precise positioning, back to search");
                self.missed_frames = 0;
                self.state = DockingState::Search;
            }
            return Twist::zero();
        };

        let angle_tolerance = self.config.angle_tolerance_deg.to_radians();
        if d.distance <= self.config.position_tolerance && d.bearing.abs() <= angle_tolerance {
            self.state = DockingState::Contact;
            return Twist::zero();
        }

        Twist::new(self.config.precise_speed, d.bearing * 0.5)
    }

    fn tick_contact(&mut self, power: &PowerReading, dt: f64) -> Twist {
        self.contact_elapsed += dt;

        let charging = power.valid
            && power.voltage >= self.config.connect_voltage
            && power.current >= self.config.connect_current;

        if charging {
            info!(
                voltage = power.voltage,
                current = power.current,
                "charge contact confirmed"
            );
            self.state = DockingState::Completed;
        } else if self.simulation && self.contact_elapsed >= SIM_CONTACT_SECS {
            info!("simulated charge contact");
            self.state = DockingState::Completed;
        } else if self.contact_elapsed >= self.config.contact_timeout {
            warn!(
                elapsed = self.contact_elapsed,
                "no charge current, docking failed"
            );
            self.state = DockingState::Error;
        }

        Twist::zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vision::apriltag::square_corners;

    fn config() -> config::ChargingConfig {
        config::ChargingConfig::default()
    }

    fn tag(distance: f64, bearing: f64) -> AprilTagDetection {
        AprilTagDetection::from_corners(0, square_corners((320.0, 240.0), 40.0), distance, bearing)
    }

    fn idle_power() -> PowerReading {
        PowerReading {
            voltage: 10.8,
            current: 0.0,
            battery_percent: 25.0,
            valid: true,
            error: None,
        }
    }

    fn charging_power() -> PowerReading {
        PowerReading {
            voltage: 11.5,
            current: 0.3,
            battery_percent: 25.0,
            valid: true,
            error: None,
        }
    }

    #[test]
    fn test_search_rotates_in_place() {
        let mut dock = DockingApproach::new(&config(), false);
        let cmd = dock.update(None, &idle_power(), 0.1);
        assert_eq!(cmd.state, DockingState::Search);
        assert_eq!(cmd.twist.linear, 0.0);
        assert!(cmd.twist.angular.abs() > 0.0);
    }

    #[test]
    fn test_detection_moves_to_approach() {
        let mut dock = DockingApproach::new(&config(), false);
        dock.update(Some(tag(0.4, 0.0)), &idle_power(), 0.1);
        assert_eq!(dock.state(), DockingState::Detected);
        dock.update(Some(tag(0.4, 0.0)), &idle_power(), 0.1);
        assert_eq!(dock.state(), DockingState::Approach);
    }

    #[test]
    fn test_wrong_tag_id_is_ignored() {
        let mut dock = DockingApproach::new(&config(), false);
        let wrong = AprilTagDetection::from_corners(
            9,
            square_corners((320.0, 240.0), 40.0),
            0.4,
            0.0,
        );
        dock.update(Some(wrong), &idle_power(), 0.1);
        assert_eq!(dock.state(), DockingState::Search);
    }

    #[test]
    fn test_low_confidence_is_ignored() {
        let mut dock = DockingApproach::new(&config(), false);
        let mut bad = tag(0.4, 0.0);
        bad.confidence = 0.2;
        dock.update(Some(bad), &idle_power(), 0.1);
        assert_eq!(dock.state(), DockingState::Search);
    }

    #[test]
    fn test_approach_rotates_when_misaligned() {
        let mut dock = DockingApproach::new(&config(), false);
        dock.update(Some(tag(0.4, 0.0)), &idle_power(), 0.1);
        dock.update(Some(tag(0.4, 0.0)), &idle_power(), 0.1);

        // 20 degrees off: rotate only
        let cmd = dock.update(Some(tag(0.4, 0.35)), &idle_power(), 0.1);
        assert_eq!(cmd.twist.linear, 0.0);
        assert!(cmd.twist.angular > 0.0);
    }

    #[test]
    fn test_approach_drives_when_aligned() {
        let mut dock = DockingApproach::new(&config(), false);
        dock.update(Some(tag(0.4, 0.0)), &idle_power(), 0.1);
        dock.update(Some(tag(0.4, 0.0)), &idle_power(), 0.1);

        let cmd = dock.update(Some(tag(0.4, 0.01)), &idle_power(), 0.1);
        assert!(cmd.twist.linear > 0.0);
    }

    #[test]
    fn test_lost_tag_returns_to_search_after_misses() {
        let mut dock = DockingApproach::new(&config(), false);
        dock.update(Some(tag(0.4, 0.0)), &idle_power(), 0.1);
        dock.update(Some(tag(0.4, 0.0)), &idle_power(), 0.1);
        assert_eq!(dock.state(), DockingState::Approach);

        for _ in 0..=10 {
            dock.update(None, &idle_power(), 0.1);
        }
        assert_eq!(dock.state(), DockingState::Search);
    }

    #[test]
    fn test_precise_loss_is_stricter() {
        let mut dock = DockingApproach::new(&config(), false);
        dock.update(Some(tag(0.06, 0.0)), &idle_power(), 0.1);
        dock.update(Some(tag(0.06, 0.0)), &idle_power(), 0.1);
        assert_eq!(dock.state(), DockingState::PrecisePosition);

        for _ in 0..=5 {
            dock.update(None, &idle_power(), 0.1);
        }
        assert_eq!(dock.state(), DockingState::Search);
    }

    #[test]
    fn test_contact_confirms_on_charge_current() {
        let mut dock = DockingApproach::new(&config(), false);
        dock.update(Some(tag(0.06, 0.0)), &idle_power(), 0.1);
        dock.update(Some(tag(0.06, 0.0)), &idle_power(), 0.1);
        dock.update(Some(tag(0.015, 0.0)), &idle_power(), 0.1);
        assert_eq!(dock.state(), DockingState::Contact);

        dock.update(Some(tag(0.015, 0.0)), &charging_power(), 0.1);
        assert_eq!(dock.state(), DockingState::Completed);
        assert!(dock.is_terminal());
    }

    #[test]
    fn test_contact_times_out_to_error() {
        let mut dock = DockingApproach::new(
            &config::ChargingConfig {
                contact_timeout: 0.5,
                ..config()
            },
            false,
        );
        dock.update(Some(tag(0.06, 0.0)), &idle_power(), 0.1);
        dock.update(Some(tag(0.06, 0.0)), &idle_power(), 0.1);
        dock.update(Some(tag(0.015, 0.0)), &idle_power(), 0.1);

        for _ in 0..10 {
            dock.update(Some(tag(0.015, 0.0)), &idle_power(), 0.1);
        }
        assert_eq!(dock.state(), DockingState::Error);
    }

    #[test]
    fn test_sim_contact_completes_on_timeout() {
        let mut dock = DockingApproach::new(&config(), true);
        dock.update(Some(tag(0.06, 0.0)), &idle_power(), 0.1);
        dock.update(Some(tag(0.06, 0.0)), &idle_power(), 0.1);
        dock.update(Some(tag(0.015, 0.0)), &idle_power(), 0.1);
        assert_eq!(dock.state(), DockingState::Contact);

        for _ in 0..25 {
            dock.update(Some(tag(0.015, 0.0)), &idle_power(), 0.1);
        }
        assert_eq!(dock.state(), DockingState::Completed);
    }

    #[test]
    fn test_full_sequence() {
        let mut dock = DockingApproach::new(&config(), true);
        let mut states = vec![dock.state()];
        let mut distance = 0.4;

        for _ in 0..200 {
            if dock.is_terminal() {
                break;
            }
            let detection = Some(tag(distance, 0.0));
            let cmd = dock.update(detection, &idle_power(), 0.1);
            if cmd.twist.linear > 0.0 {
                distance = (distance - cmd.twist.linear * 0.1).max(0.01);
            }
            if states.last() != Some(&cmd.state) {
                states.push(cmd.state);
            }
        }

        assert_eq!(
            states,
            vec![
                DockingState::Search,
                DockingState::Detected,
                DockingState::Approach,
                DockingState::PrecisePosition,
                DockingState::Contact,
                DockingState::Completed,
            ]
        );
    }

    #[test]
    fn test_reset_restarts_search() {
        let mut dock = DockingApproach::new(&config(), false);
        dock.update(Some(tag(0.4, 0.0)), &idle_power(), 0.1);
        assert_ne!(dock.state(), DockingState::Search);
        dock.reset();
        assert_eq!(dock.state(), DockingState::Search);
        assert_eq!(dock.status().detections, 0);
    }
}
