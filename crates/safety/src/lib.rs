//! Preemptive safety gate.
//!
//! Runs before localization and navigation every tick. Checks are
//! evaluated in priority order — bumper/e-stop, tilt, battery, watchdog —
//! and the first EMERGENCY wins. An EMERGENCY result forces a motor
//! e-stop and the EMERGENCY state in the same tick.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{error, warn};
use types::SensorFrame;

/// Outcome severity, in escalation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetySeverity {
    Safe,
    Warn,
    Danger,
    Emergency,
}

/// Result of one gate evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyResult {
    pub severity: SafetySeverity,
    pub emergency: bool,
    /// The highest-priority finding
    pub reason: String,
    /// Every finding this tick
    pub details: Vec<String>,
}

impl SafetyResult {
    fn safe() -> Self {
        Self {
            severity: SafetySeverity::Safe,
            emergency: false,
            reason: String::new(),
            details: Vec::new(),
        }
    }
}

/// The safety gate. Holds the little state the checks need (previous
/// battery voltage, watchdog feed time).
pub struct SafetyGate {
    /// Tilt beyond this is an emergency (radians)
    max_tilt: f64,
    min_voltage: f64,
    drop_warn_fraction: f64,
    max_current: f64,
    watchdog_timeout: Duration,
    last_voltage: Option<f64>,
    last_feed: Option<Instant>,
}

impl SafetyGate {
    pub fn new(config: &config::SafetyConfig) -> Self {
        Self {
            max_tilt: config.max_tilt_angle.to_radians(),
            min_voltage: config.min_battery_voltage,
            drop_warn_fraction: config.battery_drop_warn_fraction,
            max_current: config.max_current,
            watchdog_timeout: Duration::from_secs_f64(config.watchdog_timeout),
            last_voltage: None,
            last_feed: None,
        }
    }

    /// Record that fresh sensor data arrived (resets the watchdog).
    pub fn feed_watchdog(&mut self) {
        self.last_feed = Some(Instant::now());
    }

    /// Evaluate one sensor frame.
    pub fn check(&mut self, frame: &SensorFrame) -> SafetyResult {
        let mut result = SafetyResult::safe();

        self.check_contact(frame, &mut result);
        self.check_tilt(frame, &mut result);
        self.check_battery(frame, &mut result);
        self.check_watchdog(&mut result);

        if result.emergency {
            error!(reason = %result.reason, "SAFETY EMERGENCY");
        } else if result.severity >= SafetySeverity::Warn {
            warn!(reason = %result.reason, "Safety warning");
        }

        result
    }

    fn escalate(result: &mut SafetyResult, severity: SafetySeverity, finding: String) {
        if severity > result.severity {
            result.severity = severity;
            result.reason = finding.clone();
        } else if result.reason.is_empty() {
            result.reason = finding.clone();
        }
        if severity == SafetySeverity::Emergency {
            result.emergency = true;
        }
        result.details.push(finding);
    }

    /// Priority 1: bumper contact or the hardware e-stop.
    fn check_contact(&self, frame: &SensorFrame, result: &mut SafetyResult) {
        if frame.estop.valid && frame.estop.pressed {
            Self::escalate(
                result,
                SafetySeverity::Emergency,
                "emergency stop asserted".into(),
            );
        }
        if frame.bumper.valid && frame.bumper.pressed {
            Self::escalate(result, SafetySeverity::Emergency, "bumper pressed".into());
        }
    }

    /// Priority 2: tilt.
    fn check_tilt(&self, frame: &SensorFrame, result: &mut SafetyResult) {
        if !frame.imu.valid {
            return;
        }
        let tilt = frame.imu.roll.abs().max(frame.imu.pitch.abs());
        if tilt > self.max_tilt {
            Self::escalate(
                result,
                SafetySeverity::Emergency,
                format!("tilt {:.1} deg over limit", tilt.to_degrees()),
            );
        } else if tilt > 0.7 * self.max_tilt {
            Self::escalate(
                result,
                SafetySeverity::Warn,
                format!("tilt {:.1} deg approaching limit", tilt.to_degrees()),
            );
        }
    }

    /// Priority 3: battery voltage, sag rate, current draw.
    fn check_battery(&mut self, frame: &SensorFrame, result: &mut SafetyResult) {
        if !frame.power.valid {
            return;
        }
        let voltage = frame.power.voltage;

        if voltage < self.min_voltage {
            Self::escalate(
                result,
                SafetySeverity::Emergency,
                format!("battery voltage {:.2} V below minimum", voltage),
            );
        }

        if let Some(last) = self.last_voltage {
            if last > 0.0 && (last - voltage) / last > self.drop_warn_fraction {
                Self::escalate(
                    result,
                    SafetySeverity::Warn,
                    format!("battery sagged {:.2} -> {:.2} V in one tick", last, voltage),
                );
            }
        }
        self.last_voltage = Some(voltage);

        if frame.power.current > self.max_current {
            Self::escalate(
                result,
                SafetySeverity::Warn,
                format!("current draw {:.1} A high", frame.power.current),
            );
        }
    }

    /// Priority 4: sensor watchdog.
    fn check_watchdog(&self, result: &mut SafetyResult) {
        match self.last_feed {
            Some(feed) if feed.elapsed() <= self.watchdog_timeout => {}
            Some(_) => {
                Self::escalate(
                    result,
                    SafetySeverity::Emergency,
                    "sensor watchdog timed out".into(),
                );
            }
            // Never fed: still booting, give the first tick a pass
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::{BumperReading, EStopReading, ImuReading, PowerReading};

    fn gate() -> SafetyGate {
        SafetyGate::new(&config::SafetyConfig::default())
    }

    fn healthy_frame() -> SensorFrame {
        SensorFrame {
            imu: ImuReading {
                roll: 0.01,
                pitch: 0.02,
                accel: [0.0, 0.0, 9.81],
                valid: true,
                ..ImuReading::default()
            },
            power: PowerReading {
                voltage: 12.4,
                current: 1.0,
                battery_percent: 90.0,
                valid: true,
                error: None,
            },
            bumper: BumperReading {
                pressed: false,
                valid: true,
                error: None,
            },
            estop: EStopReading {
                pressed: false,
                valid: true,
                error: None,
            },
            ..SensorFrame::default()
        }
    }

    #[test]
    fn test_healthy_frame_is_safe() {
        let mut gate = gate();
        gate.feed_watchdog();
        let result = gate.check(&healthy_frame());
        assert_eq!(result.severity, SafetySeverity::Safe);
        assert!(!result.emergency);
    }

    #[test]
    fn test_bumper_is_emergency() {
        let mut gate = gate();
        gate.feed_watchdog();
        let mut frame = healthy_frame();
        frame.bumper.pressed = true;
        let result = gate.check(&frame);
        assert!(result.emergency);
        assert_eq!(result.severity, SafetySeverity::Emergency);
    }

    #[test]
    fn test_estop_is_emergency_and_first_priority() {
        let mut gate = gate();
        gate.feed_watchdog();
        let mut frame = healthy_frame();
        frame.estop.pressed = true;
        frame.imu.roll = 1.0; // also over tilt
        let result = gate.check(&frame);
        assert!(result.emergency);
        assert_eq!(result.reason, "emergency stop asserted");
        assert!(result.details.len() >= 2);
    }

    #[test]
    fn test_tilt_over_limit_is_emergency() {
        let mut gate = gate();
        gate.feed_watchdog();
        let mut frame = healthy_frame();
        // Default limit 25 deg; 30 deg pitch
        frame.imu.pitch = 30.0_f64.to_radians();
        let result = gate.check(&frame);
        assert!(result.emergency);
    }

    #[test]
    fn test_tilt_near_limit_is_warning() {
        let mut gate = gate();
        gate.feed_watchdog();
        let mut frame = healthy_frame();
        // 0.7 * 25 = 17.5 deg; use 20 deg
        frame.imu.roll = 20.0_f64.to_radians();
        let result = gate.check(&frame);
        assert_eq!(result.severity, SafetySeverity::Warn);
        assert!(!result.emergency);
    }

    #[test]
    fn test_low_voltage_is_emergency() {
        let mut gate = gate();
        gate.feed_watchdog();
        let mut frame = healthy_frame();
        frame.power.voltage = 10.0;
        let result = gate.check(&frame);
        assert!(result.emergency);
    }

    #[test]
    fn test_voltage_sag_is_warning() {
        let mut gate = gate();
        gate.feed_watchdog();
        let mut frame = healthy_frame();
        frame.power.voltage = 12.5;
        gate.check(&frame);

        // 10% sag in one tick
        frame.power.voltage = 11.2;
        gate.feed_watchdog();
        let result = gate.check(&frame);
        assert_eq!(result.severity, SafetySeverity::Warn);
    }

    #[test]
    fn test_high_current_is_warning() {
        let mut gate = gate();
        gate.feed_watchdog();
        let mut frame = healthy_frame();
        frame.power.current = 7.5;
        let result = gate.check(&frame);
        assert_eq!(result.severity, SafetySeverity::Warn);
    }

    #[test]
    fn test_watchdog_timeout_is_emergency() {
        let mut gate = SafetyGate::new(&config::SafetyConfig {
            watchdog_timeout: 0.01,
            ..config::SafetyConfig::default()
        });
        gate.feed_watchdog();
        std::thread::sleep(Duration::from_millis(30));
        let result = gate.check(&healthy_frame());
        assert!(result.emergency);
    }

    #[test]
    fn test_watchdog_not_armed_before_first_feed() {
        let mut gate = gate();
        let result = gate.check(&healthy_frame());
        assert!(!result.emergency);
    }

    #[test]
    fn test_invalid_readings_do_not_trip() {
        let mut gate = gate();
        gate.feed_watchdog();
        let mut frame = healthy_frame();
        frame.imu.valid = false;
        frame.imu.roll = 2.0;
        frame.power.valid = false;
        frame.power.voltage = 0.0;
        let result = gate.check(&frame);
        assert!(!result.emergency);
    }
}
