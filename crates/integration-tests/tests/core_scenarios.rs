//! End-to-end scenarios for the control core.
//!
//! These pin the seeded behaviors: the garden boundary quadrilateral,
//! DWA in the open and against obstacles, the emergency brake predicate,
//! the accessory decision matrix, odometry-fed localization, and the
//! hybrid GPS + AprilTag charging approach.

use accessory::{AccessoryEngine, AccessoryInputs};
use avoidance::DwaAvoider;
use boundary::{BoundaryGuard, BoundarySeverity};
use config::{BoundaryVertex, MowerConfig};
use docking::{DockingApproach, DockingState};
use localization::Localizer;
use planner::{Planner, WorkArea};
use std::f64::consts::PI;
use types::{
    DynamicObstacle, EncoderReading, Point, Pose, PowerReading, SensorFrame, TaskKind, Twist,
};
use vision::apriltag::{square_corners, AprilTagDetection};

fn seeded_quad() -> Vec<BoundaryVertex> {
    [
        (39.9335, 32.8595),
        (39.9336, 32.8599),
        (39.9333, 32.85985),
        (39.9332, 32.89454),
    ]
    .iter()
    .map(|&(latitude, longitude)| BoundaryVertex {
        latitude,
        longitude,
    })
    .collect()
}

// --- Scenario 1: boundary guard -----------------------------------------

#[test]
fn boundary_guard_seeded_quadrilateral() {
    let guard = BoundaryGuard::new(&seeded_quad(), 1.0, 2.0).unwrap();

    // Centroid is safely inside
    let (clat, clon) = guard.centroid();
    let centroid = guard.check(clat, clon);
    assert!(centroid.inside);
    assert_eq!(centroid.severity, BoundarySeverity::Safe);

    // North of the garden: danger, with a usable escape bearing
    let outside = guard.check(39.934, 32.860);
    assert_eq!(outside.severity, BoundarySeverity::Danger);
    assert!(outside.suggested_bearing >= -PI && outside.suggested_bearing <= PI);

    // Garden area sanity
    assert!(guard.area_m2() > 100.0);
}

// --- Scenario 2: DWA straight-ahead and blocked -------------------------

#[test]
fn dwa_straight_ahead_then_blocked() {
    let navigation = config::NavigationConfig::default();

    let mut dwa = DwaAvoider::new(&navigation);
    let result = dwa
        .best_motion(&Pose::default(), &Twist::zero(), &Point::new(2.0, 0.0))
        .expect("open field must be feasible");
    assert!(result.twist.linear > 0.0);
    assert!(result.twist.angular.abs() < 0.05);

    // Same goal with a blocking obstacle: either steer or report stuck
    let mut dwa = DwaAvoider::new(&navigation);
    dwa.update_obstacles(vec![DynamicObstacle::at(Point::new(1.0, 0.0), 0.3, 1.0)]);
    match dwa.best_motion(&Pose::default(), &Twist::zero(), &Point::new(2.0, 0.0)) {
        Some(result) => assert!(result.twist.angular.abs() > 1e-6),
        None => {}
    }
}

#[test]
fn dwa_surrounded_reports_stuck() {
    let mut dwa = DwaAvoider::new(&config::NavigationConfig::default());
    let ring: Vec<DynamicObstacle> = (0..16)
        .map(|i| {
            let angle = i as f64 / 16.0 * std::f64::consts::TAU;
            DynamicObstacle::at(
                Point::new(0.7 * angle.cos(), 0.7 * angle.sin()),
                0.3,
                1.0,
            )
        })
        .collect();
    dwa.update_obstacles(ring);

    assert!(dwa
        .best_motion(&Pose::default(), &Twist::zero(), &Point::new(5.0, 0.0))
        .is_none());
}

// --- Scenario 3: emergency brake ----------------------------------------

#[test]
fn emergency_brake_when_stopping_distance_exceeds_clearance() {
    let mut dwa = DwaAvoider::new(&config::NavigationConfig::default());
    dwa.update_obstacles(vec![DynamicObstacle::at(Point::new(0.6, 0.0), 0.3, 1.0)]);
    assert!(dwa.emergency_brake_required(&Pose::default(), &Twist::new(0.4, 0.0)));
}

// --- Scenario 4: accessory decision matrix ------------------------------

#[test]
fn accessory_matrix_matches_expectations() {
    let mut engine = AccessoryEngine::new(&config::AccessoriesConfig::default());

    // Ideal mowing
    let mut inputs = AccessoryInputs {
        task: TaskKind::Mowing,
        speed: 0.3,
        nearest_obstacle: 10.0,
        battery_percent: 80.0,
        boundary_distance: 5.0,
        ..AccessoryInputs::default()
    };
    let decision = engine.decide(&inputs);
    assert!(decision.main_brush && decision.side_brushes && decision.fan);

    // Critical battery: everything off
    inputs.battery_percent = 15.0;
    let decision = engine.decide(&inputs);
    assert!(!decision.main_brush && !decision.side_brushes && !decision.fan);

    // Close obstacle with recovered battery: side brushes off, fan stays
    inputs.battery_percent = 70.0;
    inputs.nearest_obstacle = 0.3;
    let decision = engine.decide(&inputs);
    assert!(!decision.side_brushes);
    assert!(decision.fan);
}

// --- Scenario 5: Kalman odometry ----------------------------------------

#[test]
fn localizer_advances_from_encoder_pulses() {
    // 0.065 m wheel radius, 360 pulses per revolution
    let mut localizer = Localizer::new(0.065, 360, 0.30);

    let frame = |left, right| SensorFrame {
        encoders: EncoderReading {
            left_pulses: left,
            right_pulses: right,
            valid: true,
            error: None,
        },
        ..SensorFrame::default()
    };

    localizer.update(&frame(0, 0), 0.1);
    localizer.update(&frame(100, 100), 0.1);

    let pose = localizer.current_pose();
    assert!(
        (pose.x - 0.113).abs() < 0.01,
        "x = {} should be near 0.113",
        pose.x
    );
    assert!(pose.theta.abs() < 0.01);
}

#[test]
fn localizer_without_gps_still_tracks() {
    let mut localizer = Localizer::new(0.065, 360, 0.30);
    let mut frame = SensorFrame::default();
    frame.encoders.valid = true;

    for i in 0..=50 {
        frame.encoders.left_pulses = i * 20;
        frame.encoders.right_pulses = i * 20;
        localizer.update(&frame, 0.1);
    }
    assert!(localizer.current_pose().x > 0.5);
    assert!(localizer.geo_reference().is_none());
}

// --- Scenario 6: hybrid charging approach -------------------------------

#[test]
fn charging_hybrid_coarse_route_then_docking() {
    let config = MowerConfig::default();

    // Robot ~20 m from the dock in the local frame
    let area = WorkArea::new(Point::new(-5.0, -5.0), Point::new(25.0, 5.0));
    let planner = Planner::new(&config, area).unwrap();
    let start = Point::new(0.0, 0.0);
    let dock = Point::new(20.0, 0.0);

    let route = planner.plan_charging(start, dock).unwrap();
    assert!(route.len() >= 2);

    // Speeds fall as the route nears the dock
    let speeds: Vec<f64> = route.waypoints().iter().map(|w| w.speed).collect();
    let first_half_min = speeds[..speeds.len() / 2]
        .iter()
        .cloned()
        .fold(f64::INFINITY, f64::min);
    let last = *speeds.last().unwrap();
    assert!(
        last <= first_half_min,
        "final speed {last} should not exceed early speeds {first_half_min}"
    );

    // Once in tag range, a high-confidence detector walks the docker
    // through to COMPLETED
    let mut docker = DockingApproach::new(&config.charging, true);
    let mut distance = config.charging.apriltag_detection_range;
    let power = PowerReading {
        voltage: 10.8,
        current: 0.0,
        battery_percent: 20.0,
        valid: true,
        error: None,
    };

    let mut seen = vec![docker.state()];
    for _ in 0..400 {
        if docker.is_terminal() {
            break;
        }
        let tag = AprilTagDetection::from_corners(
            config.charging.tag_id,
            square_corners((320.0, 240.0), 45.0),
            distance,
            0.0,
        );
        let command = docker.update(Some(tag), &power, 0.1);
        if command.twist.linear > 0.0 {
            distance = (distance - command.twist.linear * 0.1).max(0.005);
        }
        if seen.last() != Some(&command.state) {
            seen.push(command.state);
        }
    }

    assert_eq!(
        seen,
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

// --- Universal invariants ------------------------------------------------

#[test]
fn mixer_output_is_always_normalized() {
    let mixer = control::DiffDriveMixer::new(control::ChassisParams::new(0.13, 0.30), 0.6);
    for v in [-5.0, -0.5, 0.0, 0.3, 5.0] {
        for w in [-4.0, -1.0, 0.0, 1.0, 4.0] {
            let (left, right) = mixer.mix(Twist::new(v, w));
            assert!((-1.0..=1.0).contains(&left));
            assert!((-1.0..=1.0).contains(&right));
        }
    }
}

#[test]
fn sim_backend_round_trip_keeps_theta_normalized() {
    let config = {
        let mut c = MowerConfig::default();
        c.sensors.r#type = "simulation".to_string();
        c
    };
    let mut backend = hal::create_backend(&config).unwrap();
    backend.start_all();

    // Spin in place for a long time
    backend.motor.set_wheel_speeds(-1.0, 1.0);
    for _ in 0..500 {
        backend.tick(0.1);
    }
    let pose = backend.sim_handle().unwrap().lock().pose();
    assert!(pose.theta > -PI && pose.theta <= PI);
}

#[test]
fn gps_local_round_trip_is_centimeter_accurate() {
    let geo = transforms::GeoReference::new(39.9334, 32.8597);
    for &(x, y) in &[(0.0, 0.0), (10.0, 10.0), (-20.0, 15.0), (35.0, -35.0)] {
        let p = Point::new(x, y);
        let (lat, lon) = geo.to_gps(&p);
        let back = geo.to_local(lat, lon);
        assert!(back.distance_to(&p) < 0.01);
    }
}

#[test]
fn boustrophedon_is_reproducible() {
    let config = MowerConfig::default();
    let area = WorkArea::new(Point::new(0.0, 0.0), Point::new(6.0, 4.0));
    let mut planner_a = Planner::new(&config, area).unwrap();
    let mut planner_b = Planner::new(&config, area).unwrap();
    planner_a.set_obstacles(vec![(Point::new(3.0, 2.0), 0.3)]);
    planner_b.set_obstacles(vec![(Point::new(3.0, 2.0), 0.3)]);

    let a = planner_a.plan_mowing().unwrap();
    let b = planner_b.plan_mowing().unwrap();
    assert_eq!(a.len(), b.len());
    for (wa, wb) in a.waypoints().iter().zip(b.waypoints()) {
        assert!(wa.position.distance_to(&wb.position) < 1e-12);
        assert_eq!(wa.accessories_on, wb.accessories_on);
        assert!((wa.speed - wb.speed).abs() < 1e-12);
    }
}

#[test]
fn safety_emergency_precedes_motor_commands() {
    // The state machine invariant: a safety trip forces the EMERGENCY
    // state, and EMERGENCY requires motors to be zero
    let mut machine = state::StateMachine::new();
    machine.transition(state::Event::SelfTestsPassed);
    machine.transition(state::Event::MissionRequested);
    assert!(machine.is_driving());

    machine.transition(state::Event::SafetyTripped);
    assert!(machine.motors_must_be_zero());

    machine.transition(state::Event::SafetyCleared);
    assert!(machine.is_driving(), "cleared emergency resumes the mission");
}

#[test]
fn safety_gate_trips_on_forced_estop_frame() {
    let mut gate = safety::SafetyGate::new(&config::SafetyConfig::default());
    gate.feed_watchdog();

    let mut frame = SensorFrame::default();
    frame.estop.valid = true;
    frame.estop.pressed = true;
    let result = gate.check(&frame);
    assert!(result.emergency);
}
