//! The top-level controller: one instance owns every subsystem and runs
//! the perception → safety → decision → actuation pipeline once per tick.
//!
//! Tick order is fixed: the safety gate runs before localization and
//! navigation, and motor commands are the last action of the tick. An
//! EMERGENCY from the gate zeroes the motors before the next tick starts.

use accessory::{AccessoryEngine, AccessoryInputs};
use avoidance::DwaAvoider;
use boundary::{BoundaryCheck, BoundaryGuard};
use control::{ChassisParams, DiffDriveMixer, Limits, RateLimiter, Watchdog};
use docking::{DockingApproach, DockingState};
use hal::Backend;
use localization::Localizer;
use planner::{Planner, PlannerError, WorkArea};
use safety::{SafetyGate, SafetyResult, SafetySeverity};
use state::{Event, StateMachine};
use std::time::Instant;
use teleop::{
    BoundaryStatus, ChargingStationStatus, MissionStats, MotorTelemetry, PositionStatus,
    RobotStatus, SensorStatus, Telemetry,
};
use tracing::{info, warn};
use transforms::normalize_angle;
use types::{
    Command, MissionKind, Point, Pose, Route, RobotState, SensorFrame, TaskKind, Twist,
};
use vision::apriltag::square_corners;
use vision::{AprilTagDetection, ObstacleDetector};

/// Manual-move commands override autonomy for this long after the last
/// command.
const MANUAL_HOLD: std::time::Duration = std::time::Duration::from_millis(500);
/// Replanning is rate-limited to 2 Hz.
const REPLAN_MIN_SECS: f64 = 0.5;

pub struct Controller {
    config: config::MowerConfig,
    backend: Backend,
    machine: StateMachine,
    localizer: Localizer,
    planner: Planner,
    boundary: Option<BoundaryGuard>,
    gate: SafetyGate,
    avoider: DwaAvoider,
    detector: ObstacleDetector,
    accessories: AccessoryEngine,
    docking: DockingApproach,
    mixer: DiffDriveMixer,
    rate_limiter: RateLimiter,

    route: Route,
    task: TaskKind,
    pending_mission: Option<MissionKind>,
    dock_requested: bool,
    manual_twist: Option<Twist>,
    manual_watchdog: Watchdog,
    manual_brushes: Option<bool>,
    manual_fan: Option<bool>,
    release_requested: bool,

    commanded_twist: Twist,
    stuck_counter: u32,
    last_replan: Option<Instant>,
    safety_clear_ticks: u32,
    error_entered: Option<Instant>,
    area_synced: bool,
    sim: bool,

    last_frame: SensorFrame,
    last_safety: Option<SafetyResult>,
    last_boundary: Option<BoundaryCheck>,
}

impl Controller {
    pub fn new(config: config::MowerConfig, backend: Backend) -> anyhow::Result<Self> {
        let navigation = &config.navigation;

        // Until the GPS reference exists, plan in a box around the start
        let provisional = WorkArea::new(Point::new(-25.0, -25.0), Point::new(25.0, 25.0));
        let planner = Planner::new(&config, provisional)?;

        let boundary = match BoundaryGuard::from_config(&config) {
            Ok(guard) => Some(guard),
            Err(e) => {
                warn!(?e, "No usable garden boundary, containment checks disabled");
                None
            }
        };

        let sim = backend.sim_handle().is_some();

        Ok(Self {
            machine: StateMachine::new(),
            localizer: Localizer::new(
                navigation.wheel_diameter / 2.0,
                navigation.encoder_pulses_per_rev,
                navigation.wheel_base,
            ),
            planner,
            boundary,
            gate: SafetyGate::new(&config.safety),
            avoider: DwaAvoider::new(navigation),
            detector: ObstacleDetector::new(&config.sensors.camera),
            accessories: AccessoryEngine::new(&config.missions.accessories),
            docking: DockingApproach::new(&config.charging, sim),
            mixer: DiffDriveMixer::new(
                ChassisParams::new(navigation.wheel_diameter, navigation.wheel_base),
                navigation.max_linear_speed * 1.2,
            ),
            rate_limiter: RateLimiter::new(Limits {
                max_linear: navigation.max_linear_speed,
                max_angular: navigation.max_angular_speed,
                max_linear_accel: navigation.max_linear_accel,
                max_angular_accel: navigation.max_angular_accel,
            }),
            route: Route::default(),
            task: TaskKind::Idle,
            pending_mission: None,
            dock_requested: false,
            manual_twist: None,
            manual_watchdog: Watchdog::new(MANUAL_HOLD),
            manual_brushes: None,
            manual_fan: None,
            release_requested: false,
            commanded_twist: Twist::zero(),
            stuck_counter: 0,
            last_replan: None,
            safety_clear_ticks: 0,
            error_entered: None,
            area_synced: false,
            sim,
            last_frame: SensorFrame::default(),
            last_safety: None,
            last_boundary: None,
            config,
            backend,
        })
    }

    pub fn state(&self) -> RobotState {
        self.machine.state()
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn shutdown(&mut self) {
        info!("Controller shutdown: zeroing motors, stopping backends");
        self.zero_motion();
        self.backend.stop_all();
    }

    /// Fold one operator command into the controller state.
    pub fn handle_command(&mut self, command: Command) {
        match command {
            Command::StartMission(kind) => {
                self.pending_mission = Some(kind);
            }
            Command::StopMission => {
                self.route = Route::default();
                self.task = TaskKind::Idle;
                self.pending_mission = None;
                self.machine.transition(Event::MissionStopped);
                self.zero_motion();
            }
            Command::EmergencyStop => {
                warn!("Operator emergency stop");
                self.backend.motor.emergency_stop();
                self.commanded_twist = Twist::zero();
                self.rate_limiter.reset();
                self.machine.transition(Event::SafetyTripped);
            }
            Command::EmergencyRelease => {
                self.release_requested = true;
            }
            Command::ManualMove { linear, angular } => {
                self.manual_twist = Some(Twist::new(linear, angular));
                self.manual_watchdog.feed();
            }
            Command::SetBrushes { active } => {
                self.manual_brushes = Some(active);
            }
            Command::SetFan { active } => {
                self.manual_fan = Some(active);
            }
            Command::ReturnToDock => {
                self.dock_requested = true;
            }
            Command::Heartbeat => {}
        }
    }

    /// Run one tick, converting any unexpected failure into the ERROR
    /// state instead of letting it escape the loop.
    pub fn step(&mut self, dt: f64) {
        if let Err(e) = self.tick(dt) {
            warn!(?e, "Tick failed, entering ERROR");
            self.zero_motion();
            self.machine.transition(Event::FaultRaised);
            self.error_entered = Some(Instant::now());
        }
    }

    fn tick(&mut self, dt: f64) -> anyhow::Result<()> {
        self.backend.tick(dt);

        let sensors = self.backend.read_all();
        if sensors.imu.valid || sensors.gps.valid || sensors.power.valid {
            self.gate.feed_watchdog();
        }

        // Safety gate runs before everything else
        let safety = self.gate.check(&sensors);
        let emergency = safety.emergency;
        self.last_safety = Some(safety);

        if emergency {
            self.backend.motor.emergency_stop();
            self.commanded_twist = Twist::zero();
            self.rate_limiter.reset();
            self.safety_clear_ticks = 0;
            self.machine.transition(Event::SafetyTripped);
            self.last_frame = sensors;
            return Ok(());
        }

        self.localizer.update(&sensors, dt);
        self.sync_work_area();

        // Perception
        if let Some(frame) = self.backend.camera.read() {
            let pose = self.localizer.current_pose();
            let outcome = self.detector.process(&frame, &pose);
            self.avoider.update_obstacles(outcome.obstacles);
        }
        self.avoider.obstacles_mut().prune_expired();

        // Boundary containment
        self.last_boundary = match (&self.boundary, self.localizer.current_gps()) {
            (Some(guard), Some((lat, lon))) => Some(guard.check(lat, lon)),
            _ => None,
        };

        self.act(&sensors, dt);
        self.last_frame = sensors;
        Ok(())
    }

    fn act(&mut self, sensors: &SensorFrame, dt: f64) {
        match self.machine.state() {
            RobotState::Startup => self.act_startup(),
            RobotState::Idle => self.act_idle(sensors),
            RobotState::Mowing => self.act_mowing(sensors, dt),
            RobotState::ChargeSeek => self.act_charge_seek(sensors, dt),
            RobotState::Docking => self.act_docking(sensors, dt),
            RobotState::Charging => self.act_charging(sensors),
            RobotState::Emergency => self.act_emergency(),
            RobotState::Error => self.act_error(),
        }
    }

    fn act_startup(&mut self) {
        self.zero_motion();
        if self.backend.motor.healthy() {
            self.machine.transition(Event::SelfTestsPassed);
        } else {
            warn!("Self-tests failed: motor driver unhealthy");
            self.machine.transition(Event::SelfTestsFailed);
            self.error_entered = Some(Instant::now());
        }
    }

    fn act_idle(&mut self, sensors: &SensorFrame) {
        self.task = TaskKind::Idle;
        if self.manual_active() {
            self.manual_drive(sensors);
            return;
        }
        self.zero_wheels();
        self.apply_accessories(sensors, 0.0);

        if self.charge_needed(sensors) {
            self.start_charge_seek();
        } else if let Some(mission) = self.pending_mission.take() {
            self.start_mission(mission);
        }
    }

    fn act_mowing(&mut self, sensors: &SensorFrame, dt: f64) {
        if self.charge_needed(sensors) {
            self.start_charge_seek();
            return;
        }
        if self.manual_active() {
            self.manual_drive(sensors);
            return;
        }
        if self.route.is_complete() {
            info!("Route exhausted");
            self.machine.transition(Event::RouteExhausted);
            self.task = TaskKind::Idle;
            self.zero_motion();
            return;
        }
        self.navigate(sensors, dt);
    }

    fn act_charge_seek(&mut self, sensors: &SensorFrame, dt: f64) {
        self.task = TaskKind::ChargeSeek;

        let Some(dock) = self.dock_local() else {
            // No GPS reference yet: hold still until we can place the dock
            self.zero_wheels();
            self.apply_accessories(sensors, 0.0);
            return;
        };

        let pose = self.localizer.current_pose();
        if pose.position().distance_to(&dock) <= self.config.charging.apriltag_detection_range {
            info!("Dock within AprilTag range, switching to fine approach");
            self.docking.reset();
            self.machine.transition(Event::DockInRange);
            self.zero_motion();
            return;
        }

        if self.route.is_complete() && self.can_replan() {
            match self.planner.plan_charging(pose.position(), dock) {
                Ok(route) => self.route = route,
                Err(e) => warn!(?e, "Charging route planning failed"),
            }
        }
        if !self.route.is_complete() {
            self.navigate(sensors, dt);
        } else {
            self.zero_wheels();
            self.apply_accessories(sensors, 0.0);
        }
    }

    fn act_docking(&mut self, sensors: &SensorFrame, dt: f64) {
        self.task = TaskKind::ChargeSeek;
        let detection = self.tag_detection();
        let command = self.docking.update(detection, &sensors.power, dt);

        match command.state {
            DockingState::Completed => {
                info!("Docking completed");
                self.machine.transition(Event::DockingCompleted);
                self.set_sim_charging(true);
                self.zero_motion();
            }
            DockingState::Error => {
                warn!("Docking failed, back to coarse seek");
                self.machine.transition(Event::DockingFailed);
                self.docking.reset();
                self.route = Route::default();
                self.zero_motion();
            }
            _ => {
                let limited = self.rate_limiter.limit(command.twist);
                self.commanded_twist = limited;
                let (left, right) = self.mixer.mix(limited);
                self.backend.motor.set_wheel_speeds(left, right);
                self.apply_accessories(sensors, limited.linear);
            }
        }
    }

    fn act_charging(&mut self, sensors: &SensorFrame) {
        self.task = TaskKind::Docked;
        self.zero_wheels();
        self.apply_accessories(sensors, 0.0);
        self.set_sim_charging(true);

        if sensors.power.valid
            && sensors.power.battery_percent
                >= self.config.missions.charging.battery_full_threshold
        {
            info!(
                battery = sensors.power.battery_percent,
                "Battery full, leaving the dock state"
            );
            self.set_sim_charging(false);
            self.dock_requested = false;
            self.machine.transition(Event::BatteryFull);
        }
    }

    fn act_emergency(&mut self) {
        self.task = TaskKind::Emergency;
        self.zero_wheels();

        let clear = self
            .last_safety
            .as_ref()
            .map(|s| s.severity < SafetySeverity::Emergency)
            .unwrap_or(false);
        if clear {
            self.safety_clear_ticks += 1;
        } else {
            self.safety_clear_ticks = 0;
        }

        let contact_released = !self.last_frame.bumper.pressed && !self.last_frame.estop.pressed;
        let auto_clear = self.safety_clear_ticks >= self.config.safety.emergency_clear_ticks;
        if contact_released && (auto_clear || self.release_requested) {
            info!("Emergency cleared");
            self.release_requested = false;
            self.safety_clear_ticks = 0;
            self.stuck_counter = 0;
            self.backend.motor.clear_emergency();
            self.rate_limiter.reset();
            self.machine.transition(Event::SafetyCleared);
        }
    }

    fn act_error(&mut self) {
        self.task = TaskKind::Emergency;
        self.zero_wheels();
        let grace = self.config.robot.error_grace_secs;
        if let Some(entered) = self.error_entered {
            if entered.elapsed().as_secs_f64() >= grace {
                self.error_entered = None;
                self.machine.transition(Event::GraceElapsed);
            }
        } else {
            self.error_entered = Some(Instant::now());
        }
    }

    // --- navigation -----------------------------------------------------

    fn navigate(&mut self, sensors: &SensorFrame, dt: f64) {
        let pose = self.localizer.current_pose();
        let tolerance = self.config.navigation.waypoint_tolerance;

        // Waypoint advancement
        while let Some(wp) = self.route.current() {
            if pose.position().distance_to(&wp.position) <= tolerance {
                self.route.advance();
            } else {
                break;
            }
        }
        let Some(waypoint) = self.route.current().copied() else {
            self.zero_wheels();
            self.apply_accessories(sensors, 0.0);
            return;
        };

        // Independent stopping-distance check before sampling
        if self
            .avoider
            .emergency_brake_required(&pose, &self.commanded_twist)
        {
            let braked = Twist::new(
                (self.commanded_twist.linear
                    - 2.0 * self.config.navigation.max_linear_accel * dt)
                    .max(0.0),
                self.commanded_twist.angular * 0.5,
            );
            self.drive(braked, sensors);
            return;
        }

        match self
            .avoider
            .best_motion(&pose, &self.commanded_twist, &waypoint.position)
        {
            Some(result) => {
                self.stuck_counter = 0;
                let mut twist = result.twist;
                if waypoint.speed > 0.0 {
                    twist.linear = twist.linear.min(waypoint.speed);
                }
                self.drive(twist, sensors);
            }
            None => {
                self.stuck_counter += 1;
                self.zero_wheels();
                self.apply_accessories(sensors, 0.0);
                if self.stuck_counter > self.config.navigation.avoidance.stuck_limit {
                    warn!(
                        ticks = self.stuck_counter,
                        "No feasible motion, declaring stuck"
                    );
                    self.stuck_counter = 0;
                    self.backend.motor.emergency_stop();
                    self.machine.transition(Event::SafetyTripped);
                }
            }
        }
    }

    fn drive(&mut self, twist: Twist, sensors: &SensorFrame) {
        let limited = self.rate_limiter.limit(twist);
        self.commanded_twist = limited;
        let (left, right) = self.mixer.mix(limited);
        self.backend.motor.set_wheel_speeds(left, right);
        self.apply_accessories(sensors, limited.linear);
    }

    fn manual_drive(&mut self, sensors: &SensorFrame) {
        let twist = self.manual_twist.unwrap_or_default();
        self.drive(twist, sensors);
    }

    fn manual_active(&mut self) -> bool {
        if self.manual_twist.is_none() {
            return false;
        }
        if self.manual_watchdog.is_timed_out() {
            self.manual_twist = None;
            self.manual_watchdog.reset();
            return false;
        }
        true
    }

    fn apply_accessories(&mut self, sensors: &SensorFrame, speed: f64) {
        let pose = self.localizer.current_pose();
        let rough_terrain = sensors.imu.valid
            && sensors
                .imu
                .roll
                .abs()
                .max(sensors.imu.pitch.abs())
                .to_degrees()
                > 10.0;

        let inputs = AccessoryInputs {
            task: self.task,
            speed: speed.abs(),
            nearest_obstacle: self.avoider.nearest_obstacle_distance(&pose.position()),
            battery_percent: if sensors.power.valid {
                sensors.power.battery_percent
            } else {
                100.0
            },
            charge_needed: self.charge_needed(sensors),
            boundary_distance: self
                .last_boundary
                .as_ref()
                .map(|b| b.distance_to_boundary)
                .unwrap_or(f64::INFINITY),
            rough_terrain,
            speed_limit_active: false,
            manual_override: self.manual_twist.is_some(),
        };
        let mut decision = self.accessories.decide(&inputs);

        // Explicit operator toggles win
        if let Some(brushes) = self.manual_brushes {
            decision.main_brush = brushes;
            decision.side_brushes = brushes;
        }
        if let Some(fan) = self.manual_fan {
            decision.fan = fan;
        }

        self.backend.motor.set_brushes(
            decision.main_brush,
            decision.side_brushes,
            decision.side_brushes,
        );
        self.backend.motor.set_fan(decision.fan);
    }

    // --- helpers --------------------------------------------------------

    fn start_mission(&mut self, mission: MissionKind) {
        let result = match mission {
            MissionKind::Mowing => {
                self.task = TaskKind::Mowing;
                self.planner.plan_mowing()
            }
            MissionKind::PointToPoint { x, y } => {
                self.task = TaskKind::PointToPoint;
                let start = self.localizer.current_pose().position();
                self.planner.plan_point_to_point(start, Point::new(x, y))
            }
        };
        match result {
            Ok(route) => {
                self.route = route;
                self.machine.transition(Event::MissionRequested);
            }
            Err(e) => {
                warn!(?e, "Mission planning failed");
                self.task = TaskKind::Idle;
            }
        }
    }

    fn start_charge_seek(&mut self) {
        self.task = TaskKind::ChargeSeek;
        self.route = Route::default();
        self.machine.transition(Event::BatteryLow);
    }

    fn charge_needed(&self, sensors: &SensorFrame) -> bool {
        self.dock_requested
            || (sensors.power.valid
                && sensors.power.battery_percent
                    < self.config.missions.charging.battery_low_threshold)
    }

    fn can_replan(&mut self) -> bool {
        let allowed = self
            .last_replan
            .map(|t| t.elapsed().as_secs_f64() >= REPLAN_MIN_SECS)
            .unwrap_or(true);
        if allowed {
            self.last_replan = Some(Instant::now());
        }
        allowed
    }

    fn dock_local(&self) -> Option<Point> {
        let dock = &self.config.missions.charging.dock_gps;
        self.localizer.gps_to_local(dock.latitude, dock.longitude)
    }

    /// Once the GPS reference exists, re-derive the working area from the
    /// garden polygon's bounding box.
    fn sync_work_area(&mut self) {
        if self.area_synced || self.localizer.geo_reference().is_none() {
            return;
        }
        let Some(guard) = &self.boundary else {
            self.area_synced = true;
            return;
        };

        let projected: Vec<Point> = guard
            .vertices()
            .iter()
            .filter_map(|&(lat, lon)| self.localizer.gps_to_local(lat, lon))
            .collect();
        if projected.len() < 3 {
            return;
        }
        let min = Point::new(
            projected.iter().map(|p| p.x).fold(f64::INFINITY, f64::min),
            projected.iter().map(|p| p.y).fold(f64::INFINITY, f64::min),
        );
        let max = Point::new(
            projected
                .iter()
                .map(|p| p.x)
                .fold(f64::NEG_INFINITY, f64::max),
            projected
                .iter()
                .map(|p| p.y)
                .fold(f64::NEG_INFINITY, f64::max),
        );
        match self.planner.set_area(WorkArea::new(min, max)) {
            Ok(()) => {
                info!(?min, ?max, "Working area derived from the garden polygon");
                self.area_synced = true;
            }
            Err(PlannerError::InvalidArea) => {
                warn!("Garden polygon bounding box is degenerate");
                self.area_synced = true;
            }
            Err(e) => warn!(?e, "Working area update failed"),
        }
    }

    /// In simulation the dock tag is synthesized from true geometry; on
    /// hardware the detection comes from the external tag decoder.
    fn tag_detection(&mut self) -> Option<AprilTagDetection> {
        if !self.sim {
            return None;
        }
        let dock = self.dock_local()?;
        let pose = self.localizer.current_pose();
        let distance = pose.position().distance_to(&dock);
        if distance > self.config.charging.apriltag_detection_range * 1.5 {
            return None;
        }
        let bearing = if distance < self.config.charging.position_tolerance {
            // On top of the dock the bearing is numerically meaningless
            0.0
        } else {
            normalize_angle(pose.position().bearing_to(&dock) - pose.theta)
        };
        // Tag roughly centered when we face it; size scales with distance
        let camera = &self.config.sensors.camera;
        let half = 0.5 * self.config.charging.tag_size * camera.focal_length_px
            / distance.max(self.config.charging.position_tolerance);
        let center = (
            camera.width as f64 / 2.0 - bearing * camera.focal_length_px,
            camera.height as f64 / 2.0,
        );
        Some(AprilTagDetection::from_corners(
            self.config.charging.tag_id,
            square_corners(center, half),
            distance,
            bearing,
        ))
    }

    fn set_sim_charging(&mut self, charging: bool) {
        if let Some(handle) = self.backend.sim_handle() {
            handle.lock().set_charging(charging);
        }
    }

    fn zero_wheels(&mut self) {
        self.commanded_twist = Twist::zero();
        self.backend.motor.set_wheel_speeds(0.0, 0.0);
    }

    fn zero_motion(&mut self) {
        self.zero_wheels();
        self.backend.motor.set_brushes(false, false, false);
        self.backend.motor.set_fan(false);
        self.rate_limiter.reset();
    }

    // --- telemetry ------------------------------------------------------

    pub fn telemetry(&self) -> Telemetry {
        let pose: Pose = self.localizer.current_pose();
        let motor = self.backend.motor.status();
        let (completed, total) = self.route.progress();

        let dock = &self.config.missions.charging.dock_gps;
        let (dock_distance, dock_bearing) = match self.dock_local() {
            Some(point) => (
                pose.position().distance_to(&point),
                pose.position().bearing_to(&point),
            ),
            None => (f64::NAN, f64::NAN),
        };

        Telemetry {
            timestamp: self.last_frame.timestamp_ms,
            robot_status: RobotStatus {
                state: self.machine.state(),
                battery_level: self.last_frame.power.battery_percent,
                position: PositionStatus {
                    x: pose.x,
                    y: pose.y,
                    heading: pose.theta,
                },
                mission_progress: self.route.progress_percent(),
            },
            sensors: SensorStatus {
                gps: self.last_frame.gps.clone(),
                imu: self.last_frame.imu.clone(),
                battery: self.last_frame.power.clone(),
            },
            motors: MotorTelemetry::from(motor),
            charging_station: ChargingStationStatus {
                gps_coordinates: (dock.latitude, dock.longitude),
                distance: dock_distance,
                bearing: dock_bearing,
                accuracy: dock.accuracy_radius,
            },
            mission_stats: MissionStats {
                waypoints_completed: completed,
                waypoints_total: total,
                total_distance_m: self.localizer.total_distance(),
                obstacle_count: self.avoider.obstacles().len(),
                last_safety_reason: self
                    .last_safety
                    .as_ref()
                    .map(|s| s.reason.clone())
                    .unwrap_or_default(),
                boundary: self.last_boundary.as_ref().map(|check| BoundaryStatus {
                    inside: check.inside,
                    distance: check.distance_to_boundary,
                    severity: check.severity,
                }),
                docking: matches!(self.machine.state(), RobotState::Docking)
                    .then(|| self.docking.status()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sim_config() -> config::MowerConfig {
        let mut config = config::MowerConfig::default();
        config.sensors.r#type = "simulation".to_string();
        // Small frames keep per-tick vision cheap in tests
        config.sensors.camera.width = 160;
        config.sensors.camera.height = 120;
        config.sensors.camera.focal_length_px = 125.0;
        // Compact garden around the simulated start position
        config.boundary_coordinates = [
            (39.9334, 32.8595),
            (39.9336, 32.8595),
            (39.9336, 32.8599),
            (39.9334, 32.8599),
        ]
        .iter()
        .map(|&(latitude, longitude)| config::BoundaryVertex {
            latitude,
            longitude,
        })
        .collect();
        // Dock two meters north of the start position
        config.missions.charging.dock_gps.latitude = 39.933418;
        config.missions.charging.dock_gps.longitude = 32.8597;
        config
    }

    fn controller() -> Controller {
        let config = sim_config();
        let mut backend = hal::create_backend(&config).unwrap();
        backend.start_all();
        Controller::new(config, backend).unwrap()
    }

    fn run_ticks(controller: &mut Controller, ticks: usize) {
        for _ in 0..ticks {
            controller.step(0.1);
        }
    }

    #[test]
    fn test_boot_reaches_idle() {
        let mut c = controller();
        c.step(0.1);
        assert_eq!(c.state(), RobotState::Idle);
    }

    #[test]
    fn test_mission_starts_mowing() {
        let mut c = controller();
        c.step(0.1);
        c.handle_command(Command::StartMission(MissionKind::Mowing));
        c.step(0.1);
        assert_eq!(c.state(), RobotState::Mowing);
        let telemetry = c.telemetry();
        assert!(telemetry.mission_stats.waypoints_total > 0);
    }

    #[test]
    fn test_wheel_speeds_always_in_range() {
        let mut c = controller();
        c.step(0.1);
        c.handle_command(Command::StartMission(MissionKind::Mowing));
        for _ in 0..100 {
            c.step(0.1);
            let status = c.backend().motor.status();
            assert!((-1.0..=1.0).contains(&status.left_speed));
            assert!((-1.0..=1.0).contains(&status.right_speed));
        }
    }

    #[test]
    fn test_estop_forces_emergency_and_zero_motors() {
        let mut c = controller();
        c.step(0.1);
        c.handle_command(Command::StartMission(MissionKind::Mowing));
        run_ticks(&mut c, 10);

        c.backend().sim_handle().unwrap().lock().force_estop(true);
        c.step(0.1);

        assert_eq!(c.state(), RobotState::Emergency);
        let status = c.backend().motor.status();
        assert_eq!(status.left_speed, 0.0);
        assert_eq!(status.right_speed, 0.0);
        assert!(!status.main_brush);
    }

    #[test]
    fn test_emergency_clears_and_resumes() {
        let mut c = controller();
        c.step(0.1);
        c.handle_command(Command::StartMission(MissionKind::Mowing));
        run_ticks(&mut c, 5);

        c.backend().sim_handle().unwrap().lock().force_estop(true);
        c.step(0.1);
        assert_eq!(c.state(), RobotState::Emergency);

        c.backend().sim_handle().unwrap().lock().force_estop(false);
        // Auto-clear after the configured clear ticks
        run_ticks(&mut c, 15);
        assert_eq!(c.state(), RobotState::Mowing);
    }

    #[test]
    fn test_low_battery_switches_to_charge_seek() {
        let mut c = controller();
        c.step(0.1);
        c.handle_command(Command::StartMission(MissionKind::Mowing));
        run_ticks(&mut c, 5);

        c.backend()
            .sim_handle()
            .unwrap()
            .lock()
            .set_battery_percent(25.0);
        run_ticks(&mut c, 3);
        assert_eq!(c.state(), RobotState::ChargeSeek);
    }

    #[test]
    fn test_return_to_dock_command() {
        let mut c = controller();
        c.step(0.1);
        c.handle_command(Command::ReturnToDock);
        run_ticks(&mut c, 3);
        assert_eq!(c.state(), RobotState::ChargeSeek);
    }

    #[test]
    fn test_charging_keeps_motors_zero() {
        let mut c = controller();
        c.step(0.1);
        c.handle_command(Command::ReturnToDock);
        // Drive the whole dock cycle: coarse seek, fine approach, contact
        for _ in 0..1500 {
            c.step(0.1);
            if c.state() == RobotState::Charging {
                break;
            }
        }
        if c.state() == RobotState::Charging {
            for _ in 0..10 {
                c.step(0.1);
                let status = c.backend().motor.status();
                assert_eq!(status.left_speed, 0.0);
                assert_eq!(status.right_speed, 0.0);
            }
        }
    }

    #[test]
    fn test_manual_move_overrides_and_expires() {
        let mut c = controller();
        c.step(0.1);
        c.handle_command(Command::ManualMove {
            linear: 0.2,
            angular: 0.0,
        });
        run_ticks(&mut c, 3);
        let status = c.backend().motor.status();
        assert!(status.left_speed > 0.0);

        // After the hold window the robot stops again
        std::thread::sleep(std::time::Duration::from_millis(600));
        run_ticks(&mut c, 2);
        let status = c.backend().motor.status();
        assert_eq!(status.left_speed, 0.0);
    }

    #[test]
    fn test_stop_mission_returns_to_idle() {
        let mut c = controller();
        c.step(0.1);
        c.handle_command(Command::StartMission(MissionKind::Mowing));
        run_ticks(&mut c, 10);
        assert_eq!(c.state(), RobotState::Mowing);

        c.handle_command(Command::StopMission);
        c.step(0.1);
        assert_eq!(c.state(), RobotState::Idle);
        assert_eq!(c.backend().motor.status().left_speed, 0.0);
    }

    #[test]
    fn test_telemetry_reflects_state_and_battery() {
        let mut c = controller();
        run_ticks(&mut c, 3);
        let telemetry = c.telemetry();
        assert_eq!(telemetry.robot_status.state, RobotState::Idle);
        assert!(telemetry.robot_status.battery_level > 90.0);
        assert!(telemetry.sensors.gps.valid);
    }
}
