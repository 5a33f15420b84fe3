//! Dynamic Window Approach obstacle avoidance.
//!
//! The avoider owns the dynamic obstacle set (written by the detector,
//! read here) and prunes it by TTL before every sampling pass. Velocity
//! samples are forward-simulated with the unicycle model; colliding
//! samples are rejected and the survivor with the best weighted score
//! wins. No feasible sample means the caller's stuck handling takes over.

mod obstacles;

pub use obstacles::ObstacleSet;

use tracing::{debug, warn};
use types::{DynamicObstacle, Point, Pose, Twist};

/// Outcome of one DWA pass.
#[derive(Debug, Clone, Copy)]
pub struct DwaResult {
    pub twist: Twist,
    pub score: f64,
    /// Set when the over-speed guard produced a braking command
    pub emergency: bool,
}

pub struct DwaAvoider {
    max_linear: f64,
    max_angular: f64,
    max_linear_accel: f64,
    max_angular_accel: f64,
    robot_radius: f64,
    safety_distance: f64,
    lookahead_time: f64,
    sim_step: f64,
    velocity_resolution: f64,
    angular_resolution: f64,
    goal_weight: f64,
    obstacle_weight: f64,
    speed_weight: f64,
    smoothness_weight: f64,
    obstacles: ObstacleSet,
}

impl DwaAvoider {
    pub fn new(navigation: &config::NavigationConfig) -> Self {
        let avoidance = &navigation.avoidance;
        Self {
            max_linear: navigation.max_linear_speed,
            max_angular: navigation.max_angular_speed,
            max_linear_accel: navigation.max_linear_accel,
            max_angular_accel: navigation.max_angular_accel,
            robot_radius: avoidance.robot_radius,
            safety_distance: avoidance.safety_distance,
            lookahead_time: avoidance.lookahead_time,
            sim_step: avoidance.sim_step,
            velocity_resolution: avoidance.velocity_resolution,
            angular_resolution: avoidance.angular_resolution,
            goal_weight: avoidance.goal_weight,
            obstacle_weight: avoidance.obstacle_weight,
            speed_weight: avoidance.speed_weight,
            smoothness_weight: avoidance.smoothness_weight,
            obstacles: ObstacleSet::new(avoidance.obstacle_ttl),
        }
    }

    /// The detector publishes its detections here. Tracked obstacles
    /// replace their previous entry; untracked ones append.
    pub fn update_obstacles(&mut self, detections: Vec<DynamicObstacle>) {
        self.obstacles.upsert_all(detections);
    }

    pub fn obstacles(&self) -> &ObstacleSet {
        &self.obstacles
    }

    pub fn obstacles_mut(&mut self) -> &mut ObstacleSet {
        &mut self.obstacles
    }

    /// Distance from the robot to the nearest obstacle edge.
    pub fn nearest_obstacle_distance(&self, position: &Point) -> f64 {
        self.obstacles.nearest_edge_distance(position)
    }

    /// Stopping-distance check, independent of sampling: true when the
    /// robot can no longer stop short of the nearest obstacle.
    pub fn emergency_brake_required(&mut self, pose: &Pose, twist: &Twist) -> bool {
        self.obstacles.prune_expired();
        if twist.linear.abs() < 1e-6 {
            return false;
        }
        let stopping_distance = twist.linear.powi(2) / (2.0 * self.max_linear_accel);
        let clearance = self
            .obstacles
            .nearest_edge_distance(&pose.position())
            - self.robot_radius;
        let required = stopping_distance >= clearance;
        if required {
            warn!(
                stopping_distance,
                clearance, "emergency brake required"
            );
        }
        required
    }

    /// Pick the best feasible (v, w) towards `goal`. Returns None when
    /// every sample collides.
    pub fn best_motion(
        &mut self,
        pose: &Pose,
        current: &Twist,
        goal: &Point,
    ) -> Option<DwaResult> {
        self.obstacles.prune_expired();

        // Over-speed guard: brake hard before sampling anything
        if current.linear.abs() > self.max_linear * 1.3
            || current.angular.abs() > self.max_angular * 1.3
        {
            warn!(
                v = current.linear,
                w = current.angular,
                "over-speed guard engaged"
            );
            let braked = Twist::new(
                (current.linear - 2.0 * self.max_linear_accel * self.sim_step).max(0.0),
                current.angular * 0.5,
            );
            return Some(DwaResult {
                twist: braked,
                score: 0.0,
                emergency: true,
            });
        }

        let dt = self.sim_step;
        let v_min = (current.linear - self.max_linear_accel * dt).max(0.0);
        let v_max = (current.linear + self.max_linear_accel * dt).min(self.max_linear);
        let w_min = (current.angular - self.max_angular_accel * dt).max(-self.max_angular);
        let w_max = (current.angular + self.max_angular_accel * dt).min(self.max_angular);

        let mut best: Option<DwaResult> = None;

        let mut v = v_min;
        while v <= v_max + 1e-9 {
            let mut w = w_min;
            while w <= w_max + 1e-9 {
                if let Some(score) = self.score_sample(pose, v, w, goal) {
                    if best.map_or(true, |b| score > b.score) {
                        best = Some(DwaResult {
                            twist: Twist::new(v, w),
                            score,
                            emergency: false,
                        });
                    }
                }
                w += self.angular_resolution;
            }
            v += self.velocity_resolution;
        }

        match &best {
            Some(result) => debug!(
                v = result.twist.linear,
                w = result.twist.angular,
                score = result.score,
                "DWA selected"
            ),
            None => debug!("DWA found no feasible sample"),
        }
        best
    }

    /// Forward-simulate one (v, w) sample; None when it collides.
    fn score_sample(&self, pose: &Pose, v: f64, w: f64, goal: &Point) -> Option<f64> {
        let mut x = pose.x;
        let mut y = pose.y;
        let mut theta = pose.theta;

        let start_goal_distance = pose.position().distance_to(goal);
        let lookahead_distance = (self.max_linear * self.lookahead_time).max(1e-6);
        let mut min_clearance = f64::INFINITY;

        let steps = (self.lookahead_time / self.sim_step).round() as usize;
        for _ in 0..steps.max(1) {
            if w.abs() >= 1e-3 {
                let r = v / w;
                let dtheta = w * self.sim_step;
                x += r * ((theta + dtheta).sin() - theta.sin());
                y += r * (theta.cos() - (theta + dtheta).cos());
                theta += dtheta;
            } else {
                x += v * theta.cos() * self.sim_step;
                y += v * theta.sin() * self.sim_step;
            }

            let position = Point::new(x, y);
            for obstacle in self.obstacles.iter() {
                let clearance = position.distance_to(&obstacle.position)
                    - obstacle.radius
                    - self.robot_radius
                    - self.safety_distance;
                if clearance < 0.0 {
                    return None;
                }
                min_clearance = min_clearance.min(clearance);
            }
        }

        let end_goal_distance = Point::new(x, y).distance_to(goal);
        let goal_progress = (start_goal_distance - end_goal_distance) / lookahead_distance;
        let clearance_norm = if min_clearance.is_finite() {
            (min_clearance / lookahead_distance).clamp(0.0, 1.0)
        } else {
            1.0
        };
        let speed_term = v / self.max_linear;
        let smooth_term = 1.0 - (w.abs() / self.max_angular).min(1.0);

        Some(
            self.goal_weight * goal_progress
                + self.obstacle_weight * clearance_norm
                + self.speed_weight * speed_term
                + self.smoothness_weight * smooth_term,
        )
    }
}
