//! Route planning for the mower.
//!
//! Two planning modes over one occupancy grid:
//! - boustrophedon coverage for mowing (strip-wise, detouring blocked
//!   cells via A*)
//! - point-to-point A* for everything else
//!
//! plus the three-regime charging approach that hands the robot over to
//! the AprilTag docker.

pub mod astar;
pub mod grid;

pub use grid::GridMap;

use std::f64::consts::{FRAC_PI_2, PI};
use thiserror::Error;
use tracing::{info, warn};
use types::{Point, Route, Waypoint};

#[derive(Error, Debug)]
pub enum PlannerError {
    #[error("no route found")]
    NoRoute,
    #[error("start or goal is not traversable")]
    Blocked,
    #[error("work area is degenerate")]
    InvalidArea,
}

/// Rectangular working area in the local frame.
#[derive(Debug, Clone, Copy)]
pub struct WorkArea {
    pub min: Point,
    pub max: Point,
}

impl WorkArea {
    pub fn new(min: Point, max: Point) -> Self {
        Self { min, max }
    }

    pub fn is_valid(&self) -> bool {
        self.max.x > self.min.x && self.max.y > self.min.y
    }
}

/// Route planner. Owns the occupancy grid; the grid is rebuilt whenever
/// the static obstacle set changes.
pub struct Planner {
    grid_resolution: f64,
    obstacle_padding: f64,
    max_nodes: usize,
    brush_width: f64,
    overlap: f64,
    mowing_speed: f64,
    apriltag_range: f64,
    dock_accuracy_radius: f64,
    gps_medium_range: f64,
    approach_speed: f64,
    precise_speed: f64,
    area: WorkArea,
    obstacles: Vec<(Point, f64)>,
    grid: GridMap,
}

impl Planner {
    pub fn new(config: &config::MowerConfig, area: WorkArea) -> Result<Self, PlannerError> {
        if !area.is_valid() {
            return Err(PlannerError::InvalidArea);
        }
        let grid_resolution = config.navigation.path_planning.grid_resolution;
        let grid = GridMap::new(area.min, area.max, grid_resolution);
        Ok(Self {
            grid_resolution,
            obstacle_padding: config.navigation.path_planning.obstacle_padding,
            max_nodes: config.navigation.path_planning.max_nodes,
            brush_width: config.missions.mowing.brush_width,
            overlap: config.missions.mowing.overlap,
            mowing_speed: config.missions.mowing.speed,
            apriltag_range: config.charging.apriltag_detection_range,
            dock_accuracy_radius: config.missions.charging.dock_gps.accuracy_radius,
            gps_medium_range: config.charging.gps_medium_range,
            approach_speed: config.charging.approach_speed,
            precise_speed: config.charging.precise_speed,
            area,
            obstacles: Vec::new(),
            grid,
        })
    }

    /// Replace the static obstacle set and rebuild the grid.
    pub fn set_obstacles(&mut self, obstacles: Vec<(Point, f64)>) {
        self.obstacles = obstacles;
        self.rebuild_grid();
    }

    pub fn set_area(&mut self, area: WorkArea) -> Result<(), PlannerError> {
        if !area.is_valid() {
            return Err(PlannerError::InvalidArea);
        }
        self.area = area;
        self.rebuild_grid();
        Ok(())
    }

    fn rebuild_grid(&mut self) {
        self.grid = GridMap::new(self.area.min, self.area.max, self.grid_resolution);
        for (center, radius) in &self.obstacles {
            self.grid.block_circle(center, radius + self.obstacle_padding);
        }
        info!(
            obstacles = self.obstacles.len(),
            width = self.grid.width(),
            height = self.grid.height(),
            "Occupancy grid rebuilt"
        );
    }

    pub fn grid(&self) -> &GridMap {
        &self.grid
    }

    pub fn area(&self) -> &WorkArea {
        &self.area
    }

    /// Strip-wise coverage of the working area. Deterministic: the same
    /// area and obstacle set always yield the same waypoint sequence.
    pub fn plan_mowing(&self) -> Result<Route, PlannerError> {
        let strip_width = self.brush_width - self.overlap;
        if strip_width <= 0.0 {
            return Err(PlannerError::InvalidArea);
        }

        let mut waypoints = Vec::new();
        let mut y = self.area.min.y;
        let mut strip = 0usize;

        while y < self.area.max.y {
            let (x_start, x_end, heading) = if strip % 2 == 0 {
                (self.area.min.x, self.area.max.x, 0.0)
            } else {
                (self.area.max.x, self.area.min.x, PI)
            };

            self.strip_waypoints(x_start, x_end, y, heading, &mut waypoints);

            y += strip_width;
            if y < self.area.max.y {
                // Turning connector to the next strip: slow, brushes off
                let turn_heading = if strip % 2 == 0 { FRAC_PI_2 } else { -FRAC_PI_2 };
                waypoints.push(Waypoint::new(
                    Point::new(x_end, y),
                    turn_heading,
                    self.mowing_speed * 0.5,
                    false,
                ));
            }
            strip += 1;
        }

        if waypoints.is_empty() {
            return Err(PlannerError::NoRoute);
        }

        let route = Route::new(waypoints);
        info!(
            waypoints = route.len(),
            length_m = format!("{:.1}", route.length_m()),
            "Mowing route generated"
        );
        Ok(route)
    }

    fn strip_waypoints(
        &self,
        x_start: f64,
        x_end: f64,
        y: f64,
        heading: f64,
        out: &mut Vec<Waypoint>,
    ) {
        let step = if x_start < x_end {
            self.grid_resolution
        } else {
            -self.grid_resolution
        };

        let mut x = x_start;
        while (step > 0.0 && x <= x_end) || (step < 0.0 && x >= x_end) {
            let point = Point::new(x, y);
            if self.grid.is_free(&point) {
                out.push(Waypoint::new(point, heading, self.mowing_speed, true));
            } else {
                // Detour around the blocked cell; brushes stay off
                let from = Point::new(x - step, y);
                let to = Point::new(x + step, y);
                if let Some(path) = astar::find_path(&self.grid, &from, &to, self.max_nodes) {
                    out.extend(path_to_waypoints(&path, self.mowing_speed * 0.7, false));
                }
            }
            x += step;
        }
    }

    /// 8-connected A* between two points in the working area.
    pub fn plan_point_to_point(&self, start: Point, goal: Point) -> Result<Route, PlannerError> {
        if !self.grid.is_free(&start) || !self.grid.is_free(&goal) {
            return Err(PlannerError::Blocked);
        }
        let path = astar::find_path(&self.grid, &start, &goal, self.max_nodes)
            .ok_or(PlannerError::NoRoute)?;
        let route = Route::new(path_to_waypoints(&path, self.mowing_speed, false));
        info!(
            waypoints = route.len(),
            length_m = format!("{:.1}", route.length_m()),
            "Point-to-point route generated"
        );
        Ok(route)
    }

    /// Coarse route to the dock. Three regimes by distance:
    /// - inside the dock GPS accuracy radius: ten dense segments with
    ///   stepwise decreasing speed, ending held `apriltag_range` short of
    ///   the dock at zero speed
    /// - medium range: direct waypoints every ~2 m, slowing near the dock
    /// - far: A* around obstacles, speed scaled by remaining distance
    pub fn plan_charging(&self, current: Point, dock: Point) -> Result<Route, PlannerError> {
        let distance = current.distance_to(&dock);
        let route = if distance <= self.dock_accuracy_radius {
            self.charging_precise(current, dock)
        } else if distance <= self.gps_medium_range {
            self.charging_medium(current, dock)
        } else {
            self.charging_far(current, dock)?
        };
        info!(
            regime = if distance <= self.dock_accuracy_radius {
                "precise"
            } else if distance <= self.gps_medium_range {
                "medium"
            } else {
                "far"
            },
            distance = format!("{:.1}", distance),
            waypoints = route.len(),
            "Charging route generated"
        );
        Ok(route)
    }

    fn charge_speeds(&self) -> (f64, f64, f64, f64, f64) {
        (
            self.mowing_speed,          // normal
            self.approach_speed,        // slow
            self.approach_speed * 0.5,  // very slow
            self.approach_speed * 0.25, // ultra slow
            self.precise_speed,         // precise
        )
    }

    fn charging_precise(&self, current: Point, dock: Point) -> Route {
        let (_, slow, very_slow, ultra_slow, precise) = self.charge_speeds();
        let bearing = current.bearing_to(&dock);
        let steps = 10;

        let mut waypoints = Vec::with_capacity(steps + 2);
        for i in 0..=steps {
            let progress = i as f64 / steps as f64;
            let point = Point::new(
                current.x + (dock.x - current.x) * progress,
                current.y + (dock.y - current.y) * progress,
            );
            let remaining = point.distance_to(&dock);
            let speed = if remaining <= self.apriltag_range {
                precise
            } else if progress > 0.8 {
                ultra_slow
            } else if progress > 0.6 {
                very_slow
            } else {
                slow
            };
            waypoints.push(Waypoint::new(point, bearing, speed, false));
        }

        // Hold short of the dock; the AprilTag approach takes over here
        let hold = Point::new(
            dock.x - self.apriltag_range * bearing.cos(),
            dock.y - self.apriltag_range * bearing.sin(),
        );
        waypoints.push(Waypoint::new(hold, bearing, 0.0, false));

        Route::new(waypoints)
    }

    fn charging_medium(&self, current: Point, dock: Point) -> Route {
        let (normal, slow, very_slow, _, _) = self.charge_speeds();
        let distance = current.distance_to(&dock);
        let bearing = current.bearing_to(&dock);
        let count = ((distance / 2.0) as usize).max(3);

        let mut waypoints = Vec::with_capacity(count + 1);
        for i in 0..=count {
            let progress = i as f64 / count as f64;
            let point = Point::new(
                current.x + (dock.x - current.x) * progress,
                current.y + (dock.y - current.y) * progress,
            );
            let remaining = point.distance_to(&dock);
            let speed = if remaining < self.dock_accuracy_radius {
                very_slow
            } else if remaining < self.dock_accuracy_radius * 2.0 {
                slow
            } else {
                normal
            };
            waypoints.push(Waypoint::new(point, bearing, speed, false));
        }
        Route::new(waypoints)
    }

    fn charging_far(&self, current: Point, dock: Point) -> Result<Route, PlannerError> {
        let (normal, slow, very_slow, _, _) = self.charge_speeds();
        let path = astar::find_path(&self.grid, &current, &dock, self.max_nodes)
            .ok_or_else(|| {
                warn!("A* could not reach the dock");
                PlannerError::NoRoute
            })?;

        let waypoints: Vec<Waypoint> = path
            .iter()
            .enumerate()
            .map(|(i, point)| {
                let heading = if i + 1 < path.len() {
                    point.bearing_to(&path[i + 1])
                } else {
                    point.bearing_to(&dock)
                };
                let remaining = point.distance_to(&dock);
                let speed = if remaining < self.apriltag_range * 2.0 {
                    very_slow
                } else if remaining < self.dock_accuracy_radius {
                    slow
                } else {
                    normal
                };
                Waypoint::new(*point, heading, speed, false)
            })
            .collect();
        Ok(Route::new(waypoints))
    }
}

/// Convert a raw path into waypoints, heading each point at its successor.
fn path_to_waypoints(path: &[Point], speed: f64, accessories_on: bool) -> Vec<Waypoint> {
    path.iter()
        .enumerate()
        .map(|(i, point)| {
            let heading = if i + 1 < path.len() {
                point.bearing_to(&path[i + 1])
            } else {
                0.0
            };
            Waypoint::new(*point, heading, speed, accessories_on)
        })
        .collect()
}
