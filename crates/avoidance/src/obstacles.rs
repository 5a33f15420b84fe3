//! Dynamic obstacle set with per-entry TTL.

use std::time::Duration;
use types::{DynamicObstacle, Point};

/// Obstacles currently considered live. Entries older than the TTL are
/// dropped on every prune pass; the detector's tracked detections replace
/// their previous entry instead of piling up.
pub struct ObstacleSet {
    obstacles: Vec<DynamicObstacle>,
    ttl: Duration,
}

impl ObstacleSet {
    pub fn new(ttl_secs: f64) -> Self {
        Self {
            obstacles: Vec::new(),
            ttl: Duration::from_secs_f64(ttl_secs),
        }
    }

    pub fn insert(&mut self, obstacle: DynamicObstacle) {
        match obstacle.track_id {
            Some(id) => {
                if let Some(existing) = self
                    .obstacles
                    .iter_mut()
                    .find(|o| o.track_id == Some(id))
                {
                    *existing = obstacle;
                } else {
                    self.obstacles.push(obstacle);
                }
            }
            None => self.obstacles.push(obstacle),
        }
    }

    pub fn upsert_all(&mut self, detections: Vec<DynamicObstacle>) {
        for detection in detections {
            self.insert(detection);
        }
    }

    /// Atomically replace the whole set.
    pub fn replace_all(&mut self, obstacles: Vec<DynamicObstacle>) {
        self.obstacles = obstacles;
    }

    /// Drop entries older than the TTL.
    pub fn prune_expired(&mut self) {
        let ttl = self.ttl;
        self.obstacles.retain(|o| o.detected_at.elapsed() < ttl);
    }

    /// Distance from `position` to the nearest obstacle edge
    /// (infinite when the set is empty).
    pub fn nearest_edge_distance(&self, position: &Point) -> f64 {
        self.obstacles
            .iter()
            .map(|o| position.distance_to(&o.position) - o.radius)
            .fold(f64::INFINITY, f64::min)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DynamicObstacle> {
        self.obstacles.iter()
    }

    pub fn len(&self) -> usize {
        self.obstacles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.obstacles.is_empty()
    }

    pub fn clear(&mut self) {
        self.obstacles.clear();
    }
}
