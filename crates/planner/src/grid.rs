//! Boolean occupancy grid over the garden bounding box.
//!
//! Rebuilt whenever the static obstacle set changes; cells blocked by an
//! obstacle carry its radius plus the configured padding.

use types::Point;

#[derive(Debug, Clone)]
pub struct GridMap {
    /// World coordinates of the bottom-left corner
    min: Point,
    /// Cell size in meters
    resolution: f64,
    width: usize,
    height: usize,
    blocked: Vec<bool>,
}

impl GridMap {
    pub fn new(min: Point, max: Point, resolution: f64) -> Self {
        let width = ((max.x - min.x) / resolution).ceil() as usize + 1;
        let height = ((max.y - min.y) / resolution).ceil() as usize + 1;
        Self {
            min,
            resolution,
            width,
            height,
            blocked: vec![false; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// Convert world coordinates to a grid cell, None when outside.
    pub fn world_to_cell(&self, point: &Point) -> Option<(usize, usize)> {
        let local_x = point.x - self.min.x;
        let local_y = point.y - self.min.y;
        if local_x < 0.0 || local_y < 0.0 {
            return None;
        }
        let gx = (local_x / self.resolution) as usize;
        let gy = (local_y / self.resolution) as usize;
        if gx < self.width && gy < self.height {
            Some((gx, gy))
        } else {
            None
        }
    }

    /// Cell center in world coordinates.
    pub fn cell_to_world(&self, gx: usize, gy: usize) -> Point {
        Point::new(
            self.min.x + (gx as f64 + 0.5) * self.resolution,
            self.min.y + (gy as f64 + 0.5) * self.resolution,
        )
    }

    /// Mark every cell within `radius` of `center` as blocked.
    pub fn block_circle(&mut self, center: &Point, radius: f64) {
        let cells = (radius / self.resolution).ceil() as i64;
        let Some((cx, cy)) = self.world_to_cell(center) else {
            return;
        };
        for dy in -cells..=cells {
            for dx in -cells..=cells {
                let gx = cx as i64 + dx;
                let gy = cy as i64 + dy;
                if gx < 0 || gy < 0 || gx >= self.width as i64 || gy >= self.height as i64 {
                    continue;
                }
                let dist = ((dx * dx + dy * dy) as f64).sqrt() * self.resolution;
                if dist <= radius {
                    self.blocked[gy as usize * self.width + gx as usize] = true;
                }
            }
        }
    }

    pub fn is_free_cell(&self, gx: usize, gy: usize) -> bool {
        if gx >= self.width || gy >= self.height {
            return false;
        }
        !self.blocked[gy * self.width + gx]
    }

    /// Free means inside the grid and not blocked.
    pub fn is_free(&self, point: &Point) -> bool {
        match self.world_to_cell(point) {
            Some((gx, gy)) => self.is_free_cell(gx, gy),
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.blocked.fill(false);
    }
}
