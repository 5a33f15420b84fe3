//! Synthetic camera frames rendered from the simulation state.
//!
//! The ground plane is drawn as smooth grass so the only strong edges in
//! the frame come from obstacles; the obstacle detector then sees
//! deterministic input in tests.

use image::{Rgb, RgbImage};
use types::{Point, Pose};

/// Pinhole parameters shared with the obstacle detector.
#[derive(Debug, Clone, Copy)]
pub struct CameraModel {
    pub width: u32,
    pub height: u32,
    /// Focal length in pixels
    pub focal_px: f64,
    /// Camera height above the ground plane (m)
    pub height_m: f64,
}

impl CameraModel {
    /// Project a robot-frame ground point (forward, left) into the image.
    ///
    /// Returns (u, v) of the point where the object meets the ground, or
    /// None when it is behind the camera or above the horizon.
    pub fn project_ground(&self, forward: f64, left: f64) -> Option<(f64, f64)> {
        if forward < 0.1 {
            return None;
        }
        let cx = self.width as f64 / 2.0;
        let cy = self.height as f64 / 2.0;
        let u = cx - left * self.focal_px / forward;
        let v = cy + self.height_m * self.focal_px / forward;
        if v <= cy || v >= self.height as f64 {
            return None;
        }
        Some((u, v))
    }
}

/// Render one frame: grass gradient plus dark boxes for obstacles that
/// fall inside the field of view.
pub fn render_frame(model: &CameraModel, pose: &Pose, obstacles: &[(Point, f64)]) -> RgbImage {
    let (w, h) = (model.width, model.height);

    // Smooth grass gradient: gentle enough that the only strong edges in
    // the frame come from the obstacles themselves
    let mut frame = RgbImage::from_fn(w, h, |_, y| {
        let t = y as f64 / h as f64;
        let g = 100.0 + 60.0 * t;
        Rgb([40, g as u8, 35])
    });

    let cos_t = pose.theta.cos();
    let sin_t = pose.theta.sin();

    for &(center, radius) in obstacles {
        // World -> robot frame
        let dx = center.x - pose.x;
        let dy = center.y - pose.y;
        let forward = dx * cos_t + dy * sin_t;
        let left = -dx * sin_t + dy * cos_t;

        let Some((u, v_bottom)) = model.project_ground(forward, left) else {
            continue;
        };

        let px_w = (2.0 * radius * model.focal_px / forward).max(2.0);
        let px_h = (2.0 * radius * model.focal_px / forward).max(2.0);

        let u0 = (u - px_w / 2.0).max(0.0) as u32;
        let u1 = ((u + px_w / 2.0) as u32).min(w.saturating_sub(1));
        let v0 = (v_bottom - px_h).max(0.0) as u32;
        let v1 = (v_bottom as u32).min(h.saturating_sub(1));

        for y in v0..=v1 {
            for x in u0..=u1 {
                frame.put_pixel(x, y, Rgb([45, 40, 38]));
            }
        }
    }

    frame
}
