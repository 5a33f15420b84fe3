//! Classical-CV obstacle detection from camera frames.
//!
//! Pipeline: grayscale → gaussian blur → Canny (adaptive-threshold
//! fallback on flat frames) → morphological close/open → contours →
//! area/aspect filtering → flat-ground projection into the robot frame.
//! Detections then run through the tracker and a confidence/temporal
//! filter before anything reaches the avoider.

use crate::tracker::ObstacleTracker;
use image::RgbImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::contrast::adaptive_threshold;
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::{close, open};
use tracing::{debug, trace};
use types::{DynamicObstacle, Point, Pose};

/// Aspect-ratio gate for plausible obstacles.
const MIN_ASPECT: f64 = 0.2;
const MAX_ASPECT: f64 = 5.0;
/// Spatial gate for the cross-frame confidence boost (m).
const REDETECTION_RADIUS: f64 = 0.3;
/// Detections are forwarded only from this frame on.
const WARMUP_FRAMES: u64 = 3;

/// One frame's result.
#[derive(Debug, Default)]
pub struct DetectionOutcome {
    pub obstacles: Vec<DynamicObstacle>,
    /// An obstacle sits inside the close-range band
    pub emergency: bool,
}

pub struct ObstacleDetector {
    detection: config::DetectionConfig,
    focal_px: f64,
    camera_height: f64,
    tracker: ObstacleTracker,
    frames_processed: u64,
    /// Robot-frame positions seen in the previous frame
    previous_positions: Vec<Point>,
}

impl ObstacleDetector {
    pub fn new(camera: &config::CameraConfig) -> Self {
        Self {
            detection: camera.detection.clone(),
            focal_px: camera.focal_length_px,
            camera_height: camera.height_m,
            tracker: ObstacleTracker::new(
                camera.detection.tracking_history,
                camera.detection.max_tracking_distance,
            ),
            frames_processed: 0,
            previous_positions: Vec::new(),
        }
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Run the full pipeline on one frame.
    pub fn process(&mut self, frame: &RgbImage, pose: &Pose) -> DetectionOutcome {
        self.frames_processed += 1;

        let gray = image::imageops::grayscale(frame);
        let blurred = gaussian_blur_f32(&gray, 1.4);

        let mut edges = canny(&blurred, self.detection.canny_low, self.detection.canny_high);
        if edges.pixels().all(|p| p.0[0] == 0) {
            // Flat lighting defeats Canny; fall back to local thresholding
            edges = adaptive_threshold(&blurred, 12);
        }

        let cleaned = open(&close(&edges, Norm::LInf, 2), Norm::LInf, 1);
        let contours = find_contours::<i32>(&cleaned);

        let cx = frame.width() as f64 / 2.0;
        let cy = frame.height() as f64 / 2.0;

        let mut detections: Vec<DynamicObstacle> = Vec::new();
        let mut emergency = false;

        for contour in &contours {
            if contour.border_type != BorderType::Outer || contour.points.is_empty() {
                continue;
            }

            let (min_u, max_u, min_v, max_v) = bounding_box(&contour.points);
            let width = (max_u - min_u) as f64;
            let height = (max_v - min_v) as f64;
            let area = width * height;

            if area < self.detection.min_contour_area || area > self.detection.max_contour_area {
                continue;
            }
            let aspect = if height > 0.0 { width / height } else { 0.0 };
            if !(MIN_ASPECT..=MAX_ASPECT).contains(&aspect) {
                continue;
            }

            // Project the bounding-box bottom-center onto the ground plane
            let u = (min_u + max_u) as f64 / 2.0;
            let v = max_v as f64;
            if v <= cy + 1.0 {
                // Above the horizon: not on the ground plane
                continue;
            }
            let forward = self.camera_height * self.focal_px / (v - cy);
            let lateral = -(u - cx) * forward / self.focal_px;

            let width_m = width * forward / self.focal_px;
            let height_m = height * forward / self.focal_px;
            let radius = (0.5 * width_m.max(height_m)).clamp(0.05, 1.5);

            if forward < self.detection.close_range {
                emergency = true;
            }

            // World-frame position
            let cos_t = pose.theta.cos();
            let sin_t = pose.theta.sin();
            let position = Point::new(
                pose.x + forward * cos_t - lateral * sin_t,
                pose.y + forward * sin_t + lateral * cos_t,
            );

            let confidence = self.confidence(area, aspect, forward, &Point::new(forward, lateral));
            trace!(forward, lateral, radius, confidence, "contour detection");

            let mut obstacle = DynamicObstacle::at(position, radius, confidence);
            obstacle.heading = pose.theta;
            detections.push(obstacle);
        }

        // Remember this frame's robot-frame positions for the next boost
        self.previous_positions = detections
            .iter()
            .map(|d| robot_frame(pose, &d.position))
            .collect();

        self.tracker.assign(&mut detections);

        // Stability warm-up, then the confidence gate
        if self.frames_processed < WARMUP_FRAMES {
            return DetectionOutcome {
                obstacles: Vec::new(),
                emergency,
            };
        }
        let threshold = self.detection.detection_threshold;
        let obstacles: Vec<DynamicObstacle> = detections
            .into_iter()
            .filter(|d| d.confidence >= threshold)
            .collect();

        debug!(
            count = obstacles.len(),
            emergency, "detection frame processed"
        );
        DetectionOutcome {
            obstacles,
            emergency,
        }
    }

    /// Confidence from blob geometry plus a redetection boost.
    fn confidence(&self, area: f64, aspect: f64, forward: f64, robot_frame_pos: &Point) -> f64 {
        let area_span =
            (self.detection.max_contour_area - self.detection.min_contour_area).max(1.0);
        let area_score = ((area - self.detection.min_contour_area) / area_span).clamp(0.0, 1.0);
        let symmetry = if aspect > 0.0 {
            aspect.min(1.0 / aspect)
        } else {
            0.0
        };
        let proximity = (1.0 - forward / 10.0).clamp(0.0, 1.0);

        let mut confidence = 0.4 * area_score + 0.3 * symmetry + 0.3 * proximity;

        if self
            .previous_positions
            .iter()
            .any(|p| p.distance_to(robot_frame_pos) < REDETECTION_RADIUS)
        {
            confidence += 0.1;
        }
        confidence.clamp(0.0, 1.0)
    }
}

/// Express a world point in the robot frame (forward, left).
fn robot_frame(pose: &Pose, world: &Point) -> Point {
    let dx = world.x - pose.x;
    let dy = world.y - pose.y;
    let cos_t = pose.theta.cos();
    let sin_t = pose.theta.sin();
    Point::new(dx * cos_t + dy * sin_t, -dx * sin_t + dy * cos_t)
}

fn bounding_box(points: &[imageproc::point::Point<i32>]) -> (i32, i32, i32, i32) {
    let mut min_u = i32::MAX;
    let mut max_u = i32::MIN;
    let mut min_v = i32::MAX;
    let mut max_v = i32::MIN;
    for p in points {
        min_u = min_u.min(p.x);
        max_u = max_u.max(p.x);
        min_v = min_v.min(p.y);
        max_v = max_v.max(p.y);
    }
    (min_u, max_u, min_v, max_v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sim::camera::{render_frame, CameraModel};

    fn detector() -> ObstacleDetector {
        ObstacleDetector::new(&config::CameraConfig::default())
    }

    fn model() -> CameraModel {
        CameraModel {
            width: 640,
            height: 480,
            focal_px: 500.0,
            height_m: 0.15,
        }
    }

    fn obstacle_frame(forward: f64) -> RgbImage {
        render_frame(
            &model(),
            &Pose::default(),
            &[(Point::new(forward, 0.0), 0.2)],
        )
    }

    #[test]
    fn test_warmup_suppresses_output() {
        let mut det = detector();
        let frame = obstacle_frame(1.5);
        let pose = Pose::default();

        assert!(det.process(&frame, &pose).obstacles.is_empty());
        assert!(det.process(&frame, &pose).obstacles.is_empty());
        // Third frame is live
        assert!(!det.process(&frame, &pose).obstacles.is_empty());
    }

    #[test]
    fn test_detects_obstacle_position_and_size() {
        let mut det = detector();
        let frame = obstacle_frame(1.5);
        let pose = Pose::default();
        det.process(&frame, &pose);
        det.process(&frame, &pose);
        let outcome = det.process(&frame, &pose);

        let obstacle = outcome
            .obstacles
            .iter()
            .min_by(|a, b| {
                let da = a.position.distance_to(&Point::new(1.5, 0.0));
                let db = b.position.distance_to(&Point::new(1.5, 0.0));
                da.total_cmp(&db)
            })
            .expect("an obstacle");
        assert!(
            obstacle.position.distance_to(&Point::new(1.5, 0.0)) < 0.4,
            "found at {:?}",
            obstacle.position
        );
        assert!(obstacle.radius > 0.05 && obstacle.radius < 0.6);
        assert!(obstacle.track_id.is_some());
    }

    #[test]
    fn test_empty_scene_detects_nothing() {
        let mut det = detector();
        let frame = render_frame(&model(), &Pose::default(), &[]);
        let pose = Pose::default();
        det.process(&frame, &pose);
        det.process(&frame, &pose);
        let outcome = det.process(&frame, &pose);
        assert!(outcome.obstacles.is_empty());
        assert!(!outcome.emergency);
    }

    #[test]
    fn test_close_obstacle_raises_emergency() {
        let mut det = detector();
        // A small object at 0.45 m: inside the default 0.5 m close band
        let frame = render_frame(
            &model(),
            &Pose::default(),
            &[(Point::new(0.45, 0.0), 0.1)],
        );
        let outcome = det.process(&frame, &Pose::default());
        assert!(outcome.emergency);
    }

    #[test]
    fn test_track_id_stable_across_frames() {
        let mut det = detector();
        let pose = Pose::default();
        let frame = obstacle_frame(1.5);
        det.process(&frame, &pose);
        det.process(&frame, &pose);
        let first = det.process(&frame, &pose);
        let second = det.process(&frame, &pose);

        let id_first = first.obstacles.first().and_then(|o| o.track_id);
        let id_second = second.obstacles.first().and_then(|o| o.track_id);
        assert!(id_first.is_some());
        assert_eq!(id_first, id_second);
    }

    #[test]
    fn test_pose_rotation_moves_world_position() {
        let mut det = detector();
        // Robot facing +y: an obstacle dead ahead lands at +y in world
        let pose = Pose {
            x: 0.0,
            y: 0.0,
            theta: std::f64::consts::FRAC_PI_2,
        };
        let frame = render_frame(&model(), &pose, &[(Point::new(0.0, 1.5), 0.2)]);
        det.process(&frame, &pose);
        det.process(&frame, &pose);
        let outcome = det.process(&frame, &pose);
        let obstacle = outcome.obstacles.first().expect("an obstacle");
        assert!(obstacle.position.y > 1.0, "at {:?}", obstacle.position);
        assert!(obstacle.position.x.abs() < 0.5);
    }
}
