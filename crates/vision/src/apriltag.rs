//! AprilTag detection types for the docking approach.
//!
//! The docker only needs the detection itself — tag id, image corners,
//! estimated distance and bearing, confidence — so the decode stage sits
//! behind a small trait. The simulator and the test suite script
//! detections; real hardware plugs a decoder in behind the same trait.

use image::RgbImage;
use std::collections::VecDeque;

/// One decoded tag observation.
#[derive(Debug, Clone)]
pub struct AprilTagDetection {
    pub id: u32,
    /// Image corners, clockwise from top-left: (u, v)
    pub corners: [(f64, f64); 4],
    /// Estimated distance to the tag center (m)
    pub distance: f64,
    /// Bearing to the tag in the robot frame (radians, 0 = dead ahead)
    pub bearing: f64,
    /// Confidence in [0, 1]
    pub confidence: f64,
}

impl AprilTagDetection {
    /// Build a detection, deriving confidence from the corner geometry.
    pub fn from_corners(id: u32, corners: [(f64, f64); 4], distance: f64, bearing: f64) -> Self {
        Self {
            id,
            corners,
            distance,
            bearing,
            confidence: confidence_from_corners(&corners),
        }
    }
}

/// Confidence from the spread of the quad's side lengths: a regular
/// square projects to near-equal sides, a glancing or corrupted decode
/// does not.
pub fn confidence_from_corners(corners: &[(f64, f64); 4]) -> f64 {
    let mut lengths = [0.0f64; 4];
    for i in 0..4 {
        let (x1, y1) = corners[i];
        let (x2, y2) = corners[(i + 1) % 4];
        lengths[i] = ((x2 - x1).powi(2) + (y2 - y1).powi(2)).sqrt();
    }

    let mean = lengths.iter().sum::<f64>() / 4.0;
    if mean < 1e-6 {
        return 0.0;
    }
    let variance = lengths.iter().map(|l| (l - mean).powi(2)).sum::<f64>() / 4.0;
    let cv = variance.sqrt() / mean;

    (1.0 - cv * 2.0).clamp(0.0, 1.0)
}

/// Source of tag detections.
pub trait TagDetector: Send {
    fn detect(&mut self, frame: &RgbImage) -> Option<AprilTagDetection>;
}

/// Scripted detector for the simulator and tests: returns the queued
/// detections in order, then keeps repeating the final entry.
pub struct ScriptedTagDetector {
    script: VecDeque<Option<AprilTagDetection>>,
    hold_last: Option<AprilTagDetection>,
}

impl ScriptedTagDetector {
    pub fn new(script: Vec<Option<AprilTagDetection>>) -> Self {
        Self {
            script: script.into(),
            hold_last: None,
        }
    }

    /// A detector that never sees a tag.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

impl TagDetector for ScriptedTagDetector {
    fn detect(&mut self, _frame: &RgbImage) -> Option<AprilTagDetection> {
        match self.script.pop_front() {
            Some(entry) => {
                self.hold_last = entry.clone();
                entry
            }
            None => self.hold_last.clone(),
        }
    }
}

/// A perfectly square set of corners at the given size, for tests.
pub fn square_corners(center: (f64, f64), half: f64) -> [(f64, f64); 4] {
    [
        (center.0 - half, center.1 - half),
        (center.0 + half, center.1 - half),
        (center.0 + half, center.1 + half),
        (center.0 - half, center.1 + half),
    ]
}
