//! Camera-based perception for the mower.
//!
//! - [`detector`]: classical-CV dynamic obstacle extraction with tracking
//! - [`apriltag`]: the tag detection types the docking approach consumes

pub mod apriltag;
pub mod detector;
pub mod tracker;

pub use apriltag::{AprilTagDetection, ScriptedTagDetector, TagDetector};
pub use detector::{DetectionOutcome, ObstacleDetector};
pub use tracker::ObstacleTracker;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("frame has unusable dimensions {width}x{height}")]
    BadFrame { width: u32, height: u32 },
}
