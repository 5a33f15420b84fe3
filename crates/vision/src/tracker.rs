//! Frame-to-frame obstacle association.
//!
//! Nearest-neighbour matching against short per-id position histories.
//! Unmatched detections open fresh tracks; tracks that get no hit in a
//! cycle are dropped.

use std::collections::{HashMap, VecDeque};
use types::{DynamicObstacle, Point};

pub struct ObstacleTracker {
    /// Ring size of each track's history
    history: usize,
    /// Association gate (m)
    max_distance: f64,
    tracks: HashMap<u32, VecDeque<Point>>,
    next_id: u32,
}

impl ObstacleTracker {
    pub fn new(history: usize, max_distance: f64) -> Self {
        Self {
            history,
            max_distance,
            tracks: HashMap::new(),
            next_id: 0,
        }
    }

    /// Assign track ids to this frame's detections in place.
    pub fn assign(&mut self, detections: &mut [DynamicObstacle]) {
        let mut hit: HashMap<u32, VecDeque<Point>> = HashMap::new();

        for detection in detections.iter_mut() {
            // Nearest unclaimed track within the gate
            let mut best: Option<(u32, f64)> = None;
            for (&id, track) in &self.tracks {
                if hit.contains_key(&id) {
                    continue;
                }
                let Some(last) = track.back() else { continue };
                let distance = detection.position.distance_to(last);
                if distance <= self.max_distance
                    && best.map_or(true, |(_, d)| distance < d)
                {
                    best = Some((id, distance));
                }
            }

            let id = match best {
                Some((id, _)) => {
                    let mut track = self.tracks.remove(&id).unwrap_or_default();
                    track.push_back(detection.position);
                    while track.len() > self.history {
                        track.pop_front();
                    }
                    hit.insert(id, track);
                    id
                }
                None => {
                    let id = self.next_id;
                    self.next_id = self.next_id.wrapping_add(1);
                    hit.insert(id, VecDeque::from([detection.position]));
                    id
                }
            };
            detection.track_id = Some(id);
        }

        // Tracks without a hit this cycle are gone
        self.tracks = hit;
    }

    pub fn active_tracks(&self) -> usize {
        self.tracks.len()
    }

    /// Most recent position of a track, if it is still alive.
    pub fn last_position(&self, id: u32) -> Option<Point> {
        self.tracks.get(&id).and_then(|t| t.back()).copied()
    }
}
