//! Garden boundary guard.
//!
//! Holds the garden polygon (ordered GPS vertices, closed, immutable
//! after load) and answers containment/severity queries. The polygon is
//! projected into a local metric frame once at init; per-query work is
//! ray-casting plus haversine distances.

use config::BoundaryVertex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use transforms::{bearing, haversine, GeoReference};
use types::Point;

#[derive(Error, Debug)]
pub enum BoundaryError {
    #[error("garden polygon needs at least 3 vertices, got {0}")]
    TooFewVertices(usize),
}

/// Severity of a boundary check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundarySeverity {
    Safe,
    Warning,
    Danger,
}

/// Result of one position check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundaryCheck {
    pub inside: bool,
    /// Distance to the nearest boundary vertex (m)
    pub distance_to_boundary: f64,
    /// The nearest vertex (lat, lon)
    pub nearest_vertex: (f64, f64),
    pub severity: BoundarySeverity,
    /// Recommended escape heading, radians in (-pi, pi]
    pub suggested_bearing: f64,
}

/// The garden polygon plus safety bands.
pub struct BoundaryGuard {
    vertices: Vec<(f64, f64)>,
    centroid: (f64, f64),
    /// Polygon area from the shoelace formula after projection (m^2)
    area_m2: f64,
    /// Inside this distance of the boundary: DANGER
    safety_buffer: f64,
    /// Inside this distance: WARNING
    warning_distance: f64,
}

impl BoundaryGuard {
    pub fn new(
        vertices: &[BoundaryVertex],
        safety_buffer: f64,
        warning_distance: f64,
    ) -> Result<Self, BoundaryError> {
        if vertices.len() < 3 {
            return Err(BoundaryError::TooFewVertices(vertices.len()));
        }

        let vertices: Vec<(f64, f64)> = vertices
            .iter()
            .map(|v| (v.latitude, v.longitude))
            .collect();

        let centroid = (
            vertices.iter().map(|v| v.0).sum::<f64>() / vertices.len() as f64,
            vertices.iter().map(|v| v.1).sum::<f64>() / vertices.len() as f64,
        );

        // Project once from the first vertex and run the shoelace formula
        let geo = GeoReference::new(vertices[0].0, vertices[0].1);
        let projected: Vec<Point> = vertices.iter().map(|v| geo.to_local(v.0, v.1)).collect();
        let mut area = 0.0;
        for i in 0..projected.len() {
            let j = (i + 1) % projected.len();
            area += projected[i].x * projected[j].y - projected[j].x * projected[i].y;
        }
        let area_m2 = area.abs() / 2.0;

        info!(
            vertices = vertices.len(),
            area_m2 = format!("{:.0}", area_m2),
            "Garden boundary loaded"
        );

        Ok(Self {
            vertices,
            centroid,
            area_m2,
            safety_buffer,
            warning_distance,
        })
    }

    /// Build from the configuration tree.
    pub fn from_config(config: &config::MowerConfig) -> Result<Self, BoundaryError> {
        Self::new(
            &config.boundary_coordinates,
            config.safety.boundary_buffer,
            config.safety.boundary_warning,
        )
    }

    pub fn area_m2(&self) -> f64 {
        self.area_m2
    }

    pub fn centroid(&self) -> (f64, f64) {
        self.centroid
    }

    pub fn vertices(&self) -> &[(f64, f64)] {
        &self.vertices
    }

    /// Check a GPS position against the garden polygon.
    ///
    /// Containment is stable: repeated calls with the same coordinates
    /// always return the same severity.
    pub fn check(&self, lat: f64, lon: f64) -> BoundaryCheck {
        let inside = self.contains(lat, lon);
        let (distance, nearest_vertex) = self.nearest_vertex(lat, lon);

        let severity = if !inside || distance <= self.safety_buffer {
            BoundarySeverity::Danger
        } else if distance <= self.warning_distance {
            BoundarySeverity::Warning
        } else {
            BoundarySeverity::Safe
        };

        if severity == BoundarySeverity::Danger {
            warn!(lat, lon, inside, distance, "Boundary danger");
        }

        BoundaryCheck {
            inside,
            distance_to_boundary: distance,
            nearest_vertex,
            severity,
            suggested_bearing: self.suggested_bearing(lat, lon, nearest_vertex),
        }
    }

    /// Ray-casting point-in-polygon on (lon, lat). Points exactly on a
    /// horizontal edge follow the half-open rule, so the answer for any
    /// fixed input never flickers.
    fn contains(&self, lat: f64, lon: f64) -> bool {
        let (x, y) = (lon, lat);
        let mut inside = false;
        let n = self.vertices.len();
        let mut j = n - 1;
        for i in 0..n {
            let (yi, xi) = self.vertices[i];
            let (yj, xj) = self.vertices[j];
            if (yi > y) != (yj > y) {
                let x_cross = (xj - xi) * (y - yi) / (yj - yi) + xi;
                if x < x_cross {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }

    /// Minimum haversine distance over the polygon vertices.
    fn nearest_vertex(&self, lat: f64, lon: f64) -> (f64, (f64, f64)) {
        let mut best = f64::INFINITY;
        let mut best_vertex = self.vertices[0];
        for &(vlat, vlon) in &self.vertices {
            let d = haversine(lat, lon, vlat, vlon);
            if d < best {
                best = d;
                best_vertex = (vlat, vlon);
            }
        }
        (best, best_vertex)
    }

    /// Escape heading: weighted circular mean of the direction to the
    /// centroid (0.7) and the direction away from the nearest vertex (0.3).
    fn suggested_bearing(&self, lat: f64, lon: f64, nearest: (f64, f64)) -> f64 {
        let to_centroid = bearing(lat, lon, self.centroid.0, self.centroid.1);
        let away_from_vertex = bearing(nearest.0, nearest.1, lat, lon);

        let x = 0.7 * to_centroid.cos() + 0.3 * away_from_vertex.cos();
        let y = 0.7 * to_centroid.sin() + 0.3 * away_from_vertex.sin();
        y.atan2(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn quad() -> Vec<BoundaryVertex> {
        [
            (39.9335, 32.8595),
            (39.9336, 32.8599),
            (39.9333, 32.85985),
            (39.9332, 32.89454),
        ]
        .iter()
        .map(|&(latitude, longitude)| BoundaryVertex {
            latitude,
            longitude,
        })
        .collect()
    }

    fn guard() -> BoundaryGuard {
        BoundaryGuard::new(&quad(), 1.0, 2.0).unwrap()
    }

    #[test]
    fn test_too_few_vertices() {
        let two: Vec<BoundaryVertex> = quad().into_iter().take(2).collect();
        assert!(BoundaryGuard::new(&two, 1.0, 2.0).is_err());
    }

    #[test]
    fn test_centroid_is_safe() {
        let g = guard();
        let (clat, clon) = g.centroid();
        let result = g.check(clat, clon);
        assert!(result.inside);
        assert_eq!(result.severity, BoundarySeverity::Safe);
    }

    #[test]
    fn test_outside_point_is_danger() {
        let g = guard();
        let result = g.check(39.934, 32.860);
        assert!(!result.inside);
        assert_eq!(result.severity, BoundarySeverity::Danger);
        assert!(result.suggested_bearing >= -PI && result.suggested_bearing <= PI);
    }

    #[test]
    fn test_area_over_100_m2() {
        let g = guard();
        assert!(g.area_m2() > 100.0, "area = {}", g.area_m2());
    }

    #[test]
    fn test_containment_is_stable() {
        let g = guard();
        let first = g.check(39.9334, 32.8640);
        for _ in 0..10 {
            let again = g.check(39.9334, 32.8640);
            assert_eq!(again.severity, first.severity);
            assert_eq!(again.inside, first.inside);
        }
    }

    #[test]
    fn test_far_outside_has_finite_distance() {
        let g = guard();
        let result = g.check(40.0, 33.0);
        assert!(!result.inside);
        assert!(result.distance_to_boundary.is_finite());
        assert!(result.distance_to_boundary > 1000.0);
    }

    #[test]
    fn test_nearest_vertex_is_a_polygon_vertex() {
        let g = guard();
        let result = g.check(39.9335, 32.8596);
        let found = quad()
            .iter()
            .any(|v| v.latitude == result.nearest_vertex.0 && v.longitude == result.nearest_vertex.1);
        assert!(found);
    }

    #[test]
    fn test_suggested_bearing_points_inward() {
        let g = guard();
        // North of the polygon: the escape bearing should have a
        // southward (negative y) component
        let result = g.check(39.9340, 32.8640);
        assert!(result.suggested_bearing.sin() < 0.0);
    }
}
