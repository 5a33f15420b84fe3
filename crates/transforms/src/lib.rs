//! Planar frame math and GPS projection for navigation.
//!
//! The garden is small enough that a flat-earth (equirectangular)
//! projection around a fixed reference coordinate is accurate to well
//! under a centimeter across the working area. The reference is set once
//! (first accepted GPS fix, or the first boundary vertex) and reused for
//! every subsequent projection.

use nalgebra::{Isometry2, Vector2};
use std::f64::consts::PI;
use types::{GpsCoord, Point, Pose};

/// Mean earth radius in meters.
pub const EARTH_RADIUS: f64 = 6_371_000.0;

/// Normalize an angle to (-pi, pi].
pub fn normalize_angle(angle: f64) -> f64 {
    let mut a = angle % (2.0 * PI);
    if a > PI {
        a -= 2.0 * PI;
    } else if a <= -PI {
        a += 2.0 * PI;
    }
    a
}

/// Smallest signed difference between two angles, in (-pi, pi].
pub fn angle_diff(target: f64, current: f64) -> f64 {
    normalize_angle(target - current)
}

/// Great-circle distance between two WGS84 coordinates, in meters.
pub fn haversine(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Initial bearing from one coordinate towards another, radians in (-pi, pi].
/// Measured from east, counter-clockwise (matching the local frame).
pub fn bearing(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let ref_lat = lat1.to_radians();
    let dx = (lon2 - lon1).to_radians() * EARTH_RADIUS * ref_lat.cos();
    let dy = (lat2 - lat1).to_radians() * EARTH_RADIUS;
    dy.atan2(dx)
}

/// Fixed reference for flat-earth GPS <-> local conversions.
///
/// Local X points east, local Y points north.
#[derive(Debug, Clone, Copy)]
pub struct GeoReference {
    lat: f64,
    lon: f64,
    cos_lat: f64,
}

impl GeoReference {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            lat,
            lon,
            cos_lat: lat.to_radians().cos(),
        }
    }

    pub fn from_coord(coord: &GpsCoord) -> Self {
        Self::new(coord.lat, coord.lon)
    }

    pub fn latitude(&self) -> f64 {
        self.lat
    }

    pub fn longitude(&self) -> f64 {
        self.lon
    }

    /// Project a GPS coordinate into the local metric frame.
    pub fn to_local(&self, lat: f64, lon: f64) -> Point {
        let x = (lon - self.lon).to_radians() * EARTH_RADIUS * self.cos_lat;
        let y = (lat - self.lat).to_radians() * EARTH_RADIUS;
        Point::new(x, y)
    }

    /// Invert the projection: local frame point back to GPS.
    pub fn to_gps(&self, point: &Point) -> (f64, f64) {
        let lat = self.lat + (point.y / EARTH_RADIUS).to_degrees();
        let lon = self.lon + (point.x / (EARTH_RADIUS * self.cos_lat)).to_degrees();
        (lat, lon)
    }
}

/// A 2D rigid body transform (translation + rotation).
#[derive(Debug, Clone, Copy)]
pub struct Transform2D {
    inner: Isometry2<f64>,
}

impl Transform2D {
    pub fn identity() -> Self {
        Self {
            inner: Isometry2::identity(),
        }
    }

    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Self {
            inner: Isometry2::new(Vector2::new(x, y), theta),
        }
    }

    pub fn from_pose(pose: &Pose) -> Self {
        Self::new(pose.x, pose.y, pose.theta)
    }

    pub fn to_pose(&self) -> Pose {
        Pose {
            x: self.inner.translation.x,
            y: self.inner.translation.y,
            theta: normalize_angle(self.inner.rotation.angle()),
        }
    }

    pub fn translation(&self) -> Vector2<f64> {
        self.inner.translation.vector
    }

    pub fn rotation(&self) -> f64 {
        self.inner.rotation.angle()
    }

    pub fn inverse(&self) -> Self {
        Self {
            inner: self.inner.inverse(),
        }
    }

    /// Transform a point from the child frame into the parent frame.
    pub fn transform_point(&self, point: &Point) -> Point {
        let p = self
            .inner
            .transform_point(&nalgebra::Point2::new(point.x, point.y));
        Point::new(p.x, p.y)
    }

    /// Express a parent-frame point in the child frame.
    pub fn inverse_transform_point(&self, point: &Point) -> Point {
        let p = self
            .inner
            .inverse_transform_point(&nalgebra::Point2::new(point.x, point.y));
        Point::new(p.x, p.y)
    }
}

impl Default for Transform2D {
    fn default() -> Self {
        Self::identity()
    }
}

impl std::ops::Mul for Transform2D {
    type Output = Transform2D;

    fn mul(self, rhs: Transform2D) -> Transform2D {
        Transform2D {
            inner: self.inner * rhs.inner,
        }
    }
}
