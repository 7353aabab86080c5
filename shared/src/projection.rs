//! Spherical Web Mercator (EPSG:3857), the projection raster basemaps are cut in.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::geometry::LonLat;

pub const EARTH_RADIUS: f64 = 6_378_137.0;
/// Latitude at which the Mercator square ends.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;
/// Half the width of the projected world, in meters.
pub const HALF_WORLD: f64 = PI * EARTH_RADIUS;

/// A point in projected meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapPoint {
    pub x: f64,
    pub y: f64,
}

impl MapPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

pub fn forward(p: LonLat) -> MapPoint {
    let lat = p.lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    MapPoint {
        x: EARTH_RADIUS * p.lon.to_radians(),
        y: EARTH_RADIUS * (PI / 4.0 + lat / 2.0).tan().ln(),
    }
}

pub fn inverse(p: MapPoint) -> LonLat {
    LonLat {
        lon: (p.x / EARTH_RADIUS).to_degrees(),
        lat: (2.0 * (p.y / EARTH_RADIUS).exp().atan() - PI / 2.0).to_degrees(),
    }
}

pub fn forward_ring(points: &[LonLat]) -> Vec<MapPoint> {
    points.iter().copied().map(forward).collect()
}

pub fn inverse_ring(points: &[MapPoint]) -> Vec<LonLat> {
    points.iter().copied().map(inverse).collect()
}

/// Axis-aligned bounding box. Used both in degrees and in projected meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Default for Extent {
    fn default() -> Self {
        Self::empty()
    }
}

impl Extent {
    pub const fn empty() -> Self {
        Self {
            min_x: f64::INFINITY,
            min_y: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            max_y: f64::NEG_INFINITY,
        }
    }

    pub fn from_points(points: &[MapPoint]) -> Self {
        let mut extent = Self::empty();
        for p in points {
            extent.extend(p.x, p.y);
        }
        extent
    }

    pub fn around(center: MapPoint, half: f64) -> Self {
        Self {
            min_x: center.x - half,
            min_y: center.y - half,
            max_x: center.x + half,
            max_y: center.y + half,
        }
    }

    pub fn extend(&mut self, x: f64, y: f64) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    pub fn merge(&mut self, other: &Extent) {
        if other.is_empty() {
            return;
        }
        self.extend(other.min_x, other.min_y);
        self.extend(other.max_x, other.max_y);
    }

    pub fn is_empty(&self) -> bool {
        self.min_x > self.max_x || self.min_y > self.max_y
    }

    pub fn width(&self) -> f64 {
        if self.is_empty() { 0.0 } else { self.max_x - self.min_x }
    }

    pub fn height(&self) -> f64 {
        if self.is_empty() { 0.0 } else { self.max_y - self.min_y }
    }

    pub fn center(&self) -> MapPoint {
        MapPoint::new(
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    pub fn contains(&self, p: MapPoint) -> bool {
        p.x >= self.min_x && p.x <= self.max_x && p.y >= self.min_y && p.y <= self.max_y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64, tolerance: f64) {
        let diff = (actual - expected).abs();
        assert!(
            diff < tolerance,
            "expected {expected}, got {actual} (diff: {diff})"
        );
    }

    #[test]
    fn origin_maps_to_origin() {
        let p = forward(LonLat::new(0.0, 0.0));
        assert_close(p.x, 0.0, 1e-9);
        assert_close(p.y, 0.0, 1e-9);
    }

    #[test]
    fn antimeridian_is_half_world() {
        let p = forward(LonLat::new(180.0, 0.0));
        assert_close(p.x, HALF_WORLD, 1e-6);
        let top = forward(LonLat::new(0.0, MAX_LATITUDE));
        assert_close(top.y, HALF_WORLD, 1e-3);
    }

    #[test]
    fn known_point_matches_epsg3857() {
        let p = forward(LonLat::new(-47.93, -15.78));
        assert_close(p.x, -5_335_543.19, 0.01);
        assert_close(p.y, -1_779_259.49, 0.01);
    }

    #[test]
    fn round_trip_is_exact_to_nine_decimals() {
        for &(lon, lat) in &[
            (-47.93, -15.78),
            (20.0, 10.0),
            (179.999999, 84.9),
            (-179.5, -80.123456),
            (0.000001, 0.000001),
        ] {
            let back = inverse(forward(LonLat::new(lon, lat)));
            assert_close(back.lon, lon, 1e-9);
            assert_close(back.lat, lat, 1e-9);
        }
    }

    #[test]
    fn latitude_is_clamped_at_the_poles() {
        let pole = inverse(forward(LonLat::new(0.0, 90.0)));
        assert_close(pole.lat, MAX_LATITUDE, 1e-9);
    }

    #[test]
    fn extent_grows_and_reports_center() {
        let mut e = Extent::empty();
        assert!(e.is_empty());
        assert_eq!(e.width(), 0.0);
        e.extend(1.0, 2.0);
        e.extend(5.0, -2.0);
        assert!(!e.is_empty());
        assert_eq!(e.width(), 4.0);
        assert_eq!(e.height(), 4.0);
        assert_eq!(e.center(), MapPoint::new(3.0, 0.0));
        assert!(e.contains(MapPoint::new(3.0, 1.0)));
        assert!(!e.contains(MapPoint::new(6.0, 1.0)));
    }

    #[test]
    fn merge_ignores_empty_extents() {
        let mut e = Extent::around(MapPoint::new(0.0, 0.0), 1.0);
        e.merge(&Extent::empty());
        assert_eq!(e, Extent::around(MapPoint::new(0.0, 0.0), 1.0));
        e.merge(&Extent::around(MapPoint::new(10.0, 0.0), 1.0));
        assert_eq!(e.max_x, 11.0);
    }
}
