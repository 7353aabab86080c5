use crate::config::{FIT_PADDING_PX, MIN_ZOOM, TILE_SIZE};
use crate::projection::{Extent, HALF_WORLD, MapPoint};

/// Meters per pixel at zoom 0 for 256px tiles.
pub const RESOLUTION_Z0: f64 = 2.0 * HALF_WORLD / TILE_SIZE;

const WHEEL_ZOOM_PER_PIXEL: f64 = 0.0025;
const MAX_WHEEL_STEP: f64 = 1.0;

/// The view onto projected space: center, fractional zoom and the pixel size of the surface.
#[derive(Debug, Clone, PartialEq)]
pub struct MapView {
    pub center: MapPoint,
    pub zoom: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub width: f64,
    pub height: f64,
}

impl Default for MapView {
    fn default() -> Self {
        Self {
            center: MapPoint::new(0.0, 0.0),
            zoom: 2.0,
            min_zoom: MIN_ZOOM,
            max_zoom: 19.0,
            width: 0.0,
            height: 0.0,
        }
    }
}

impl MapView {
    pub fn new(center: MapPoint, zoom: f64, max_zoom: f64) -> Self {
        let mut view = Self {
            center,
            max_zoom,
            ..Self::default()
        };
        view.zoom = view.clamp_zoom(zoom);
        view
    }

    pub fn resolution(&self) -> f64 {
        resolution_for_zoom(self.zoom)
    }

    pub fn has_size(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }

    pub fn set_size(&mut self, width: f64, height: f64) {
        self.width = width.max(0.0);
        self.height = height.max(0.0);
    }

    pub fn clamp_zoom(&self, zoom: f64) -> f64 {
        zoom.clamp(self.min_zoom, self.max_zoom.max(self.min_zoom))
    }

    /// Convert projected coordinates to surface pixels (y grows downward).
    pub fn world_to_screen(&self, p: MapPoint) -> (f64, f64) {
        let res = self.resolution();
        (
            (p.x - self.center.x) / res + self.width / 2.0,
            (self.center.y - p.y) / res + self.height / 2.0,
        )
    }

    /// Convert surface pixels to projected coordinates.
    pub fn screen_to_world(&self, sx: f64, sy: f64) -> MapPoint {
        let res = self.resolution();
        MapPoint::new(
            self.center.x + (sx - self.width / 2.0) * res,
            self.center.y - (sy - self.height / 2.0) * res,
        )
    }

    /// Change zoom while keeping the point under `(sx, sy)` fixed on screen.
    pub fn zoom_at(&mut self, delta_zoom: f64, sx: f64, sy: f64) {
        let anchor = self.screen_to_world(sx, sy);
        self.zoom = self.clamp_zoom(self.zoom + delta_zoom);
        let after = self.screen_to_world(sx, sy);
        self.center.x += anchor.x - after.x;
        self.center.y += anchor.y - after.y;
    }

    /// Wheel delta in pixels to a zoom step toward the cursor.
    pub fn zoom_by_wheel(&mut self, delta_y: f64, sx: f64, sy: f64) {
        let step = (-delta_y * WHEEL_ZOOM_PER_PIXEL).clamp(-MAX_WHEEL_STEP, MAX_WHEEL_STEP);
        self.zoom_at(step, sx, sy);
    }

    /// Pan by a screen-space delta (content follows the pointer).
    pub fn pan(&mut self, dx: f64, dy: f64) {
        let res = self.resolution();
        self.center.x -= dx * res;
        self.center.y += dy * res;
    }

    pub fn center_on(&mut self, center: MapPoint, zoom: f64) {
        self.center = center;
        self.zoom = self.clamp_zoom(zoom);
    }

    /// Extent currently visible on the surface.
    pub fn visible_extent(&self) -> Extent {
        let half_w = self.width / 2.0 * self.resolution();
        let half_h = self.height / 2.0 * self.resolution();
        Extent {
            min_x: self.center.x - half_w,
            min_y: self.center.y - half_h,
            max_x: self.center.x + half_w,
            max_y: self.center.y + half_h,
        }
    }

    /// Fit the view to show `extent` with `padding` pixels on every side.
    ///
    /// A zero-size extent centers on it at the maximum zoom. Without a surface
    /// size only the center moves.
    pub fn fit_extent(&mut self, extent: &Extent, padding: f64) {
        if extent.is_empty() {
            return;
        }
        self.center = extent.center();
        if !self.has_size() {
            return;
        }

        let avail_w = (self.width - 2.0 * padding).max(1.0);
        let avail_h = (self.height - 2.0 * padding).max(1.0);
        let res = (extent.width() / avail_w).max(extent.height() / avail_h);
        self.zoom = if res <= 0.0 {
            self.clamp_zoom(self.max_zoom)
        } else {
            self.clamp_zoom(zoom_for_resolution(res))
        };
    }

    pub fn fit_extent_default(&mut self, extent: &Extent) {
        self.fit_extent(extent, FIT_PADDING_PX);
    }

    /// Screen distance between two projected points, in pixels.
    pub fn pixel_distance(&self, a: MapPoint, b: MapPoint) -> f64 {
        let (ax, ay) = self.world_to_screen(a);
        let (bx, by) = self.world_to_screen(b);
        ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
    }
}

pub fn resolution_for_zoom(zoom: f64) -> f64 {
    RESOLUTION_Z0 / 2f64.powf(zoom)
}

pub fn zoom_for_resolution(resolution: f64) -> f64 {
    (RESOLUTION_Z0 / resolution).log2()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        let diff = (actual - expected).abs();
        assert!(
            diff < 1e-6,
            "expected {expected}, got {actual} (diff: {diff})"
        );
    }

    fn sized_view() -> MapView {
        let mut view = MapView::new(MapPoint::new(1000.0, -2000.0), 10.0, 19.0);
        view.set_size(800.0, 600.0);
        view
    }

    #[test]
    fn zoom_zero_resolution_matches_standard_grid() {
        assert_close(resolution_for_zoom(0.0), 156_543.033_928_041);
        assert_close(zoom_for_resolution(resolution_for_zoom(7.25)), 7.25);
    }

    #[test]
    fn screen_world_round_trip() {
        let view = sized_view();
        let p = view.screen_to_world(123.0, 456.0);
        let (sx, sy) = view.world_to_screen(p);
        assert_close(sx, 123.0);
        assert_close(sy, 456.0);
    }

    #[test]
    fn center_maps_to_surface_middle() {
        let view = sized_view();
        let (sx, sy) = view.world_to_screen(view.center);
        assert_close(sx, 400.0);
        assert_close(sy, 300.0);
    }

    #[test]
    fn zoom_at_keeps_anchor_fixed() {
        let mut view = sized_view();
        let anchor = view.screen_to_world(100.0, 50.0);
        view.zoom_at(1.5, 100.0, 50.0);
        assert_close(view.zoom, 11.5);
        let (sx, sy) = view.world_to_screen(anchor);
        assert_close(sx, 100.0);
        assert_close(sy, 50.0);
    }

    #[test]
    fn zoom_is_clamped() {
        let mut view = sized_view();
        view.zoom_at(100.0, 0.0, 0.0);
        assert_eq!(view.zoom, 19.0);
        view.zoom_at(-100.0, 0.0, 0.0);
        assert_eq!(view.zoom, MIN_ZOOM);
    }

    #[test]
    fn pan_moves_content_with_pointer() {
        let mut view = sized_view();
        let p = view.screen_to_world(200.0, 200.0);
        view.pan(30.0, -20.0);
        let (sx, sy) = view.world_to_screen(p);
        assert_close(sx, 230.0);
        assert_close(sy, 180.0);
    }

    #[test]
    fn fit_extent_contains_extent_with_padding() {
        let mut view = sized_view();
        let extent = Extent {
            min_x: 0.0,
            min_y: 0.0,
            max_x: 70_000.0,
            max_y: 10_000.0,
        };
        view.fit_extent(&extent, 50.0);
        assert_eq!(view.center, MapPoint::new(35_000.0, 5_000.0));
        let (left, _) = view.world_to_screen(MapPoint::new(0.0, 0.0));
        let (right, _) = view.world_to_screen(MapPoint::new(70_000.0, 0.0));
        assert_close(left, 50.0);
        assert_close(right, 750.0);
    }

    #[test]
    fn fit_zero_size_extent_goes_to_max_zoom() {
        let mut view = sized_view();
        view.fit_extent(&Extent::around(MapPoint::new(5.0, 5.0), 0.0), 50.0);
        assert_eq!(view.zoom, 19.0);
        assert_eq!(view.center, MapPoint::new(5.0, 5.0));
    }

    #[test]
    fn fit_without_size_only_recenters() {
        let mut view = MapView::new(MapPoint::new(0.0, 0.0), 4.0, 19.0);
        view.fit_extent(&Extent::around(MapPoint::new(10.0, 10.0), 5.0), 50.0);
        assert_eq!(view.center, MapPoint::new(10.0, 10.0));
        assert_eq!(view.zoom, 4.0);
    }

    #[test]
    fn wheel_steps_are_bounded() {
        let mut view = sized_view();
        view.zoom_by_wheel(-10_000.0, 400.0, 300.0);
        assert_close(view.zoom, 11.0);
        view.zoom_by_wheel(100.0, 400.0, 300.0);
        assert_close(view.zoom, 10.75);
    }
}
