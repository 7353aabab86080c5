use serde::{Deserialize, Serialize};

use crate::projection::{Extent, HALF_WORLD};
use crate::viewport::MapView;

/// Upper bound on tiles requested for one frame (very large surfaces at low zoom).
const MAX_VISIBLE_TILES: usize = 512;
const EDGE_EPSILON: f64 = 1e-9;

/// Raster basemap beneath the vector overlays.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BasemapKind {
    #[default]
    Streets,
    Satellite,
    Terrain,
    Topo,
}

impl BasemapKind {
    pub const ALL: [BasemapKind; 4] = [
        BasemapKind::Streets,
        BasemapKind::Satellite,
        BasemapKind::Terrain,
        BasemapKind::Topo,
    ];

    pub fn label(self) -> &'static str {
        match self {
            BasemapKind::Streets => "Streets",
            BasemapKind::Satellite => "Satellite",
            BasemapKind::Terrain => "Terrain",
            BasemapKind::Topo => "Topographic",
        }
    }

    /// XYZ URL template; `{s}` rotates over `subdomains()`.
    pub fn template(self) -> &'static str {
        match self {
            BasemapKind::Streets => "https://tile.openstreetmap.org/{z}/{x}/{y}.png",
            BasemapKind::Satellite => {
                "https://server.arcgisonline.com/ArcGIS/rest/services/World_Imagery/MapServer/tile/{z}/{y}/{x}"
            }
            BasemapKind::Terrain => {
                "https://server.arcgisonline.com/ArcGIS/rest/services/World_Terrain_Base/MapServer/tile/{z}/{y}/{x}"
            }
            BasemapKind::Topo => "https://{s}.tile.opentopomap.org/{z}/{x}/{y}.png",
        }
    }

    pub fn subdomains(self) -> &'static [&'static str] {
        match self {
            BasemapKind::Topo => &["a", "b", "c"],
            _ => &[],
        }
    }

    /// Deepest zoom the provider serves; deeper views upscale these tiles.
    pub fn max_zoom(self) -> u32 {
        match self {
            BasemapKind::Streets => 19,
            BasemapKind::Satellite => 19,
            BasemapKind::Terrain => 13,
            BasemapKind::Topo => 17,
        }
    }

    pub fn attribution(self) -> &'static str {
        match self {
            BasemapKind::Streets => "© OpenStreetMap contributors",
            BasemapKind::Satellite => "Tiles © Esri, Maxar, Earthstar Geographics",
            BasemapKind::Terrain => "Tiles © Esri, USGS, NOAA",
            BasemapKind::Topo => "© OpenStreetMap contributors, SRTM | © OpenTopoMap (CC-BY-SA)",
        }
    }

    pub fn tile_url(self, tile: TileCoord) -> String {
        let mut url = self
            .template()
            .replace("{z}", &tile.z.to_string())
            .replace("{x}", &tile.x.to_string())
            .replace("{y}", &tile.y.to_string());
        let subdomains = self.subdomains();
        if !subdomains.is_empty() {
            let pick = ((tile.x + tile.y) as usize) % subdomains.len();
            url = url.replace("{s}", subdomains[pick]);
        }
        url
    }
}

/// Address of one raster tile in the XYZ scheme (y = 0 at the north edge).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoord {
    pub z: u32,
    pub x: u32,
    pub y: u32,
}

/// A tile to draw: its (wrapped) address and where it sits in projected space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibleTile {
    pub coord: TileCoord,
    pub extent: Extent,
}

/// Tile zoom level to request for a view.
pub fn tile_zoom(view: &MapView, kind: BasemapKind) -> u32 {
    (view.zoom.round().max(0.0) as u32).min(kind.max_zoom())
}

/// Tiles covering the view, nearest to the center first.
///
/// Columns wrap around the antimeridian; rows outside the Mercator square are skipped.
pub fn visible_tiles(view: &MapView, kind: BasemapKind) -> Vec<VisibleTile> {
    if !view.has_size() {
        return Vec::new();
    }

    let z = tile_zoom(view, kind);
    let n = 1i64 << z;
    let span = 2.0 * HALF_WORLD / n as f64;
    let visible = view.visible_extent();

    // Edges are exclusive; the epsilon keeps an exact boundary from pulling in a neighbor.
    let x_start = ((visible.min_x + HALF_WORLD) / span + EDGE_EPSILON).floor() as i64;
    let x_end = ((visible.max_x + HALF_WORLD) / span - EDGE_EPSILON).ceil() as i64 - 1;
    let y_start = (((HALF_WORLD - visible.max_y) / span + EDGE_EPSILON).floor() as i64).max(0);
    let y_end = ((((HALF_WORLD - visible.min_y) / span - EDGE_EPSILON).ceil() as i64) - 1).min(n - 1);

    let mut tiles = Vec::new();
    for y in y_start..=y_end {
        for x in x_start..=x_end {
            let min_x = -HALF_WORLD + x as f64 * span;
            let max_y = HALF_WORLD - y as f64 * span;
            tiles.push(VisibleTile {
                coord: TileCoord {
                    z,
                    x: x.rem_euclid(n) as u32,
                    y: y as u32,
                },
                extent: Extent {
                    min_x,
                    min_y: max_y - span,
                    max_x: min_x + span,
                    max_y,
                },
            });
        }
    }

    let center = view.center;
    tiles.sort_by(|a, b| {
        let da = distance_sq(a.extent, center.x, center.y);
        let db = distance_sq(b.extent, center.x, center.y);
        da.total_cmp(&db).then_with(|| a.coord.cmp(&b.coord))
    });
    tiles.truncate(MAX_VISIBLE_TILES);
    tiles
}

fn distance_sq(extent: Extent, x: f64, y: f64) -> f64 {
    let c = extent.center();
    let dx = c.x - x;
    let dy = c.y - y;
    dx * dx + dy * dy
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::MapPoint;

    #[test]
    fn tile_urls_fill_template() {
        let tile = TileCoord { z: 5, x: 11, y: 17 };
        assert_eq!(
            BasemapKind::Streets.tile_url(tile),
            "https://tile.openstreetmap.org/5/11/17.png"
        );
        assert_eq!(
            BasemapKind::Satellite.tile_url(tile),
            "https://server.arcgisonline.com/ArcGIS/rest/services/World_Imagery/MapServer/tile/5/17/11"
        );
        assert_eq!(
            BasemapKind::Topo.tile_url(tile),
            "https://b.tile.opentopomap.org/5/11/17.png"
        );
    }

    #[test]
    fn subdomains_rotate() {
        let a = BasemapKind::Topo.tile_url(TileCoord { z: 3, x: 0, y: 1 });
        let b = BasemapKind::Topo.tile_url(TileCoord { z: 3, x: 1, y: 1 });
        assert!(a.starts_with("https://b."));
        assert!(b.starts_with("https://c."));
    }

    #[test]
    fn serde_names_are_lowercase() {
        assert_eq!(
            serde_json::to_string(&BasemapKind::Topo).unwrap(),
            "\"topo\""
        );
        let kind: BasemapKind = serde_json::from_str("\"terrain\"").unwrap();
        assert_eq!(kind, BasemapKind::Terrain);
    }

    #[test]
    fn whole_world_at_zoom_zero_is_one_tile() {
        let mut view = MapView::new(MapPoint::new(0.0, 0.0), 0.0, 19.0);
        view.min_zoom = 0.0;
        view.zoom = 0.0;
        view.set_size(256.0, 256.0);
        let tiles = visible_tiles(&view, BasemapKind::Streets);
        assert_eq!(tiles.len(), 1);
        assert_eq!(tiles[0].coord, TileCoord { z: 0, x: 0, y: 0 });
    }

    #[test]
    fn tiles_cover_view_and_start_at_center() {
        let mut view = MapView::new(MapPoint::new(0.0, 0.0), 4.0, 19.0);
        view.set_size(512.0, 512.0);
        let tiles = visible_tiles(&view, BasemapKind::Streets);
        assert_eq!(tiles.len(), 4);
        assert!(tiles.iter().all(|t| t.coord.z == 4));
        let first = tiles[0].extent;
        let mut covering = first;
        for t in &tiles {
            covering.merge(&t.extent);
        }
        let visible = view.visible_extent();
        assert!(covering.min_x <= visible.min_x && covering.max_x >= visible.max_x);
        assert!(covering.min_y <= visible.min_y && covering.max_y >= visible.max_y);
    }

    #[test]
    fn columns_wrap_across_antimeridian() {
        let mut view = MapView::new(MapPoint::new(HALF_WORLD, 0.0), 3.0, 19.0);
        view.set_size(512.0, 256.0);
        let tiles = visible_tiles(&view, BasemapKind::Streets);
        assert!(tiles.iter().all(|t| t.coord.x < 8));
        assert!(tiles.iter().any(|t| t.coord.x == 0));
        assert!(tiles.iter().any(|t| t.coord.x == 7));
    }

    #[test]
    fn provider_max_zoom_caps_request_level() {
        let mut view = MapView::new(MapPoint::new(0.0, 0.0), 16.0, 19.0);
        view.set_size(256.0, 256.0);
        assert_eq!(tile_zoom(&view, BasemapKind::Terrain), 13);
        assert_eq!(tile_zoom(&view, BasemapKind::Streets), 16);
    }

    #[test]
    fn empty_surface_requests_nothing() {
        let view = MapView::new(MapPoint::new(0.0, 0.0), 4.0, 19.0);
        assert!(visible_tiles(&view, BasemapKind::Streets).is_empty());
    }
}
