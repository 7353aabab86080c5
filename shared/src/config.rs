use serde::{Deserialize, Serialize};

use crate::basemap::BasemapKind;
use crate::geometry::LonLat;

pub const TILE_SIZE: f64 = 256.0;
pub const MIN_ZOOM: f64 = 2.0;
pub const DEFAULT_ZOOM: f64 = 4.0;
pub const DEFAULT_MAX_ZOOM: f64 = 19.0;
/// Zoom used when fitting a single marker (an extent fit would be degenerate).
pub const SINGLE_MARKER_ZOOM: f64 = 15.0;
pub const FIT_PADDING_PX: f64 = 50.0;

pub const DEFAULT_CLUSTER_DISTANCE_PX: f64 = 40.0;
/// Members closer than this (degrees) count as one GPS point.
pub const SAME_POSITION_EPSILON: f64 = 1e-4;
pub const DEFAULT_SNAP_TOLERANCE_PX: f64 = 10.0;
/// Pointer travel below this between down and up is a click, not a drag.
pub const CLICK_SLOP_PX: f64 = 5.0;

pub const MOUNT_RETRY_MS: u32 = 100;
pub const MOUNT_MAX_RETRIES: u32 = 50;

pub const TILE_CONCURRENCY: usize = 6;
pub const TILE_CACHE_MAX_ENTRIES: usize = 256;

pub const DEFAULT_STROKE_COLOR: &str = "#3388ff";
pub const DEFAULT_FILL_COLOR: &str = "rgba(51, 136, 255, 0.2)";
pub const DEFAULT_STROKE_WIDTH: f64 = 2.0;
pub const DEFAULT_MARKER_COLOR: &str = "#e74c3c";

/// Brasília, the fallback center for a blank editor.
pub const DEFAULT_CENTER: LonLat = LonLat::new(-47.93, -15.78);

/// Settings a host passes to a `GeometryEditor`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EditorConfig {
    pub center: LonLat,
    pub zoom: f64,
    pub max_zoom: f64,
    pub stroke_color: String,
    pub fill_color: String,
    pub stroke_width: f64,
    pub disabled: bool,
    pub snap_tolerance_px: f64,
    pub basemap: BasemapKind,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            center: DEFAULT_CENTER,
            zoom: DEFAULT_ZOOM,
            max_zoom: DEFAULT_MAX_ZOOM,
            stroke_color: DEFAULT_STROKE_COLOR.to_string(),
            fill_color: DEFAULT_FILL_COLOR.to_string(),
            stroke_width: DEFAULT_STROKE_WIDTH,
            disabled: false,
            snap_tolerance_px: DEFAULT_SNAP_TOLERANCE_PX,
            basemap: BasemapKind::default(),
        }
    }
}

/// Settings a host passes to a `MapVisualizer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VisualizerConfig {
    pub center: LonLat,
    pub zoom: f64,
    pub max_zoom: f64,
    pub clustering: bool,
    pub cluster_distance_px: f64,
    pub basemap: BasemapKind,
    pub enable_map_click: bool,
    pub show_area_labels: bool,
    pub show_plot_labels: bool,
    pub show_controls: bool,
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            center: DEFAULT_CENTER,
            zoom: DEFAULT_ZOOM,
            max_zoom: DEFAULT_MAX_ZOOM,
            clustering: false,
            cluster_distance_px: DEFAULT_CLUSTER_DISTANCE_PX,
            basemap: BasemapKind::default(),
            enable_map_click: false,
            show_area_labels: true,
            show_plot_labels: true,
            show_controls: true,
        }
    }
}
