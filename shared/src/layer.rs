use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::geometry::{self, LonLat, ParsedGeometry};
use crate::projection::{self, Extent, MapPoint};

/// A geometry string plus how to paint it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GeometryLayer {
    pub geometry: String,
    pub label: Option<String>,
    pub fill_color: Option<String>,
    pub stroke_color: Option<String>,
    pub stroke_width: Option<f64>,
}

impl GeometryLayer {
    pub fn new(geometry: impl Into<String>) -> Self {
        Self {
            geometry: geometry.into(),
            ..Self::default()
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_colors(mut self, fill: &str, stroke: &str) -> Self {
        self.fill_color = Some(fill.to_string());
        self.stroke_color = Some(stroke.to_string());
        self
    }
}

/// Which label toggle governs a layer: the first layer is the containing area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerRole {
    Area,
    Plot,
}

impl LayerRole {
    pub fn for_index(index: usize) -> Self {
        if index == 0 { LayerRole::Area } else { LayerRole::Plot }
    }
}

/// A layer with its ring decoded and projected once, kept for the life of the input.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedLayer {
    pub source: GeometryLayer,
    pub role: LayerRole,
    pub points: Vec<LonLat>,
    pub projected: Vec<MapPoint>,
    pub extent: Extent,
    /// Label anchor in projected space.
    pub label_anchor: Option<MapPoint>,
    pub visible: bool,
}

impl PreparedLayer {
    pub fn is_drawable(&self) -> bool {
        self.projected.len() >= 3
    }
}

/// Decode every layer, preserving indices. A malformed layer becomes an
/// empty ring so the rest still render.
pub fn prepare_layers(layers: &[GeometryLayer]) -> Vec<PreparedLayer> {
    layers
        .iter()
        .enumerate()
        .map(|(index, layer)| {
            let points = match geometry::parse_tagged(&layer.geometry) {
                ParsedGeometry::Unparseable(err) => {
                    warn!(index, error = %err, "skipping malformed geometry layer");
                    Vec::new()
                }
                parsed => parsed.into_points(),
            };
            let projected = projection::forward_ring(&points);
            PreparedLayer {
                source: layer.clone(),
                role: LayerRole::for_index(index),
                extent: Extent::from_points(&projected),
                label_anchor: geometry::ring_centroid(&points).map(projection::forward),
                points,
                projected,
                visible: true,
            }
        })
        .collect()
}
