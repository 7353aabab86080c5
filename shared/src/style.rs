//! Style factories. Every call builds a fresh immutable descriptor from its
//! arguments; nothing is cached between calls.

use tracing::debug;

use crate::config::{
    DEFAULT_FILL_COLOR, DEFAULT_MARKER_COLOR, DEFAULT_STROKE_COLOR, DEFAULT_STROKE_WIDTH,
};
use crate::layer::GeometryLayer;

pub const HIGHLIGHT_ALPHA_BOOST: f64 = 0.3;
pub const HIGHLIGHT_ALPHA_CAP: f64 = 0.9;
pub const HIGHLIGHT_STROKE_BOOST: f64 = 2.0;

pub const MARKER_RADIUS: f64 = 7.0;
pub const MARKER_STROKE_WIDTH: f64 = 2.0;
pub const MARKER_HOVER_RADIUS: f64 = 10.0;
pub const MARKER_HOVER_STROKE_WIDTH: f64 = 3.0;

pub const VERTEX_RADIUS: f64 = 5.0;
const LABEL_FONT: &str = "600 12px sans-serif";
const BADGE_FONT: &str = "bold 12px sans-serif";

/// An sRGB color with straight alpha in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f64,
}

impl Rgba {
    pub const WHITE: Rgba = Rgba::rgb(255, 255, 255);
    pub const DARK: Rgba = Rgba::rgb(34, 34, 34);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    /// Parse `#rgb`, `#rrggbb`, `#rrggbbaa`, `rgb(r, g, b)` or `rgba(r, g, b, a)`.
    pub fn parse(text: &str) -> Option<Rgba> {
        let text = text.trim();
        if let Some(hex) = text.strip_prefix('#') {
            return parse_hex(hex);
        }
        let lower = text.to_ascii_lowercase();
        if let Some(body) = lower
            .strip_prefix("rgba(")
            .or_else(|| lower.strip_prefix("rgb("))
            .and_then(|rest| rest.strip_suffix(')'))
        {
            return parse_functional(body);
        }
        None
    }

    /// Parse, falling back to `fallback` (which must itself parse) for anything unreadable.
    pub fn parse_or(text: Option<&str>, fallback: &str) -> Rgba {
        text.and_then(|t| {
            let parsed = Rgba::parse(t);
            if parsed.is_none() {
                debug!(color = t, "unreadable color, using default");
            }
            parsed
        })
        .or_else(|| Rgba::parse(fallback))
        .unwrap_or(Rgba::DARK)
    }

    pub fn with_alpha(self, a: f64) -> Self {
        Self {
            a: a.clamp(0.0, 1.0),
            ..self
        }
    }

    /// CSS color string for the canvas `fillStyle`/`strokeStyle` properties.
    pub fn css(&self) -> String {
        format!("rgba({}, {}, {}, {})", self.r, self.g, self.b, self.a)
    }
}

fn parse_hex(hex: &str) -> Option<Rgba> {
    let digit = |i: usize| u8::from_str_radix(hex.get(i..i + 1)?, 16).ok();
    let byte = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
    match hex.len() {
        3 => Some(Rgba::rgb(digit(0)? * 17, digit(1)? * 17, digit(2)? * 17)),
        6 => Some(Rgba::rgb(byte(0)?, byte(2)?, byte(4)?)),
        8 => Some(Rgba::rgb(byte(0)?, byte(2)?, byte(4)?).with_alpha(byte(6)? as f64 / 255.0)),
        _ => None,
    }
}

fn parse_functional(body: &str) -> Option<Rgba> {
    let parts: Vec<&str> = body.split(',').map(str::trim).collect();
    let channel = |s: &str| s.parse::<f64>().ok().map(|v| v.round().clamp(0.0, 255.0) as u8);
    match parts.as_slice() {
        &[r, g, b] => Some(Rgba::rgb(channel(r)?, channel(g)?, channel(b)?)),
        &[r, g, b, a] => {
            let alpha = a.parse::<f64>().ok().filter(|v| v.is_finite())?;
            Some(Rgba::rgb(channel(r)?, channel(g)?, channel(b)?).with_alpha(alpha))
        }
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrokeStyle {
    pub color: Rgba,
    pub width: f64,
    pub dashed: bool,
}

impl StrokeStyle {
    pub fn solid(color: Rgba, width: f64) -> Self {
        Self {
            color,
            width,
            dashed: false,
        }
    }
}

/// Text drawn centered on an anchor, with a halo for legibility over imagery.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelStyle {
    pub text: String,
    pub font: &'static str,
    pub fill: Rgba,
    pub halo: Rgba,
    pub halo_width: f64,
    /// Vertical pixel offset from the anchor (negative is up).
    pub offset_y: f64,
}

impl LabelStyle {
    pub fn new(text: &str, offset_y: f64) -> Self {
        Self {
            text: text.to_string(),
            font: LABEL_FONT,
            fill: Rgba::DARK,
            halo: Rgba::WHITE,
            halo_width: 3.0,
            offset_y,
        }
    }
}

/// How one polygon is painted. All `None` means the feature is present but invisible.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PolygonStyle {
    pub fill: Option<Rgba>,
    pub stroke: Option<StrokeStyle>,
    pub label: Option<LabelStyle>,
}

impl PolygonStyle {
    pub fn hidden() -> Self {
        Self::default()
    }

    pub fn is_hidden(&self) -> bool {
        self.fill.is_none() && self.stroke.is_none() && self.label.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CircleStyle {
    pub radius: f64,
    pub fill: Rgba,
    pub stroke: StrokeStyle,
}

/// A point symbol: a circle, an optional hover label and an optional count badge.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerStyle {
    pub circle: CircleStyle,
    pub label: Option<LabelStyle>,
    pub badge: Option<String>,
}

/// Per-layer display state that decides which style a layer gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerFlags {
    pub visible: bool,
    pub highlighted: bool,
    pub show_label: bool,
}

impl Default for LayerFlags {
    fn default() -> Self {
        Self {
            visible: true,
            highlighted: false,
            show_label: true,
        }
    }
}

/// Style for a geometry layer, always derived from the layer's own colors.
///
/// Highlighting raises fill alpha by 0.3 (capped at 0.9) and widens the stroke
/// by 2px. A hidden layer gets the empty style.
pub fn polygon_style(layer: &GeometryLayer, flags: LayerFlags) -> PolygonStyle {
    if !flags.visible {
        return PolygonStyle::hidden();
    }

    let mut fill = Rgba::parse_or(layer.fill_color.as_deref(), DEFAULT_FILL_COLOR);
    let stroke_color = Rgba::parse_or(layer.stroke_color.as_deref(), DEFAULT_STROKE_COLOR);
    let mut stroke_width = layer
        .stroke_width
        .filter(|w| w.is_finite() && *w >= 0.0)
        .unwrap_or(DEFAULT_STROKE_WIDTH);

    if flags.highlighted {
        fill = fill.with_alpha((fill.a + HIGHLIGHT_ALPHA_BOOST).min(HIGHLIGHT_ALPHA_CAP));
        stroke_width += HIGHLIGHT_STROKE_BOOST;
    }

    let label = layer
        .label
        .as_deref()
        .filter(|text| flags.show_label && !text.is_empty())
        .map(|text| LabelStyle::new(text, 0.0));

    PolygonStyle {
        fill: Some(fill),
        stroke: Some(StrokeStyle::solid(stroke_color, stroke_width)),
        label,
    }
}

/// Plain marker symbol. The label is only shown while hovered.
pub fn marker_style(color: Option<&str>, hovered: bool, label: Option<&str>) -> MarkerStyle {
    let fill = Rgba::parse_or(color, DEFAULT_MARKER_COLOR);
    let (radius, stroke_width) = if hovered {
        (MARKER_HOVER_RADIUS, MARKER_HOVER_STROKE_WIDTH)
    } else {
        (MARKER_RADIUS, MARKER_STROKE_WIDTH)
    };
    MarkerStyle {
        circle: CircleStyle {
            radius,
            fill,
            stroke: StrokeStyle::solid(Rgba::WHITE, stroke_width),
        },
        label: label
            .filter(|text| hovered && !text.is_empty())
            .map(|text| LabelStyle::new(text, -(radius + 10.0))),
        badge: None,
    }
}

/// Size/color step for a cluster of `count` members; `None` for a single marker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterTier {
    pub radius: f64,
    pub color: Rgba,
}

pub fn cluster_tier(count: usize) -> Option<ClusterTier> {
    let (radius, color) = match count {
        0 | 1 => return None,
        c if c > 100 => (30.0, Rgba::rgb(0xe7, 0x4c, 0x3c)),
        c if c > 50 => (25.0, Rgba::rgb(0xe6, 0x7e, 0x22)),
        c if c > 20 => (20.0, Rgba::rgb(0xf1, 0xc4, 0x0f)),
        c if c > 10 => (16.0, Rgba::rgb(0x2e, 0xcc, 0x71)),
        _ => (12.0, Rgba::rgb(0x34, 0x98, 0xdb)),
    };
    Some(ClusterTier { radius, color })
}

/// Cluster symbol with a count badge. Clusters of one fall back to `single`.
pub fn cluster_style(count: usize, single: impl FnOnce() -> MarkerStyle) -> MarkerStyle {
    let Some(tier) = cluster_tier(count) else {
        return single();
    };
    MarkerStyle {
        circle: CircleStyle {
            radius: tier.radius,
            fill: tier.color.with_alpha(0.85),
            stroke: StrokeStyle::solid(Rgba::WHITE, 2.0),
        },
        label: Some(LabelStyle {
            text: count.to_string(),
            font: BADGE_FONT,
            fill: Rgba::WHITE,
            halo: tier.color,
            halo_width: 0.0,
            offset_y: 0.0,
        }),
        badge: Some(count.to_string()),
    }
}

/// Editor polygon style: the committed ring, or the sketch while drawing (dashed).
pub fn editor_polygon_style(
    stroke_color: &str,
    fill_color: &str,
    stroke_width: f64,
    sketch: bool,
) -> PolygonStyle {
    let stroke = Rgba::parse_or(Some(stroke_color), DEFAULT_STROKE_COLOR);
    PolygonStyle {
        fill: Some(Rgba::parse_or(Some(fill_color), DEFAULT_FILL_COLOR)),
        stroke: Some(StrokeStyle {
            color: stroke,
            width: stroke_width,
            dashed: sketch,
        }),
        label: None,
    }
}

/// Vertex handle. `emphasized` marks the vertex the pointer would snap to or drag.
pub fn vertex_style(stroke_color: &str, emphasized: bool) -> CircleStyle {
    let stroke = Rgba::parse_or(Some(stroke_color), DEFAULT_STROKE_COLOR);
    CircleStyle {
        radius: if emphasized { VERTEX_RADIUS + 2.0 } else { VERTEX_RADIUS },
        fill: if emphasized { stroke } else { Rgba::WHITE },
        stroke: StrokeStyle::solid(stroke, 2.0),
    }
}
