//! Draw lists handed to the canvas surface. Coordinates are projected meters;
//! the surface maps them to pixels with the current view.

use crate::projection::MapPoint;
use crate::style::{CircleStyle, MarkerStyle, PolygonStyle, StrokeStyle};

#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// Closed ring; the label, if any, is drawn at `label_at`.
    Polygon {
        ring: Vec<MapPoint>,
        style: PolygonStyle,
        label_at: Option<MapPoint>,
    },
    /// Open polyline (the sketch edge while drawing).
    Path {
        points: Vec<MapPoint>,
        stroke: StrokeStyle,
    },
    Circle {
        at: MapPoint,
        style: CircleStyle,
    },
    Marker {
        at: MapPoint,
        style: MarkerStyle,
    },
}

/// Shapes in paint order, bottom first. Polygon labels go above every shape.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Scene {
    pub shapes: Vec<Shape>,
}

impl Scene {
    pub fn push(&mut self, shape: Shape) {
        self.shapes.push(shape);
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }
}
