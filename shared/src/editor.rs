//! Draw/modify session for a single polygon.
//!
//! The session owns the ring while the editor is mounted and reports every
//! change as an [`EditorEvent`]. It never touches the DOM; the client feeds
//! it projected pointer positions and the current [`MapView`] (needed to
//! measure snap tolerances in screen pixels).

use tracing::{debug, info, warn};

use crate::config::EditorConfig;
use crate::geometry::{self, LonLat, ParsedGeometry};
use crate::projection::{self, Extent, MapPoint};
use crate::scene::{Scene, Shape};
use crate::style::{self, StrokeStyle};
use crate::viewport::MapView;

/// Fewest sketch vertices a drawing can be finished with.
pub const MIN_RING_VERTICES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawState {
    Empty,
    Drawing,
    Committed,
    /// A vertex drag is in progress; the ring stays committed.
    Modifying,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditorEvent {
    /// The committed geometry changed; `None` after a clear.
    GeometryChange(Option<String>),
    DrawStart,
    DrawEnd(String),
}

/// Messages a host sends into a mounted editor.
#[derive(Debug, Clone, PartialEq)]
pub enum EditorCommand {
    /// Replace the polygon with parsed text and fit the view. Emits nothing.
    LoadGeometry(String),
    ClearDrawing,
    ToggleDrawing,
    SetDisabled(bool),
}

#[derive(Debug, Clone)]
pub struct EditorSession {
    config: EditorConfig,
    state: DrawState,
    /// Committed ring in degrees; moved vertices are re-derived from their projected position.
    ring: Vec<LonLat>,
    projected: Vec<MapPoint>,
    sketch: Vec<MapPoint>,
    dragging: Option<usize>,
    hover_vertex: Option<usize>,
    pointer: Option<MapPoint>,
}

impl EditorSession {
    pub fn new(config: EditorConfig) -> Self {
        Self {
            config,
            state: DrawState::Empty,
            ring: Vec::new(),
            projected: Vec::new(),
            sketch: Vec::new(),
            dragging: None,
            hover_vertex: None,
            pointer: None,
        }
    }

    pub fn state(&self) -> DrawState {
        self.state
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn is_disabled(&self) -> bool {
        self.config.disabled
    }

    pub fn ring(&self) -> &[LonLat] {
        &self.ring
    }

    pub fn sketch(&self) -> &[MapPoint] {
        &self.sketch
    }

    /// Serialized committed ring, or `None` when there is none.
    pub fn geometry(&self) -> Option<String> {
        geometry::serialize_ring(&self.ring)
    }

    /// Projected extent of the committed ring.
    pub fn extent(&self) -> Extent {
        Extent::from_points(&self.projected)
    }

    pub fn apply(&mut self, command: EditorCommand, view: &mut MapView) -> Vec<EditorEvent> {
        match command {
            EditorCommand::LoadGeometry(text) => {
                if let Some(extent) = self.load_geometry(&text) {
                    view.fit_extent_default(&extent);
                }
                Vec::new()
            }
            EditorCommand::ClearDrawing => self.clear_drawing(),
            EditorCommand::ToggleDrawing => self.toggle_drawing(),
            EditorCommand::SetDisabled(disabled) => self.set_disabled(disabled),
        }
    }

    /// Replace the ring with parsed `text`, returning the extent to fit.
    ///
    /// Unparseable text clears the editor without an event. A drawing in
    /// progress is abandoned either way.
    pub fn load_geometry(&mut self, text: &str) -> Option<Extent> {
        self.sketch.clear();
        self.dragging = None;
        self.hover_vertex = None;

        let points = match geometry::parse_tagged(text) {
            ParsedGeometry::Unparseable(err) => {
                if !text.trim().is_empty() {
                    warn!(error = %err, "loaded geometry is unreadable, clearing editor");
                }
                Vec::new()
            }
            parsed => parsed.into_points(),
        };

        if points.is_empty() {
            self.ring.clear();
            self.projected.clear();
            self.state = DrawState::Empty;
            return None;
        }

        self.projected = projection::forward_ring(&points);
        self.ring = points;
        self.state = DrawState::Committed;
        debug!(vertices = self.ring.len(), "geometry loaded");
        Some(self.extent())
    }

    /// Remove the polygon (or abandon a sketch) and report `None` once.
    pub fn clear_drawing(&mut self) -> Vec<EditorEvent> {
        self.ring.clear();
        self.projected.clear();
        self.sketch.clear();
        self.dragging = None;
        self.hover_vertex = None;
        self.state = DrawState::Empty;
        debug!("drawing cleared");
        vec![EditorEvent::GeometryChange(None)]
    }

    /// Enter draw mode from `Empty`, or abandon the sketch from `Drawing`.
    ///
    /// Blocked while a polygon exists or the editor is disabled.
    pub fn toggle_drawing(&mut self) -> Vec<EditorEvent> {
        match self.state {
            DrawState::Empty if self.config.disabled => {
                debug!("draw toggle ignored, editor disabled");
                Vec::new()
            }
            DrawState::Empty => {
                self.state = DrawState::Drawing;
                self.sketch.clear();
                debug!("draw mode on");
                vec![EditorEvent::DrawStart]
            }
            DrawState::Drawing => {
                self.abort_drawing();
                Vec::new()
            }
            DrawState::Committed | DrawState::Modifying => {
                debug!("draw toggle ignored, a polygon already exists");
                Vec::new()
            }
        }
    }

    /// Drop the sketch and leave draw mode without emitting anything.
    pub fn abort_drawing(&mut self) {
        if self.state == DrawState::Drawing {
            self.sketch.clear();
            self.state = DrawState::Empty;
            debug!("draw mode off, sketch discarded");
        }
    }

    pub fn set_disabled(&mut self, disabled: bool) -> Vec<EditorEvent> {
        self.config.disabled = disabled;
        if !disabled {
            return Vec::new();
        }
        self.abort_drawing();
        self.hover_vertex = None;
        if self.state == DrawState::Modifying {
            return self.end_drag();
        }
        Vec::new()
    }

    /// Place a sketch vertex at `at`.
    ///
    /// Clicking the first vertex (within the snap tolerance) with enough
    /// vertices placed finishes the ring. Other positions snap to an existing
    /// sketch vertex; a vertex on top of the last one is ignored, which
    /// absorbs the second click of a double-click.
    pub fn add_vertex(&mut self, at: MapPoint, view: &MapView) -> Vec<EditorEvent> {
        if self.state != DrawState::Drawing {
            return Vec::new();
        }

        let tolerance = self.config.snap_tolerance_px;
        if self.sketch.len() >= MIN_RING_VERTICES
            && view.pixel_distance(at, self.sketch[0]) <= tolerance
        {
            return self.finish_drawing();
        }

        let point = match nearest_vertex(&self.sketch, at, None, view, tolerance) {
            Some(i) => self.sketch[i],
            None => at,
        };
        if self.sketch.last() == Some(&point) {
            return Vec::new();
        }
        self.sketch.push(point);
        Vec::new()
    }

    /// Commit the sketch. Ignored with fewer than three vertices.
    pub fn finish_drawing(&mut self) -> Vec<EditorEvent> {
        if self.state != DrawState::Drawing {
            return Vec::new();
        }
        if self.sketch.len() < MIN_RING_VERTICES {
            debug!(vertices = self.sketch.len(), "finish ignored, not enough vertices");
            return Vec::new();
        }

        self.projected = std::mem::take(&mut self.sketch);
        self.ring = projection::inverse_ring(&self.projected);
        self.state = DrawState::Committed;
        let text = geometry::serialize(&self.ring);
        info!(vertices = self.ring.len(), "polygon drawn");
        vec![
            EditorEvent::DrawEnd(text.clone()),
            EditorEvent::GeometryChange(Some(text)),
        ]
    }

    /// Committed vertex under `at`, within the snap tolerance.
    pub fn vertex_at(&self, at: MapPoint, view: &MapView) -> Option<usize> {
        nearest_vertex(&self.projected, at, None, view, self.config.snap_tolerance_px)
    }

    /// Track the pointer for the rubber-band edge and vertex hover.
    pub fn pointer_moved(&mut self, at: MapPoint, view: &MapView) {
        self.pointer = Some(at);
        self.hover_vertex = match self.state {
            DrawState::Committed if !self.config.disabled => self.vertex_at(at, view),
            DrawState::Drawing if self.sketch.len() >= MIN_RING_VERTICES => {
                (view.pixel_distance(at, self.sketch[0]) <= self.config.snap_tolerance_px)
                    .then_some(0)
            }
            _ => None,
        };
    }

    pub fn pointer_left(&mut self) {
        self.pointer = None;
        if self.state != DrawState::Modifying {
            self.hover_vertex = None;
        }
    }

    /// Start dragging the committed vertex under `at`. Returns whether a drag began.
    pub fn begin_drag(&mut self, at: MapPoint, view: &MapView) -> bool {
        if self.state != DrawState::Committed || self.config.disabled {
            return false;
        }
        let Some(index) = self.vertex_at(at, view) else {
            return false;
        };
        self.dragging = Some(index);
        self.hover_vertex = Some(index);
        self.state = DrawState::Modifying;
        debug!(index, "vertex drag started");
        true
    }

    /// Move the dragged vertex, snapping onto another vertex of the ring.
    pub fn drag_to(&mut self, at: MapPoint, view: &MapView) {
        let Some(index) = self.dragging else {
            return;
        };
        let target = nearest_vertex(
            &self.projected,
            at,
            Some(index),
            view,
            self.config.snap_tolerance_px,
        )
        .map_or(at, |i| self.projected[i]);
        self.projected[index] = target;
        self.ring[index] = projection::inverse(target);
    }

    /// Release the dragged vertex and report the new ring.
    pub fn end_drag(&mut self) -> Vec<EditorEvent> {
        if self.state != DrawState::Modifying {
            return Vec::new();
        }
        self.dragging = None;
        self.state = DrawState::Committed;
        debug!("vertex drag finished");
        vec![EditorEvent::GeometryChange(self.geometry())]
    }

    pub fn cursor(&self) -> &'static str {
        match self.state {
            DrawState::Drawing => "crosshair",
            DrawState::Modifying => "grabbing",
            DrawState::Committed if self.hover_vertex.is_some() => "pointer",
            _ => "grab",
        }
    }

    /// Shapes for the current state: committed ring with handles, or the sketch.
    pub fn scene(&self) -> Scene {
        let config = &self.config;
        let mut scene = Scene::default();

        match self.state {
            DrawState::Committed | DrawState::Modifying => {
                scene.push(Shape::Polygon {
                    ring: self.projected.clone(),
                    style: style::editor_polygon_style(
                        &config.stroke_color,
                        &config.fill_color,
                        config.stroke_width,
                        false,
                    ),
                    label_at: None,
                });
                if !config.disabled {
                    for (i, p) in self.projected.iter().enumerate() {
                        scene.push(Shape::Circle {
                            at: *p,
                            style: style::vertex_style(
                                &config.stroke_color,
                                self.hover_vertex == Some(i),
                            ),
                        });
                    }
                }
            }
            DrawState::Drawing => {
                let sketch_style = style::editor_polygon_style(
                    &config.stroke_color,
                    &config.fill_color,
                    config.stroke_width,
                    true,
                );
                let mut path = self.sketch.clone();
                path.extend(self.pointer);
                if path.len() >= 3 {
                    scene.push(Shape::Polygon {
                        ring: path.clone(),
                        style: style::PolygonStyle {
                            stroke: None,
                            ..sketch_style.clone()
                        },
                        label_at: None,
                    });
                }
                if let Some(stroke) = sketch_style.stroke {
                    scene.push(Shape::Path {
                        points: path,
                        stroke: StrokeStyle {
                            dashed: true,
                            ..stroke
                        },
                    });
                }
                for (i, p) in self.sketch.iter().enumerate() {
                    scene.push(Shape::Circle {
                        at: *p,
                        style: style::vertex_style(
                            &config.stroke_color,
                            i == 0 && self.hover_vertex == Some(0),
                        ),
                    });
                }
            }
            DrawState::Empty => {}
        }
        scene
    }
}

/// Index of the vertex nearest `at` within `tolerance_px`, skipping `exclude`.
pub fn nearest_vertex(
    vertices: &[MapPoint],
    at: MapPoint,
    exclude: Option<usize>,
    view: &MapView,
    tolerance_px: f64,
) -> Option<usize> {
    vertices
        .iter()
        .enumerate()
        .filter(|(i, _)| Some(*i) != exclude)
        .map(|(i, v)| (i, view.pixel_distance(*v, at)))
        .filter(|(_, d)| *d <= tolerance_px)
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, _)| i)
}
