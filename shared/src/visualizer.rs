//! Viewer state: layers, markers, clustering, highlight and the commands a
//! host sends to a mounted `MapVisualizer`.

use tracing::{debug, warn};

use crate::basemap::BasemapKind;
use crate::cluster::{self, Cluster, ClusterClick};
use crate::config::{FIT_PADDING_PX, SINGLE_MARKER_ZOOM, VisualizerConfig};
use crate::layer::{self, GeometryLayer, LayerRole, PreparedLayer};
use crate::marker::MapMarker;
use crate::projection::{self, Extent, MapPoint};
use crate::scene::{Scene, Shape};
use crate::style::{self, LayerFlags, MarkerStyle, PolygonStyle};
use crate::viewport::MapView;

/// Extra pixels around a symbol that still count as hitting it.
const HIT_SLACK_PX: f64 = 2.0;

#[derive(Debug, Clone, PartialEq)]
pub enum MapCommand {
    FitToMarkers,
    HighlightAndFlyTo(usize),
    ClearHighlight,
    ToggleGeometryVisibility(usize),
    /// Re-measure the container after a layout change the window never saw,
    /// such as a dialog opening or a panel collapsing. The widget owns the
    /// container, so it takes the measurement and calls [`VisualizerState::set_size`].
    UpdateMapSize,
    SetBasemap(BasemapKind),
    SetAreaLabels(bool),
    SetPlotLabels(bool),
    FitToGeometries,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MapEvent {
    MapClick { latitude: f64, longitude: f64 },
    MarkerClick { index: usize, marker: MapMarker },
    MarkerHover(Option<usize>),
    ViewChanged,
}

#[derive(Debug, Clone)]
struct ClusterCache {
    zoom: f64,
    clusters: Vec<Cluster>,
}

#[derive(Debug, Clone)]
pub struct VisualizerState {
    config: VisualizerConfig,
    view: MapView,
    layers: Vec<PreparedLayer>,
    markers: Vec<MapMarker>,
    projected_markers: Vec<Option<MapPoint>>,
    highlighted: Option<usize>,
    hovered: Option<usize>,
    cache: Option<ClusterCache>,
}

impl VisualizerState {
    pub fn new(config: VisualizerConfig) -> Self {
        let view = MapView::new(
            projection::forward(config.center),
            config.zoom,
            config.max_zoom,
        );
        Self {
            config,
            view,
            layers: Vec::new(),
            markers: Vec::new(),
            projected_markers: Vec::new(),
            highlighted: None,
            hovered: None,
            cache: None,
        }
    }

    pub fn config(&self) -> &VisualizerConfig {
        &self.config
    }

    pub fn view(&self) -> &MapView {
        &self.view
    }

    /// Mutable view for user pan/zoom; cluster membership follows the new zoom.
    pub fn view_mut(&mut self) -> &mut MapView {
        &mut self.view
    }

    pub fn basemap(&self) -> BasemapKind {
        self.config.basemap
    }

    pub fn layers(&self) -> &[PreparedLayer] {
        &self.layers
    }

    pub fn markers(&self) -> &[MapMarker] {
        &self.markers
    }

    pub fn highlighted(&self) -> Option<usize> {
        self.highlighted
    }

    pub fn hovered(&self) -> Option<usize> {
        self.hovered
    }

    /// Replace the geometry overlay. Visibility resets with the new input.
    pub fn set_layers(&mut self, layers: &[GeometryLayer]) {
        self.layers = layer::prepare_layers(layers);
        if self.highlighted.is_some_and(|i| i >= self.layers.len()) {
            self.highlighted = None;
        }
        debug!(count = self.layers.len(), "geometry layers updated");
    }

    pub fn set_markers(&mut self, markers: Vec<MapMarker>) {
        self.projected_markers = markers
            .iter()
            .enumerate()
            .map(|(index, marker)| {
                if marker.has_valid_position() {
                    Some(marker.projected())
                } else {
                    warn!(
                        index,
                        latitude = marker.latitude,
                        longitude = marker.longitude,
                        "skipping marker with invalid position"
                    );
                    None
                }
            })
            .collect();
        self.markers = markers;
        self.cache = None;
        if self.hovered.is_some_and(|i| i >= self.markers.len()) {
            self.hovered = None;
        }
    }

    /// Highlight from the host's `highlighted_index` input, without moving the view.
    pub fn set_highlight(&mut self, index: Option<usize>) {
        self.highlighted = index.filter(|i| *i < self.layers.len());
    }

    pub fn set_clustering(&mut self, enabled: bool, distance_px: f64) {
        if self.config.clustering != enabled || self.config.cluster_distance_px != distance_px {
            self.config.clustering = enabled;
            self.config.cluster_distance_px = distance_px;
            self.cache = None;
        }
    }

    /// Apply a measured container size. A 0x0 measurement comes from a
    /// hidden container and is ignored so the surface keeps its last size.
    pub fn set_size(&mut self, width: f64, height: f64) -> Vec<MapEvent> {
        if width <= 0.0 || height <= 0.0 {
            debug!(width, height, "ignoring empty map size");
            return Vec::new();
        }
        if self.view.width == width && self.view.height == height {
            return Vec::new();
        }
        self.view.set_size(width, height);
        vec![MapEvent::ViewChanged]
    }

    pub fn set_map_click(&mut self, enabled: bool) {
        self.config.enable_map_click = enabled;
    }

    pub fn apply(&mut self, command: MapCommand) -> Vec<MapEvent> {
        match command {
            MapCommand::FitToMarkers => self.fit_to_markers(),
            MapCommand::HighlightAndFlyTo(index) => self.highlight_and_fly_to(index),
            MapCommand::ClearHighlight => {
                self.highlighted = None;
                Vec::new()
            }
            MapCommand::ToggleGeometryVisibility(index) => {
                match self.layers.get_mut(index) {
                    Some(layer) => layer.visible = !layer.visible,
                    None => warn!(index, "visibility toggle for unknown layer"),
                }
                Vec::new()
            }
            MapCommand::UpdateMapSize => {
                debug!("map size update left to the widget's measurement");
                Vec::new()
            }
            MapCommand::SetBasemap(kind) => {
                self.config.basemap = kind;
                Vec::new()
            }
            MapCommand::SetAreaLabels(show) => {
                self.config.show_area_labels = show;
                Vec::new()
            }
            MapCommand::SetPlotLabels(show) => {
                self.config.show_plot_labels = show;
                Vec::new()
            }
            MapCommand::FitToGeometries => self.fit_to_geometries(),
        }
    }

    /// Show every marker. One marker is centered at a fixed zoom instead of
    /// fitting a zero-size extent.
    pub fn fit_to_markers(&mut self) -> Vec<MapEvent> {
        let points: Vec<MapPoint> = self.projected_markers.iter().flatten().copied().collect();
        match points.as_slice() {
            [] => return Vec::new(),
            [only] => self.view.center_on(*only, SINGLE_MARKER_ZOOM),
            _ => self.view.fit_extent_default(&Extent::from_points(&points)),
        }
        vec![MapEvent::ViewChanged]
    }

    pub fn fit_to_geometries(&mut self) -> Vec<MapEvent> {
        let mut extent = Extent::empty();
        for layer in self.layers.iter().filter(|l| l.visible) {
            extent.merge(&layer.extent);
        }
        if extent.is_empty() {
            return Vec::new();
        }
        self.view.fit_extent_default(&extent);
        vec![MapEvent::ViewChanged]
    }

    pub fn highlight_and_fly_to(&mut self, index: usize) -> Vec<MapEvent> {
        let Some(layer) = self.layers.get(index) else {
            warn!(index, "highlight requested for unknown layer");
            return Vec::new();
        };
        let extent = layer.extent;
        self.highlighted = Some(index);
        if extent.is_empty() {
            return Vec::new();
        }
        self.view.fit_extent_default(&extent);
        vec![MapEvent::ViewChanged]
    }

    fn flags_for(&self, index: usize, layer: &PreparedLayer) -> LayerFlags {
        let show_label = match layer.role {
            LayerRole::Area => self.config.show_area_labels,
            LayerRole::Plot => self.config.show_plot_labels,
        };
        LayerFlags {
            visible: layer.visible,
            highlighted: self.highlighted == Some(index),
            show_label,
        }
    }

    /// Style for layer `index`, recomputed from the layer's own colors on every call.
    pub fn layer_style(&self, index: usize) -> Option<PolygonStyle> {
        let layer = self.layers.get(index)?;
        Some(style::polygon_style(
            &layer.source,
            self.flags_for(index, layer),
        ))
    }

    /// Layer indices bottom to top; the highlighted layer paints last.
    pub fn paint_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.layers.len())
            .filter(|i| self.highlighted != Some(*i))
            .collect();
        order.extend(self.highlighted.filter(|i| *i < self.layers.len()));
        order
    }

    /// Current marker groups. Without clustering every marker is its own group.
    pub fn clusters(&mut self) -> &[Cluster] {
        let zoom = self.view.zoom;
        let stale = self.cache.as_ref().is_none_or(|c| c.zoom != zoom);
        if stale {
            let valid: Vec<usize> = (0..self.projected_markers.len())
                .filter(|i| self.projected_markers[*i].is_some())
                .collect();
            let points: Vec<MapPoint> = self.projected_markers.iter().flatten().copied().collect();
            let distance = if self.config.clustering {
                self.config.cluster_distance_px
            } else {
                0.0
            };
            let mut clusters = cluster::cluster_points(&points, distance, self.view.resolution());
            for c in &mut clusters {
                for member in &mut c.members {
                    *member = valid[*member];
                }
            }
            self.cache = Some(ClusterCache { zoom, clusters });
        }
        match &self.cache {
            Some(cache) => &cache.clusters,
            None => &[],
        }
    }

    fn symbol_style(&self, cluster: &Cluster) -> MarkerStyle {
        style::cluster_style(cluster.len(), || {
            let index = cluster.first().unwrap_or_default();
            let marker = &self.markers[index];
            style::marker_style(
                marker.color.as_deref(),
                self.hovered == Some(index),
                marker.label.as_deref(),
            )
        })
    }

    /// Top-most cluster or marker whose symbol covers the screen position.
    /// Index into the current cluster list of the top-most symbol under a
    /// screen position.
    pub fn hit_test(&mut self, sx: f64, sy: f64) -> Option<usize> {
        self.clusters();
        let clusters = self.cache.as_ref().map(|c| c.clusters.as_slice())?;
        clusters.iter().enumerate().rev().find_map(|(i, c)| {
            let (cx, cy) = self.view.world_to_screen(c.center);
            let radius = self.symbol_style(c).circle.radius + HIT_SLACK_PX;
            ((cx - sx).powi(2) + (cy - sy).powi(2) <= radius * radius).then_some(i)
        })
    }

    /// Resolve a click: marker pass-through, cluster drill-down, or map click.
    pub fn click(&mut self, sx: f64, sy: f64) -> Vec<MapEvent> {
        if let Some(ci) = self.hit_test(sx, sy) {
            let cluster = self.clusters()[ci].clone();
            return self.resolve(cluster);
        }

        if !self.config.enable_map_click {
            return Vec::new();
        }
        let position = projection::inverse(self.view.screen_to_world(sx, sy));
        vec![MapEvent::MapClick {
            latitude: position.lat,
            longitude: position.lon,
        }]
    }

    fn resolve(&mut self, cluster: Cluster) -> Vec<MapEvent> {
        match cluster::resolve_cluster_click(&cluster, &self.markers) {
            ClusterClick::Marker(index) => {
                debug!(index, members = cluster.len(), "marker click");
                vec![MapEvent::MarkerClick {
                    index,
                    marker: self.markers[index].clone(),
                }]
            }
            ClusterClick::FitExtent(extent) => {
                debug!(members = cluster.len(), "cluster drill-down");
                self.view.fit_extent(&extent, FIT_PADDING_PX);
                vec![MapEvent::ViewChanged]
            }
            ClusterClick::Nothing => Vec::new(),
        }
    }

    /// Update hover from a pointer position, reporting only changes.
    pub fn pointer_move(&mut self, sx: f64, sy: f64) -> Vec<MapEvent> {
        let hovered = match self.hit_test(sx, sy) {
            Some(ci) => {
                let clusters = self.clusters();
                match clusters[ci].members.as_slice() {
                    [only] => Some(*only),
                    _ => None,
                }
            }
            None => None,
        };
        self.set_hovered(hovered)
    }

    pub fn pointer_left(&mut self) -> Vec<MapEvent> {
        self.set_hovered(None)
    }

    fn set_hovered(&mut self, hovered: Option<usize>) -> Vec<MapEvent> {
        if self.hovered == hovered {
            return Vec::new();
        }
        self.hovered = hovered;
        vec![MapEvent::MarkerHover(hovered)]
    }

    pub fn cursor(&mut self, sx: f64, sy: f64) -> &'static str {
        if self.hit_test(sx, sy).is_some() {
            "pointer"
        } else if self.config.enable_map_click {
            "crosshair"
        } else {
            "grab"
        }
    }

    /// Everything to paint: polygons in paint order, then marker symbols.
    pub fn scene(&mut self) -> Scene {
        let mut scene = Scene::default();
        for index in self.paint_order() {
            let layer = &self.layers[index];
            if !layer.is_drawable() {
                continue;
            }
            let style = style::polygon_style(&layer.source, self.flags_for(index, layer));
            scene.push(Shape::Polygon {
                ring: layer.projected.clone(),
                label_at: layer.label_anchor,
                style,
            });
        }

        self.clusters();
        if let Some(cache) = &self.cache {
            for c in &cache.clusters {
                scene.push(Shape::Marker {
                    at: c.center,
                    style: self.symbol_style(c),
                });
            }
        }
        scene
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::LonLat;

    fn assert_close(actual: f64, expected: f64, tolerance: f64) {
        let diff = (actual - expected).abs();
        assert!(
            diff < tolerance,
            "expected {expected}, got {actual} (diff: {diff})"
        );
    }

    fn state(config: VisualizerConfig) -> VisualizerState {
        let mut state = VisualizerState::new(config);
        state.set_size(800.0, 600.0);
        state
    }

    fn clustered(zoom: f64) -> VisualizerState {
        state(VisualizerConfig {
            clustering: true,
            zoom,
            ..VisualizerConfig::default()
        })
    }

    fn screen_of_first_cluster(state: &mut VisualizerState) -> (f64, f64) {
        let center = state.clusters()[0].center;
        state.view().world_to_screen(center)
    }

    fn layers() -> Vec<GeometryLayer> {
        vec![
            GeometryLayer::new("((-48,-16),(-47,-16),(-47,-15),(-48,-15))").with_label("Area A"),
            GeometryLayer::new("((-47.9,-15.9),(-47.8,-15.9),(-47.8,-15.8))").with_label("Plot 1"),
            GeometryLayer::new("((-47.5,-15.5),(-47.4,-15.5),(-47.4,-15.4))").with_label("Plot 2"),
        ]
    }

    #[test]
    fn mixed_cluster_click_fits_without_marker_click() {
        let mut state = clustered(2.0);
        state.set_markers(vec![
            MapMarker::at(-15.78, -47.93),
            MapMarker::at(-15.78, -47.93),
            MapMarker::at(-10.0, -50.0),
        ]);
        assert_eq!(state.clusters().len(), 1);
        let (sx, sy) = screen_of_first_cluster(&mut state);
        let zoom_before = state.view().zoom;

        let events = state.click(sx, sy);
        assert_eq!(events, vec![MapEvent::ViewChanged]);
        assert!(state.view().zoom > zoom_before);
        assert!(!events.iter().any(|e| matches!(e, MapEvent::MarkerClick { .. })));
    }

    #[test]
    fn stacked_cluster_click_reaches_first_marker_once() {
        let mut state = clustered(2.0);
        let markers = vec![
            MapMarker::at(-15.78, -47.93).with_label("first"),
            MapMarker::at(-15.78, -47.93).with_label("second"),
        ];
        state.set_markers(markers.clone());
        let (sx, sy) = screen_of_first_cluster(&mut state);

        let events = state.click(sx, sy);
        assert_eq!(
            events,
            vec![MapEvent::MarkerClick {
                index: 0,
                marker: markers[0].clone(),
            }]
        );
    }

    #[test]
    fn single_marker_fit_uses_fixed_zoom() {
        let mut state = state(VisualizerConfig::default());
        state.set_markers(vec![MapMarker::at(10.0, 20.0)]);
        let events = state.apply(MapCommand::FitToMarkers);
        assert_eq!(events, vec![MapEvent::ViewChanged]);
        let expected = projection::forward(LonLat::new(20.0, 10.0));
        assert_close(state.view().center.x, expected.x, 1e-6);
        assert_close(state.view().center.y, expected.y, 1e-6);
        assert_eq!(state.view().zoom, SINGLE_MARKER_ZOOM);
    }

    #[test]
    fn fit_without_markers_is_a_no_op() {
        let mut state = state(VisualizerConfig::default());
        let before = state.view().clone();
        assert!(state.apply(MapCommand::FitToMarkers).is_empty());
        assert_eq!(state.view(), &before);
    }

    #[test]
    fn fit_to_many_markers_contains_them() {
        let mut state = state(VisualizerConfig::default());
        state.set_markers(vec![MapMarker::at(-15.0, -48.0), MapMarker::at(-10.0, -45.0)]);
        state.apply(MapCommand::FitToMarkers);
        let visible = state.view().visible_extent();
        for m in state.markers().to_vec() {
            assert!(visible.contains(m.projected()));
        }
    }

    #[test]
    fn highlight_is_idempotent_and_paints_last() {
        let mut state = state(VisualizerConfig::default());
        state.set_layers(&layers());
        state.apply(MapCommand::HighlightAndFlyTo(1));
        let first_style = state.layer_style(1);
        let first_scene = state.scene();
        state.apply(MapCommand::HighlightAndFlyTo(1));
        assert_eq!(state.layer_style(1), first_style);
        assert_eq!(state.scene(), first_scene);
        assert_close(first_style.unwrap().fill.unwrap().a, 0.5, 1e-9);
        assert_eq!(state.paint_order(), vec![0, 2, 1]);

        state.apply(MapCommand::ClearHighlight);
        assert_eq!(state.paint_order(), vec![0, 1, 2]);
        assert_close(state.layer_style(1).unwrap().fill.unwrap().a, 0.2, 1e-9);
    }

    #[test]
    fn fly_to_moves_view_onto_layer() {
        let mut state = state(VisualizerConfig::default());
        state.set_layers(&layers());
        state.apply(MapCommand::HighlightAndFlyTo(2));
        let extent = state.layers()[2].extent;
        assert!(state.view().visible_extent().contains(extent.center()));
        assert!(state.apply(MapCommand::HighlightAndFlyTo(9)).is_empty());
        assert_eq!(state.highlighted(), Some(2));
    }

    #[test]
    fn hidden_layer_keeps_parsed_points() {
        let mut state = state(VisualizerConfig::default());
        state.set_layers(&layers());
        state.apply(MapCommand::ToggleGeometryVisibility(1));
        assert!(state.layer_style(1).unwrap().is_hidden());
        assert_eq!(state.layers()[1].points.len(), 3);
        state.apply(MapCommand::ToggleGeometryVisibility(1));
        assert!(!state.layer_style(1).unwrap().is_hidden());
    }

    #[test]
    fn label_toggles_are_independent() {
        let mut state = state(VisualizerConfig::default());
        state.set_layers(&layers());
        state.apply(MapCommand::SetPlotLabels(false));
        assert!(state.layer_style(0).unwrap().label.is_some());
        assert!(state.layer_style(1).unwrap().label.is_none());
        state.apply(MapCommand::SetAreaLabels(false));
        state.apply(MapCommand::SetPlotLabels(true));
        assert!(state.layer_style(0).unwrap().label.is_none());
        assert!(state.layer_style(2).unwrap().label.is_some());
    }

    #[test]
    fn malformed_layer_is_skipped_in_scene() {
        let mut state = state(VisualizerConfig::default());
        let mut input = layers();
        input[1].geometry = "((1,2),(bad,4))".to_string();
        state.set_layers(&input);
        let polygons = state
            .scene()
            .shapes
            .iter()
            .filter(|s| matches!(s, Shape::Polygon { .. }))
            .count();
        assert_eq!(polygons, 2);
    }

    #[test]
    fn map_click_only_when_enabled() {
        let mut state = state(VisualizerConfig::default());
        assert!(state.click(10.0, 10.0).is_empty());

        state.set_map_click(true);
        let events = state.click(400.0, 300.0);
        let [MapEvent::MapClick { latitude, longitude }] = events.as_slice() else {
            panic!("expected a map click, got {events:?}");
        };
        let center = projection::inverse(state.view().center);
        assert_close(*latitude, center.lat, 1e-9);
        assert_close(*longitude, center.lon, 1e-9);
    }

    #[test]
    fn marker_click_is_not_a_map_click() {
        let mut state = state(VisualizerConfig {
            enable_map_click: true,
            ..VisualizerConfig::default()
        });
        state.set_markers(vec![MapMarker::at(-15.78, -47.93)]);
        let (sx, sy) = screen_of_first_cluster(&mut state);
        let events = state.click(sx + 3.0, sy);
        assert!(matches!(events.as_slice(), [MapEvent::MarkerClick { index: 0, .. }]));
    }

    #[test]
    fn hover_reports_changes_only() {
        let mut state = state(VisualizerConfig::default());
        state.set_markers(vec![MapMarker::at(-15.78, -47.93).with_label("Specimen 3")]);
        let (sx, sy) = screen_of_first_cluster(&mut state);
        assert_eq!(state.pointer_move(sx, sy), vec![MapEvent::MarkerHover(Some(0))]);
        assert!(state.pointer_move(sx + 1.0, sy).is_empty());

        let scene = state.scene();
        let Some(Shape::Marker { style, .. }) = scene.shapes.last() else {
            panic!("expected a marker shape");
        };
        assert_eq!(style.label.as_ref().map(|l| l.text.as_str()), Some("Specimen 3"));

        assert_eq!(state.pointer_move(0.0, 0.0), vec![MapEvent::MarkerHover(None)]);
    }

    #[test]
    fn invalid_markers_are_skipped() {
        let mut state = state(VisualizerConfig::default());
        state.set_markers(vec![MapMarker::at(f64::NAN, 0.0), MapMarker::at(1.0, 1.0)]);
        let clusters = state.clusters().to_vec();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].members, vec![1]);
    }

    #[test]
    fn clusters_follow_zoom() {
        let mut state = clustered(2.0);
        state.set_markers(vec![
            MapMarker::at(-15.78, -47.93),
            MapMarker::at(-15.78, -47.93),
            MapMarker::at(-10.0, -50.0),
        ]);
        assert_eq!(state.clusters().len(), 1);
        state.view_mut().zoom = 8.0;
        assert_eq!(state.clusters().len(), 2);
    }

    #[test]
    fn basemap_command_switches_provider() {
        let mut state = state(VisualizerConfig::default());
        assert!(state.apply(MapCommand::SetBasemap(BasemapKind::Topo)).is_empty());
        assert_eq!(state.basemap(), BasemapKind::Topo);
    }

    #[test]
    fn hidden_container_size_keeps_the_surface() {
        let mut state = state(VisualizerConfig::default());
        assert!(state.set_size(0.0, 0.0).is_empty());
        assert!(state.view().has_size());
        assert_eq!((state.view().width, state.view().height), (800.0, 600.0));
        assert!(!crate::basemap::visible_tiles(state.view(), state.basemap()).is_empty());
    }

    #[test]
    fn measured_size_reports_only_changes() {
        let mut state = state(VisualizerConfig::default());
        assert!(state.set_size(800.0, 600.0).is_empty());
        assert_eq!(state.set_size(1024.0, 300.0), vec![MapEvent::ViewChanged]);
        assert_eq!((state.view().width, state.view().height), (1024.0, 300.0));
        assert!(state.apply(MapCommand::UpdateMapSize).is_empty());
        assert_eq!(state.view().width, 1024.0);
    }
}
