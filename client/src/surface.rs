//! Paints a frame on a 2D canvas: basemap tiles first, then the scene.

use std::f64::consts::TAU;

use fieldmap_shared::basemap::{self, VisibleTile};
use fieldmap_shared::projection::{Extent, MapPoint};
use fieldmap_shared::scene::{Scene, Shape};
use fieldmap_shared::style::{CircleStyle, LabelStyle, PolygonStyle, StrokeStyle};
use fieldmap_shared::viewport::MapView;
use web_sys::CanvasRenderingContext2d;

use crate::tiles::{self, TileLayer};

const BACKGROUND: &str = "#e5e3df";
const DASH_ON: f64 = 8.0;
const DASH_OFF: f64 = 6.0;

/// Draw one frame. Tiles that are not loaded yet are requested; the layer
/// asks for a repaint when they arrive.
pub fn paint(
    ctx: &CanvasRenderingContext2d,
    view: &MapView,
    tiles: &TileLayer,
    scene: &Scene,
) {
    ctx.set_fill_style_str(BACKGROUND);
    ctx.fill_rect(0.0, 0.0, view.width, view.height);

    let visible = basemap::visible_tiles(view, tiles.kind());
    tiles.request(&visible);
    paint_tiles(ctx, view, tiles, &visible);
    paint_scene(ctx, view, scene);
}

fn paint_tiles(
    ctx: &CanvasRenderingContext2d,
    view: &MapView,
    tiles: &TileLayer,
    visible: &[VisibleTile],
) {
    ctx.set_image_smoothing_enabled(true);
    for tile in visible {
        let Some((image, from)) = tiles.best(tile.coord) else {
            continue;
        };
        let (x, y, w, h) = tile_rect(view, &tile.extent);
        let size = image.natural_width().max(1) as f64;
        let (fx, fy, fs) = tiles::ancestor_crop(tile.coord, from);
        ctx.draw_image_with_html_image_element_and_sw_and_sh_and_dx_and_dy_and_dw_and_dh(
            &image,
            fx * size,
            fy * size,
            fs * size,
            fs * size,
            x,
            y,
            w,
            h,
        )
        .ok();
    }
}

/// Screen rectangle for a tile, snapped to whole pixels so neighbors share
/// edges without hairline gaps.
pub fn tile_rect(view: &MapView, extent: &Extent) -> (f64, f64, f64, f64) {
    let (x0, y0) = view.world_to_screen(MapPoint::new(extent.min_x, extent.max_y));
    let (x1, y1) = view.world_to_screen(MapPoint::new(extent.max_x, extent.min_y));
    let (x0, y0, x1, y1) = (x0.round(), y0.round(), x1.round(), y1.round());
    (x0, y0, x1 - x0, y1 - y0)
}

pub fn paint_scene(ctx: &CanvasRenderingContext2d, view: &MapView, scene: &Scene) {
    let mut polygon_labels: Vec<(MapPoint, &LabelStyle)> = Vec::new();

    for shape in &scene.shapes {
        match shape {
            Shape::Polygon {
                ring,
                style,
                label_at,
            } => {
                paint_polygon(ctx, view, ring, style);
                if let (Some(at), Some(label)) = (label_at, style.label.as_ref()) {
                    polygon_labels.push((*at, label));
                }
            }
            Shape::Path { points, stroke } => {
                if trace_path(ctx, view, points, false) {
                    apply_stroke(ctx, stroke);
                    ctx.stroke();
                }
            }
            Shape::Circle { at, style } => {
                let (x, y) = view.world_to_screen(*at);
                paint_circle(ctx, x, y, style);
            }
            Shape::Marker { at, style } => {
                let (x, y) = view.world_to_screen(*at);
                paint_circle(ctx, x, y, &style.circle);
                if let Some(label) = &style.label {
                    paint_label(ctx, x, y, label);
                }
            }
        }
    }

    for (at, label) in polygon_labels {
        let (x, y) = view.world_to_screen(at);
        paint_label(ctx, x, y, label);
    }
    ctx.set_line_dash(&js_sys::Array::new()).ok();
}

fn paint_polygon(
    ctx: &CanvasRenderingContext2d,
    view: &MapView,
    ring: &[MapPoint],
    style: &PolygonStyle,
) {
    if style.is_hidden() || !trace_path(ctx, view, ring, true) {
        return;
    }
    if let Some(fill) = style.fill {
        ctx.set_fill_style_str(&fill.css());
        ctx.fill();
    }
    if let Some(stroke) = &style.stroke
        && stroke.width > 0.0
    {
        apply_stroke(ctx, stroke);
        ctx.stroke();
    }
}

fn trace_path(
    ctx: &CanvasRenderingContext2d,
    view: &MapView,
    points: &[MapPoint],
    closed: bool,
) -> bool {
    let screen = screen_points(view, points);
    let Some(((x0, y0), rest)) = screen.split_first() else {
        return false;
    };
    if rest.is_empty() {
        return false;
    }
    ctx.begin_path();
    ctx.move_to(*x0, *y0);
    for (x, y) in rest {
        ctx.line_to(*x, *y);
    }
    if closed {
        ctx.close_path();
    }
    true
}

pub fn screen_points(view: &MapView, points: &[MapPoint]) -> Vec<(f64, f64)> {
    points.iter().map(|p| view.world_to_screen(*p)).collect()
}

fn apply_stroke(ctx: &CanvasRenderingContext2d, stroke: &StrokeStyle) {
    ctx.set_stroke_style_str(&stroke.color.css());
    ctx.set_line_width(stroke.width);
    ctx.set_line_join("round");
    let dash = if stroke.dashed {
        js_sys::Array::of2(&DASH_ON.into(), &DASH_OFF.into())
    } else {
        js_sys::Array::new()
    };
    ctx.set_line_dash(&dash).ok();
}

fn paint_circle(ctx: &CanvasRenderingContext2d, x: f64, y: f64, style: &CircleStyle) {
    ctx.begin_path();
    if ctx.arc(x, y, style.radius, 0.0, TAU).is_err() {
        return;
    }
    ctx.set_fill_style_str(&style.fill.css());
    ctx.fill();
    if style.stroke.width > 0.0 {
        apply_stroke(ctx, &style.stroke);
        ctx.stroke();
    }
}

fn paint_label(ctx: &CanvasRenderingContext2d, x: f64, y: f64, label: &LabelStyle) {
    let y = y + label.offset_y;
    ctx.set_font(label.font);
    ctx.set_text_align("center");
    ctx.set_text_baseline("middle");
    ctx.set_line_dash(&js_sys::Array::new()).ok();
    if label.halo_width > 0.0 {
        ctx.set_line_join("round");
        ctx.set_line_width(label.halo_width);
        ctx.set_stroke_style_str(&label.halo.css());
        ctx.stroke_text(&label.text, x, y).ok();
    }
    ctx.set_fill_style_str(&label.fill.css());
    ctx.fill_text(&label.text, x, y).ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldmap_shared::basemap::{BasemapKind, visible_tiles};

    fn view(zoom: f64) -> MapView {
        let mut view = MapView::new(MapPoint::new(0.0, 0.0), zoom, 19.0);
        view.set_size(512.0, 512.0);
        view
    }

    #[test]
    fn adjacent_tiles_share_pixel_edges() {
        let view = view(2.3);
        let tiles = visible_tiles(&view, BasemapKind::Streets);
        assert!(tiles.len() > 1);
        for a in &tiles {
            let (ax, ay, aw, ah) = tile_rect(&view, &a.extent);
            assert_eq!(ax.fract(), 0.0);
            assert_eq!(ay.fract(), 0.0);
            for b in &tiles {
                if (a.extent.max_x - b.extent.min_x).abs() < 1e-6
                    && (a.extent.max_y - b.extent.max_y).abs() < 1e-6
                {
                    let (bx, _, _, _) = tile_rect(&view, &b.extent);
                    assert_eq!(ax + aw, bx);
                }
                if (a.extent.min_y - b.extent.max_y).abs() < 1e-6
                    && (a.extent.min_x - b.extent.min_x).abs() < 1e-6
                {
                    let (_, by, _, _) = tile_rect(&view, &b.extent);
                    assert_eq!(ay + ah, by);
                }
            }
        }
    }

    #[test]
    fn tile_at_integer_zoom_is_256_pixels() {
        let view = view(3.0);
        let tile = visible_tiles(&view, BasemapKind::Streets)[0];
        let (_, _, w, h) = tile_rect(&view, &tile.extent);
        assert_eq!((w, h), (256.0, 256.0));
    }

    #[test]
    fn screen_points_follow_the_view() {
        let view = view(3.0);
        let pts = screen_points(&view, &[MapPoint::new(0.0, 0.0)]);
        assert_eq!(pts, vec![(256.0, 256.0)]);
    }
}
