//! Small DOM utilities shared by the map components.

use std::cell::Cell;
use std::rc::Rc;

use fieldmap_shared::config::{MOUNT_MAX_RETRIES, MOUNT_RETRY_MS};
use gloo_timers::future::TimeoutFuture;
use tracing::{debug, warn};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{CanvasRenderingContext2d, Element, HtmlCanvasElement, HtmlElement};

/// Pending wait for a container to get a non-zero size. Dropping it stops
/// the retries.
pub struct LayoutWait {
    cancelled: Rc<Cell<bool>>,
}

impl Drop for LayoutWait {
    fn drop(&mut self) {
        self.cancelled.set(true);
    }
}

/// Calls `on_ready(width, height)` once `el` has been laid out.
///
/// Containers inside dialogs or collapsed panels often report 0x0 right after
/// insertion, so the size is polled every `MOUNT_RETRY_MS` up to
/// `MOUNT_MAX_RETRIES` times. A container that never gets a size is logged
/// and left unmounted.
pub fn wait_for_layout(el: Element, on_ready: impl FnOnce(f64, f64) + 'static) -> LayoutWait {
    let cancelled = Rc::new(Cell::new(false));
    let flag = cancelled.clone();
    wasm_bindgen_futures::spawn_local(async move {
        for attempt in 0..=MOUNT_MAX_RETRIES {
            if flag.get() {
                return;
            }
            let (w, h) = element_size(&el);
            if w > 0.0 && h > 0.0 {
                debug!(attempt, w, h, "map container laid out");
                on_ready(w, h);
                return;
            }
            if attempt < MOUNT_MAX_RETRIES {
                TimeoutFuture::new(MOUNT_RETRY_MS).await;
            }
        }
        warn!(
            retries = MOUNT_MAX_RETRIES,
            "map container never got a size; map not initialised"
        );
    });
    LayoutWait { cancelled }
}

pub fn element_size(el: &Element) -> (f64, f64) {
    (el.client_width() as f64, el.client_height() as f64)
}

/// Pointer position relative to `el`'s top-left corner, in CSS pixels.
pub fn local_point(el: &Element, client_x: i32, client_y: i32) -> (f64, f64) {
    let rect = el.get_bounding_client_rect();
    (
        client_x as f64 - rect.left(),
        client_y as f64 - rect.top(),
    )
}

pub fn set_cursor(el: &HtmlElement, cursor: &str) {
    el.style().set_property("cursor", cursor).ok();
}

pub fn device_pixel_ratio() -> f64 {
    web_sys::window()
        .map(|w| w.device_pixel_ratio())
        .filter(|r| r.is_finite() && *r > 0.0)
        .unwrap_or(1.0)
}

/// Matches the backing store to `css_w` x `css_h` at the current pixel
/// ratio and returns a context scaled to CSS pixels.
pub fn prepare_canvas(
    canvas: &HtmlCanvasElement,
    css_w: f64,
    css_h: f64,
) -> Option<CanvasRenderingContext2d> {
    let dpr = device_pixel_ratio();
    let (bw, bh) = backing_size(css_w, css_h, dpr);
    if canvas.width() != bw || canvas.height() != bh {
        canvas.set_width(bw);
        canvas.set_height(bh);
    }
    let ctx = canvas
        .get_context("2d")
        .ok()
        .flatten()
        .and_then(|ctx| ctx.dyn_into::<CanvasRenderingContext2d>().ok())?;
    ctx.set_transform(dpr, 0.0, 0.0, dpr, 0.0, 0.0).ok();
    Some(ctx)
}

pub fn backing_size(css_w: f64, css_h: f64, dpr: f64) -> (u32, u32) {
    (
        (css_w * dpr).round().max(1.0) as u32,
        (css_h * dpr).round().max(1.0) as u32,
    )
}

const WHEEL_LINE_PX: f64 = 16.0;

/// Wheel delta in pixels whatever unit the browser reported.
pub fn wheel_pixels(e: &web_sys::WheelEvent, page_height: f64) -> f64 {
    normalize_wheel(e.delta_y(), e.delta_mode(), page_height)
}

fn normalize_wheel(delta: f64, mode: u32, page_height: f64) -> f64 {
    match mode {
        web_sys::WheelEvent::DOM_DELTA_LINE => delta * WHEEL_LINE_PX,
        web_sys::WheelEvent::DOM_DELTA_PAGE => delta * page_height,
        _ => delta,
    }
}

/// A `window` event listener that is removed when dropped.
pub struct WindowListener {
    window: web_sys::Window,
    event: &'static str,
    handler: Closure<dyn FnMut(web_sys::Event)>,
}

impl WindowListener {
    pub fn new(event: &'static str, handler: impl FnMut(web_sys::Event) + 'static) -> Option<Self> {
        let window = web_sys::window()?;
        let handler = Closure::<dyn FnMut(web_sys::Event)>::new(handler);
        window
            .add_event_listener_with_callback(event, handler.as_ref().unchecked_ref())
            .ok()?;
        Some(Self {
            window,
            event,
            handler,
        })
    }
}

impl Drop for WindowListener {
    fn drop(&mut self) {
        let _ = self
            .window
            .remove_event_listener_with_callback(self.event, self.handler.as_ref().unchecked_ref());
    }
}

/// Keys typed into form fields belong to the field, not the map.
pub fn is_text_input(event: &web_sys::Event) -> bool {
    event
        .target()
        .and_then(|t| t.dyn_into::<HtmlElement>().ok())
        .is_some_and(|el| matches!(el.tag_name().as_str(), "INPUT" | "TEXTAREA" | "SELECT"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backing_store_follows_pixel_ratio() {
        assert_eq!(backing_size(400.0, 300.0, 2.0), (800, 600));
        assert_eq!(backing_size(333.0, 100.0, 1.5), (500, 150));
        assert_eq!(backing_size(0.0, 0.0, 1.0), (1, 1));
    }

    #[test]
    fn wheel_lines_and_pages_become_pixels() {
        assert_eq!(normalize_wheel(3.0, 0, 600.0), 3.0);
        assert_eq!(normalize_wheel(3.0, 1, 600.0), 48.0);
        assert_eq!(normalize_wheel(-1.0, 2, 600.0), -600.0);
    }
}
