//! `GeometryEditor`: draw, reshape and clear one polygon over a basemap.
//!
//! The component owns an [`EditorRuntime`] per mount. Pointer handlers,
//! window listeners and the frame callback only reach it through the
//! instance's mount slot, so nothing outlives an unmount.

use fieldmap_shared::config::{CLICK_SLOP_PX, EditorConfig};
use fieldmap_shared::editor::{DrawState, EditorCommand, EditorEvent, EditorSession};
use fieldmap_shared::mount::MountSlot;
use fieldmap_shared::projection;
use fieldmap_shared::viewport::MapView;
use leptos::callback::{Callable, Callback};
use leptos::prelude::*;
use tracing::{debug, info};
use wasm_bindgen::JsCast;
use web_sys::{HtmlCanvasElement, KeyboardEvent, MouseEvent, PointerEvent, WheelEvent};

use crate::commands::CommandQueue;
use crate::dom::{self, LayoutWait, WindowListener};
use crate::flags;
use crate::render_loop::FrameScheduler;
use crate::surface;
use crate::tiles::TileLayer;

const TOOLBAR_STYLE: &str =
    "display: flex; align-items: center; gap: 8px; font: 13px system-ui, sans-serif;";
const HINT_STYLE: &str = "display: flex; align-items: center; justify-content: space-between; gap: 12px; padding: 8px 10px; border-radius: 6px; background: #eef5ff; color: #1d3b63; font: 13px system-ui, sans-serif;";
const CANVAS_STYLE: &str =
    "position: absolute; inset: 0; width: 100%; height: 100%; touch-action: none;";
pub(crate) const ATTRIBUTION_STYLE: &str = "position: absolute; right: 0; bottom: 0; padding: 1px 6px; background: rgba(255,255,255,0.75); color: #333; font: 11px system-ui, sans-serif; pointer-events: none;";

/// One press of the primary button, from down to up.
#[derive(Debug, Clone, Copy)]
struct Press {
    last: (f64, f64),
    travel: f64,
    on_vertex: bool,
}

/// Everything one mounted editor owns besides DOM handles.
struct EditorRuntime {
    session: EditorSession,
    view: MapView,
    tiles: TileLayer,
    press: Option<Press>,
}

/// What the toolbar shows after each interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Status {
    state: DrawState,
    disabled: bool,
    cursor: &'static str,
}

impl EditorRuntime {
    fn new(config: EditorConfig, width: f64, height: f64) -> Self {
        let mut view = MapView::new(
            projection::forward(config.center),
            config.zoom,
            config.max_zoom,
        );
        view.set_size(width, height);
        let tiles = TileLayer::new(config.basemap);
        Self {
            session: EditorSession::new(config),
            view,
            tiles,
            press: None,
        }
    }

    fn status(&self) -> Status {
        Status {
            state: self.session.state(),
            disabled: self.session.is_disabled(),
            cursor: self.session.cursor(),
        }
    }

    fn command(&mut self, command: EditorCommand) -> Vec<EditorEvent> {
        self.session.apply(command, &mut self.view)
    }

    fn pointer_down(&mut self, sx: f64, sy: f64) {
        let at = self.view.screen_to_world(sx, sy);
        let on_vertex = self.session.begin_drag(at, &self.view);
        self.press = Some(Press {
            last: (sx, sy),
            travel: 0.0,
            on_vertex,
        });
    }

    /// Drags a vertex or pans; with no button down only hover state changes.
    fn pointer_move(&mut self, sx: f64, sy: f64) {
        if let Some(press) = self.press.as_mut() {
            let (dx, dy) = (sx - press.last.0, sy - press.last.1);
            press.travel += dx.hypot(dy);
            press.last = (sx, sy);
            if press.on_vertex {
                let at = self.view.screen_to_world(sx, sy);
                self.session.drag_to(at, &self.view);
            } else {
                self.view.pan(dx, dy);
            }
        }
        let at = self.view.screen_to_world(sx, sy);
        self.session.pointer_moved(at, &self.view);
    }

    /// A press that barely moved is a click: in draw mode it places a vertex.
    fn pointer_up(&mut self, sx: f64, sy: f64) -> Vec<EditorEvent> {
        let Some(press) = self.press.take() else {
            return Vec::new();
        };
        if press.on_vertex {
            let events = self.session.end_drag();
            return if press.travel > 0.0 { events } else { Vec::new() };
        }
        if press.travel > CLICK_SLOP_PX || self.session.state() != DrawState::Drawing {
            return Vec::new();
        }
        let at = self.view.screen_to_world(sx, sy);
        self.session.add_vertex(at, &self.view)
    }

    /// The browser took the pointer away mid-press.
    fn pointer_cancel(&mut self) -> Vec<EditorEvent> {
        match self.press.take() {
            Some(press) if press.on_vertex => self.session.end_drag(),
            _ => Vec::new(),
        }
    }

    fn pointer_left(&mut self) {
        if self.press.is_none() {
            self.session.pointer_left();
        }
    }

    fn double_click(&mut self) -> Vec<EditorEvent> {
        self.session.finish_drawing()
    }

    fn wheel(&mut self, delta_px: f64, sx: f64, sy: f64) {
        self.view.zoom_by_wheel(delta_px, sx, sy);
    }

    fn escape(&mut self) {
        self.session.abort_drawing();
    }

    fn resize(&mut self, width: f64, height: f64) {
        self.view.set_size(width, height);
    }
}

/// DOM-side resources of one mount. Fields drop in order: the session and
/// its tiles go first, then the frame callback, then the window listeners.
struct EditorInstance {
    slot: MountSlot<EditorRuntime>,
    canvas: HtmlCanvasElement,
    scheduler: FrameScheduler,
    _listeners: Vec<WindowListener>,
}

impl EditorInstance {
    fn act<R>(&self, f: impl FnOnce(&mut EditorRuntime) -> R) -> Option<(R, Status)> {
        let (out, status) = self.slot.with(|rt| {
            let out = f(rt);
            (out, rt.status())
        })?;
        dom::set_cursor(&self.canvas, status.cursor);
        self.scheduler.mark_dirty();
        Some((out, status))
    }
}

impl Drop for EditorInstance {
    fn drop(&mut self) {
        debug!("geometry editor unmounted");
    }
}

type Action = Box<dyn FnOnce(&mut EditorRuntime) -> Vec<EditorEvent>>;

/// Draw/modify/clear widget for a single polygon.
///
/// `geometry` is the host's current value. It is loaded on mount and again
/// whenever it changes to something other than what the editor last
/// emitted, so binding it to the form field that `on_event` updates does not
/// loop.
#[component]
pub fn GeometryEditor(
    #[prop(optional, into)] geometry: MaybeProp<String>,
    #[prop(optional)] config: EditorConfig,
    /// Overrides `config.disabled` while set.
    #[prop(optional, into)]
    disabled: MaybeProp<bool>,
    #[prop(optional)] commands: Option<CommandQueue<EditorCommand>>,
    #[prop(optional, into)] on_event: Option<Callback<EditorEvent>>,
    /// CSS height of the map area.
    #[prop(optional, into)]
    height: Option<String>,
) -> impl IntoView {
    let container_ref = NodeRef::<leptos::html::Div>::new();
    let canvas_ref = NodeRef::<leptos::html::Canvas>::new();

    let status = RwSignal::new(Status {
        state: DrawState::Empty,
        disabled: config.disabled,
        cursor: "grab",
    });
    let mounted = RwSignal::new(false);
    let hint_open = RwSignal::new(false);
    let attribution = config.basemap.attribution();

    let instance = StoredValue::new_local(None::<EditorInstance>);
    let layout_wait = StoredValue::new_local(None::<LayoutWait>);

    let emit = move |events: Vec<EditorEvent>| {
        for event in events {
            if event == EditorEvent::DrawStart && flags::take_draw_hint() {
                hint_open.set(true);
            }
            if let Some(cb) = on_event {
                cb.run(event);
            }
        }
    };

    // Events go out after the slot borrow ends, so a host callback may send
    // commands straight back.
    let run = move |action: Action| {
        let Some((events, next)) = instance
            .try_with_value(|inst| inst.as_ref().and_then(|inst| inst.act(action)))
            .flatten()
        else {
            return;
        };
        if status.get_untracked() != next {
            status.set(next);
        }
        emit(events);
    };

    let local = move |e: &MouseEvent| {
        container_ref
            .get_untracked()
            .map(|el| dom::local_point(&el, e.client_x(), e.client_y()))
    };

    Effect::new(move || {
        let (Some(container), Some(canvas)) = (container_ref.get(), canvas_ref.get()) else {
            return;
        };
        let already = mounted.get_untracked()
            || layout_wait
                .try_with_value(|w| w.is_some())
                .unwrap_or(true);
        if already {
            return;
        }
        let config = config.clone();
        let measure: web_sys::Element = container.clone().into();
        let wait = dom::wait_for_layout(container.into(), move |width, height| {
            let slot = MountSlot::new(EditorRuntime::new(config, width, height));
            let handle = slot.handle();
            let paint_canvas = canvas.clone();
            let scheduler = FrameScheduler::new(move || {
                handle.with(|rt| {
                    if let Some(ctx) = dom::prepare_canvas(&paint_canvas, rt.view.width, rt.view.height)
                    {
                        surface::paint(&ctx, &rt.view, &rt.tiles, &rt.session.scene());
                    }
                });
                false
            });
            let repaint = scheduler.handle();
            slot.with(|rt| rt.tiles.set_repaint(repaint));

            let mut listeners = Vec::new();
            listeners.extend(WindowListener::new("keydown", move |e| {
                if dom::is_text_input(&e) {
                    return;
                }
                let is_escape = e
                    .dyn_ref::<KeyboardEvent>()
                    .is_some_and(|k| k.key() == "Escape");
                if is_escape {
                    run(Box::new(|rt| {
                        rt.escape();
                        Vec::new()
                    }));
                }
            }));
            listeners.extend(WindowListener::new("resize", move |_| {
                let (w, h) = dom::element_size(&measure);
                if w > 0.0 && h > 0.0 {
                    run(Box::new(move |rt| {
                        rt.resize(w, h);
                        Vec::new()
                    }));
                }
            }));

            scheduler.mark_dirty();
            let stored = instance
                .try_update_value(|slot_value| {
                    *slot_value = Some(EditorInstance {
                        slot,
                        canvas,
                        scheduler,
                        _listeners: listeners,
                    });
                })
                .is_some();
            if stored {
                info!(width, height, "geometry editor mounted");
                mounted.set(true);
            }
        });
        let _ = layout_wait.try_update_value(|w| *w = Some(wait));
    });

    Effect::new(move || {
        let text = geometry.get().unwrap_or_default();
        if !mounted.get() {
            return;
        }
        run(Box::new(move |rt| {
            if rt.session.geometry().unwrap_or_default() == text {
                return Vec::new();
            }
            rt.command(EditorCommand::LoadGeometry(text))
        }));
    });

    Effect::new(move || {
        let value = disabled.get();
        if !mounted.get() {
            return;
        }
        if let Some(value) = value {
            run(Box::new(move |rt| rt.command(EditorCommand::SetDisabled(value))));
        }
    });

    if let Some(queue) = commands {
        Effect::new(move || {
            queue.track();
            if !mounted.get() {
                return;
            }
            for command in queue.take_pending() {
                run(Box::new(move |rt| rt.command(command)));
            }
        });
    }

    let on_pointer_down = move |e: PointerEvent| {
        if e.button() != 0 {
            return;
        }
        let Some((x, y)) = local(&e) else {
            return;
        };
        if let Some(target) = e.target()
            && let Ok(el) = target.dyn_into::<web_sys::Element>()
        {
            el.set_pointer_capture(e.pointer_id()).ok();
        }
        run(Box::new(move |rt| {
            rt.pointer_down(x, y);
            Vec::new()
        }));
    };

    let on_pointer_move = move |e: PointerEvent| {
        let Some((x, y)) = local(&e) else {
            return;
        };
        run(Box::new(move |rt| {
            rt.pointer_move(x, y);
            Vec::new()
        }));
    };

    let on_pointer_up = move |e: PointerEvent| {
        let Some((x, y)) = local(&e) else {
            return;
        };
        run(Box::new(move |rt| rt.pointer_up(x, y)));
    };

    let on_pointer_cancel = move |_: PointerEvent| {
        run(Box::new(|rt| rt.pointer_cancel()));
    };

    let on_pointer_leave = move |_: PointerEvent| {
        run(Box::new(|rt| {
            rt.pointer_left();
            Vec::new()
        }));
    };

    let on_double_click = move |e: MouseEvent| {
        e.prevent_default();
        run(Box::new(|rt| rt.double_click()));
    };

    let on_wheel = move |e: WheelEvent| {
        e.prevent_default();
        let Some((x, y)) = local(&e) else {
            return;
        };
        let page = container_ref
            .get_untracked()
            .map_or(0.0, |el| el.client_height() as f64);
        let delta = dom::wheel_pixels(&e, page);
        run(Box::new(move |rt| {
            rt.wheel(delta, x, y);
            Vec::new()
        }));
    };

    let on_toggle = move |_: MouseEvent| {
        run(Box::new(|rt| rt.command(EditorCommand::ToggleDrawing)));
    };
    let on_clear = move |_: MouseEvent| {
        run(Box::new(|rt| rt.command(EditorCommand::ClearDrawing)));
    };
    let on_dismiss_hint = move |_: MouseEvent| hint_open.set(false);

    let container_style = format!(
        "position: relative; width: 100%; height: {}; overflow: hidden; border-radius: 6px; background: #e5e3df;",
        height.unwrap_or_else(|| "400px".to_string())
    );

    view! {
        <div class="fieldmap-editor" style="display: flex; flex-direction: column; gap: 6px;">
            <div class="fieldmap-toolbar" style=TOOLBAR_STYLE>
                <button
                    type="button"
                    on:click=on_toggle
                    disabled=move || {
                        let s = status.get();
                        !mounted.get() || s.disabled
                            || matches!(s.state, DrawState::Committed | DrawState::Modifying)
                    }
                >
                    {move || {
                        if status.get().state == DrawState::Drawing {
                            "Cancel drawing"
                        } else {
                            "Draw polygon"
                        }
                    }}
                </button>
                <button
                    type="button"
                    on:click=on_clear
                    disabled=move || {
                        let s = status.get();
                        !mounted.get() || s.disabled || s.state == DrawState::Empty
                    }
                >
                    "Clear"
                </button>
                <span style="color: #555;">{move || status_text(status.get())}</span>
            </div>
            <Show when=move || hint_open.get() && status.get().state == DrawState::Drawing>
                <div class="fieldmap-hint" style=HINT_STYLE>
                    <span>
                        "Click the map to place vertices. Double-click or click the first vertex to close the polygon. Esc cancels. Drag a vertex to move it."
                    </span>
                    <button type="button" on:click=on_dismiss_hint>"Got it"</button>
                </div>
            </Show>
            <div
                node_ref=container_ref
                style=container_style
                on:wheel=on_wheel
                on:pointerdown=on_pointer_down
                on:pointermove=on_pointer_move
                on:pointerup=on_pointer_up
                on:pointercancel=on_pointer_cancel
                on:pointerleave=on_pointer_leave
                on:dblclick=on_double_click
            >
                <canvas node_ref=canvas_ref style=CANVAS_STYLE />
                <div style=ATTRIBUTION_STYLE>{attribution}</div>
            </div>
        </div>
    }
}

fn status_text(status: Status) -> &'static str {
    if status.disabled {
        return "Read only";
    }
    match status.state {
        DrawState::Empty => "No polygon",
        DrawState::Drawing => "Drawing",
        DrawState::Committed => "Polygon set",
        DrawState::Modifying => "Moving vertex",
    }
}
