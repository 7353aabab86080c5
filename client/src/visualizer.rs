//! `MapVisualizer`: read-only map of geometry layers and point markers.

use fieldmap_shared::basemap::BasemapKind;
use fieldmap_shared::config::{CLICK_SLOP_PX, VisualizerConfig};
use fieldmap_shared::layer::GeometryLayer;
use fieldmap_shared::marker::MapMarker;
use fieldmap_shared::mount::MountSlot;
use fieldmap_shared::visualizer::{MapCommand, MapEvent, VisualizerState};
use gloo_timers::future::TimeoutFuture;
use leptos::callback::{Callable, Callback};
use leptos::prelude::*;
use tracing::{debug, info};
use wasm_bindgen::JsCast;
use web_sys::{HtmlCanvasElement, MouseEvent, PointerEvent, WheelEvent};

use crate::commands::CommandQueue;
use crate::dom::{self, LayoutWait, WindowListener};
use crate::editor::ATTRIBUTION_STYLE;
use crate::render_loop::FrameScheduler;
use crate::surface;
use crate::tiles::TileLayer;

const CANVAS_STYLE: &str =
    "position: absolute; inset: 0; width: 100%; height: 100%; touch-action: none;";
const CONTROLS_STYLE: &str = "position: absolute; top: 8px; right: 8px; display: flex; flex-direction: column; gap: 6px; padding: 8px; border-radius: 6px; background: rgba(255,255,255,0.92); box-shadow: 0 1px 4px rgba(0,0,0,0.25); font: 12px system-ui, sans-serif;";

#[derive(Debug, Clone, Copy)]
struct Press {
    last: (f64, f64),
    travel: f64,
}

struct VisualizerRuntime {
    state: VisualizerState,
    tiles: TileLayer,
    press: Option<Press>,
}

/// Control-panel state mirrored out of the runtime after each interaction.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Status {
    basemap: BasemapKind,
    area_labels: bool,
    plot_labels: bool,
    cursor: &'static str,
}

impl VisualizerRuntime {
    fn new(config: VisualizerConfig, width: f64, height: f64) -> Self {
        let tiles = TileLayer::new(config.basemap);
        let mut state = VisualizerState::new(config);
        state.view_mut().set_size(width, height);
        Self {
            state,
            tiles,
            press: None,
        }
    }

    fn status(&self, cursor: &'static str) -> Status {
        let config = self.state.config();
        Status {
            basemap: config.basemap,
            area_labels: config.show_area_labels,
            plot_labels: config.show_plot_labels,
            cursor,
        }
    }

    fn command(&mut self, command: MapCommand) -> Vec<MapEvent> {
        let events = self.state.apply(command);
        self.tiles.set_basemap(self.state.basemap());
        events
    }

    /// Measured container size; a hidden (0x0) container leaves the view alone.
    fn resize(&mut self, width: f64, height: f64) -> Vec<MapEvent> {
        self.state.set_size(width, height)
    }

    fn pointer_down(&mut self, sx: f64, sy: f64) {
        self.press = Some(Press {
            last: (sx, sy),
            travel: 0.0,
        });
    }

    fn pointer_move(&mut self, sx: f64, sy: f64) -> Vec<MapEvent> {
        let Some(press) = self.press.as_mut() else {
            return self.state.pointer_move(sx, sy);
        };
        let (dx, dy) = (sx - press.last.0, sy - press.last.1);
        press.travel += dx.hypot(dy);
        press.last = (sx, sy);
        self.state.view_mut().pan(dx, dy);
        Vec::new()
    }

    /// Short presses click; longer ones were pans and report the new view.
    fn pointer_up(&mut self, sx: f64, sy: f64) -> Vec<MapEvent> {
        let Some(press) = self.press.take() else {
            return Vec::new();
        };
        if press.travel <= CLICK_SLOP_PX {
            return self.state.click(sx, sy);
        }
        vec![MapEvent::ViewChanged]
    }

    fn pointer_cancel(&mut self) -> Vec<MapEvent> {
        match self.press.take() {
            Some(press) if press.travel > 0.0 => vec![MapEvent::ViewChanged],
            _ => Vec::new(),
        }
    }

    fn pointer_left(&mut self) -> Vec<MapEvent> {
        if self.press.is_some() {
            return Vec::new();
        }
        self.state.pointer_left()
    }

    fn wheel(&mut self, delta_px: f64, sx: f64, sy: f64) -> Vec<MapEvent> {
        let before = self.state.view().zoom;
        self.state.view_mut().zoom_by_wheel(delta_px, sx, sy);
        if self.state.view().zoom == before {
            return Vec::new();
        }
        vec![MapEvent::ViewChanged]
    }

    fn cursor_at(&mut self, at: Option<(f64, f64)>) -> &'static str {
        match (self.press, at) {
            (Some(press), _) if press.travel > CLICK_SLOP_PX => "grabbing",
            (_, Some((sx, sy))) => self.state.cursor(sx, sy),
            _ => "grab",
        }
    }
}

struct VisualizerInstance {
    slot: MountSlot<VisualizerRuntime>,
    canvas: HtmlCanvasElement,
    scheduler: FrameScheduler,
    _resize: Option<WindowListener>,
}

impl VisualizerInstance {
    fn act<R>(
        &self,
        at: Option<(f64, f64)>,
        f: impl FnOnce(&mut VisualizerRuntime) -> R,
    ) -> Option<(R, Status)> {
        let (out, status) = self.slot.with(|rt| {
            let out = f(rt);
            let cursor = rt.cursor_at(at);
            (out, rt.status(cursor))
        })?;
        dom::set_cursor(&self.canvas, status.cursor);
        self.scheduler.mark_dirty();
        Some((out, status))
    }
}

impl Drop for VisualizerInstance {
    fn drop(&mut self) {
        debug!("map visualizer unmounted");
    }
}

type Action = Box<dyn FnOnce(&mut VisualizerRuntime) -> Vec<MapEvent>>;

/// Map of polygons and markers with optional clustering.
///
/// Inputs are reactive: new `layers` reset per-layer visibility, new
/// `markers` rebuild the clusters. Everything else a host wants to do goes
/// through `commands`.
#[component]
pub fn MapVisualizer(
    #[prop(optional, into)] layers: MaybeProp<Vec<GeometryLayer>>,
    #[prop(optional, into)] markers: MaybeProp<Vec<MapMarker>>,
    #[prop(optional)] config: VisualizerConfig,
    #[prop(optional, into)] highlighted_index: MaybeProp<usize>,
    /// Overrides `config.clustering` while set.
    #[prop(optional, into)]
    clustering: MaybeProp<bool>,
    /// Overrides `config.enable_map_click` while set.
    #[prop(optional, into)]
    enable_map_click: MaybeProp<bool>,
    #[prop(optional)] commands: Option<CommandQueue<MapCommand>>,
    #[prop(optional, into)] on_event: Option<Callback<MapEvent>>,
    #[prop(optional, into)] height: Option<String>,
) -> impl IntoView {
    let container_ref = NodeRef::<leptos::html::Div>::new();
    let canvas_ref = NodeRef::<leptos::html::Canvas>::new();

    let status = RwSignal::new(Status {
        basemap: config.basemap,
        area_labels: config.show_area_labels,
        plot_labels: config.show_plot_labels,
        cursor: "grab",
    });
    let mounted = RwSignal::new(false);
    let show_controls = config.show_controls;
    let cluster_distance = config.cluster_distance_px;

    let instance = StoredValue::new_local(None::<VisualizerInstance>);
    let layout_wait = StoredValue::new_local(None::<LayoutWait>);

    let run = move |at: Option<(f64, f64)>, action: Action| {
        let Some((events, next)) = instance
            .try_with_value(|inst| inst.as_ref().and_then(|inst| inst.act(at, action)))
            .flatten()
        else {
            return;
        };
        if status.get_untracked() != next {
            status.set(next);
        }
        if let Some(cb) = on_event {
            for event in events {
                cb.run(event);
            }
        }
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
            let slot = MountSlot::new(VisualizerRuntime::new(config, width, height));
            let handle = slot.handle();
            let paint_canvas = canvas.clone();
            let scheduler = FrameScheduler::new(move || {
                handle.with(|rt| {
                    let view = rt.state.view().clone();
                    if let Some(ctx) = dom::prepare_canvas(&paint_canvas, view.width, view.height) {
                        let scene = rt.state.scene();
                        surface::paint(&ctx, &view, &rt.tiles, &scene);
                    }
                });
                false
            });
            let repaint = scheduler.handle();
            slot.with(|rt| rt.tiles.set_repaint(repaint));

            let resize = WindowListener::new("resize", move |_| {
                let (width, height) = dom::element_size(&measure);
                run(None, Box::new(move |rt| rt.resize(width, height)));
            });

            scheduler.mark_dirty();
            let stored = instance
                .try_update_value(|slot_value| {
                    *slot_value = Some(VisualizerInstance {
                        slot,
                        canvas,
                        scheduler,
                        _resize: resize,
                    });
                })
                .is_some();
            if stored {
                info!(width, height, "map visualizer mounted");
                mounted.set(true);
            }
        });
        let _ = layout_wait.try_update_value(|w| *w = Some(wait));
    });

    Effect::new(move || {
        let layers = layers.get().unwrap_or_default();
        if !mounted.get() {
            return;
        }
        run(
            None,
            Box::new(move |rt| {
                rt.state.set_layers(&layers);
                Vec::new()
            }),
        );
    });

    Effect::new(move || {
        let markers = markers.get().unwrap_or_default();
        if !mounted.get() {
            return;
        }
        run(
            None,
            Box::new(move |rt| {
                rt.state.set_markers(markers);
                Vec::new()
            }),
        );
    });

    Effect::new(move || {
        let index = highlighted_index.get();
        if !mounted.get() {
            return;
        }
        run(
            None,
            Box::new(move |rt| {
                rt.state.set_highlight(index);
                Vec::new()
            }),
        );
    });

    Effect::new(move || {
        let enabled = clustering.get();
        let click = enable_map_click.get();
        if !mounted.get() {
            return;
        }
        run(
            None,
            Box::new(move |rt| {
                if let Some(enabled) = enabled {
                    rt.state.set_clustering(enabled, cluster_distance);
                }
                if let Some(click) = click {
                    rt.state.set_map_click(click);
                }
                Vec::new()
            }),
        );
    });

    // Styles changed in the same turn as the command are applied before the
    // container is measured.
    let remeasure = move || {
        wasm_bindgen_futures::spawn_local(async move {
            TimeoutFuture::new(0).await;
            let Some(container) = container_ref.get_untracked() else {
                return;
            };
            let (width, height) = dom::element_size(&container);
            run(None, Box::new(move |rt| rt.resize(width, height)));
        });
    };

    if let Some(queue) = commands {
        Effect::new(move || {
            queue.track();
            if !mounted.get() {
                return;
            }
            for command in queue.take_pending() {
                match command {
                    MapCommand::UpdateMapSize => remeasure(),
                    command => run(None, Box::new(move |rt| rt.command(command))),
                }
            }
        });
    }

    let send = move |command: MapCommand| {
        run(None, Box::new(move |rt| rt.command(command)));
    };

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
        run(
            Some((x, y)),
            Box::new(move |rt| {
                rt.pointer_down(x, y);
                Vec::new()
            }),
        );
    };

    let on_pointer_move = move |e: PointerEvent| {
        let Some((x, y)) = local(&e) else {
            return;
        };
        run(Some((x, y)), Box::new(move |rt| rt.pointer_move(x, y)));
    };

    let on_pointer_up = move |e: PointerEvent| {
        let Some((x, y)) = local(&e) else {
            return;
        };
        run(Some((x, y)), Box::new(move |rt| rt.pointer_up(x, y)));
    };

    let on_pointer_cancel = move |_: PointerEvent| {
        run(None, Box::new(|rt| rt.pointer_cancel()));
    };

    let on_pointer_leave = move |_: PointerEvent| {
        run(None, Box::new(|rt| rt.pointer_left()));
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
        run(Some((x, y)), Box::new(move |rt| rt.wheel(delta, x, y)));
    };

    let container_style = format!(
        "position: relative; width: 100%; height: {}; overflow: hidden; border-radius: 6px; background: #e5e3df;",
        height.unwrap_or_else(|| "480px".to_string())
    );

    let controls = move || {
        show_controls.then(|| {
            view! {
                <div class="fieldmap-controls" style=CONTROLS_STYLE on:pointerdown=|e: PointerEvent| e.stop_propagation() on:wheel=|e: WheelEvent| e.stop_propagation()>
                    <select
                        on:change=move |e| {
                            let value = event_target_value(&e);
                            if let Some(kind) = BasemapKind::ALL.into_iter().find(|k| k.label() == value) {
                                send(MapCommand::SetBasemap(kind));
                            }
                        }
                        prop:value=move || status.get().basemap.label()
                    >
                        {BasemapKind::ALL
                            .into_iter()
                            .map(|kind| view! { <option value=kind.label()>{kind.label()}</option> })
                            .collect_view()}
                    </select>
                    <label>
                        <input
                            type="checkbox"
                            prop:checked=move || status.get().area_labels
                            on:change=move |e| send(MapCommand::SetAreaLabels(event_target_checked(&e)))
                        />
                        " Area labels"
                    </label>
                    <label>
                        <input
                            type="checkbox"
                            prop:checked=move || status.get().plot_labels
                            on:change=move |e| send(MapCommand::SetPlotLabels(event_target_checked(&e)))
                        />
                        " Plot labels"
                    </label>
                    <button type="button" on:click=move |_| send(MapCommand::FitToGeometries)>
                        "Fit plots"
                    </button>
                    <button type="button" on:click=move |_| send(MapCommand::FitToMarkers)>
                        "Fit markers"
                    </button>
                </div>
            }
        })
    };

    view! {
        <div
            class="fieldmap-visualizer"
            node_ref=container_ref
            style=container_style
            on:wheel=on_wheel
            on:pointerdown=on_pointer_down
            on:pointermove=on_pointer_move
            on:pointerup=on_pointer_up
            on:pointercancel=on_pointer_cancel
            on:pointerleave=on_pointer_leave
        >
            <canvas node_ref=canvas_ref style=CANVAS_STYLE />
            {controls}
            <div style=ATTRIBUTION_STYLE>{move || status.get().basemap.attribution()}</div>
        </div>
    }
}
