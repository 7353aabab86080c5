//! Demo host: a plot form around `GeometryEditor` and a survey map around
//! `MapVisualizer`, wired the way an admin page would wire them.

use fieldmap_shared::config::{DEFAULT_CENTER, SAME_POSITION_EPSILON};
use fieldmap_shared::geometry::{self, LonLat};
use fieldmap_shared::{
    EditorCommand, EditorConfig, EditorEvent, GeometryLayer, MapCommand, MapEvent, MapMarker,
    VisualizerConfig, group_by_exact_position,
};
use leptos::prelude::*;
use tracing::debug;

use crate::commands::CommandQueue;
use crate::editor::GeometryEditor;
use crate::visualizer::MapVisualizer;

const EVENT_LOG_LEN: usize = 12;

const PANEL_STYLE: &str = "background: #ffffff; border: 1px solid #d8dce3; border-radius: 8px; padding: 16px; display: flex; flex-direction: column; gap: 10px;";
const BUTTON_ROW_STYLE: &str = "display: flex; flex-wrap: wrap; gap: 6px;";
const LOG_STYLE: &str = "margin: 0; padding: 8px; max-height: 180px; overflow-y: auto; background: #f4f6f8; border-radius: 6px; font: 11px 'JetBrains Mono', monospace; color: #3a4150;";

/// A plot that passed the save check, shown on the survey map.
#[derive(Debug, Clone, PartialEq)]
struct SavedPlot {
    name: String,
    geometry: String,
}

#[derive(Clone, Copy)]
struct EventLog(RwSignal<Vec<String>>);

impl EventLog {
    fn push(&self, line: String) {
        debug!(%line, "host event");
        self.0.update(|lines| {
            lines.insert(0, line);
            lines.truncate(EVENT_LOG_LEN);
        });
    }
}

/// Square ring of `half` degrees around a center.
fn square(lon: f64, lat: f64, half: f64) -> String {
    geometry::serialize(&[
        LonLat::new(lon - half, lat - half),
        LonLat::new(lon + half, lat - half),
        LonLat::new(lon + half, lat + half),
        LonLat::new(lon - half, lat + half),
    ])
}

fn survey_area() -> GeometryLayer {
    GeometryLayer::new(square(DEFAULT_CENTER.lon, DEFAULT_CENTER.lat, 0.02))
        .with_label("Survey area")
        .with_colors("rgba(46, 204, 113, 0.08)", "#27ae60")
}

fn sample_plots() -> Vec<SavedPlot> {
    [(-0.01, -0.01, "Plot A"), (0.008, -0.006, "Plot B"), (0.0, 0.011, "Plot C")]
        .into_iter()
        .map(|(dx, dy, name)| SavedPlot {
            name: name.to_string(),
            geometry: square(DEFAULT_CENTER.lon + dx, DEFAULT_CENTER.lat + dy, 0.003),
        })
        .collect()
}

fn sample_markers() -> Vec<MapMarker> {
    let specimen = |lat: f64, lon: f64, label: &str, kind: &str, color: &str| MapMarker {
        kind: Some(kind.to_string()),
        color: Some(color.to_string()),
        ..MapMarker::at(lat, lon).with_label(label)
    };
    let (lat, lon) = (DEFAULT_CENTER.lat, DEFAULT_CENTER.lon);
    vec![
        specimen(lat - 0.011, lon - 0.009, "Ipê-amarelo #12", "tree", "#f1c40f"),
        specimen(lat - 0.009, lon - 0.011, "Pequi #3", "tree", "#16a085"),
        specimen(lat - 0.005, lon + 0.007, "Baru #7", "tree", "#8e44ad"),
        // Three samples logged at the same GPS fix.
        specimen(lat + 0.011, lon, "Soil core 1", "sample", "#d35400"),
        specimen(lat + 0.011, lon, "Soil core 2", "sample", "#d35400"),
        specimen(lat + 0.011, lon, "Soil core 3", "sample", "#d35400"),
    ]
}

fn plot_layers(plots: &[SavedPlot]) -> Vec<GeometryLayer> {
    std::iter::once(survey_area())
        .chain(
            plots
                .iter()
                .map(|p| GeometryLayer::new(p.geometry.clone()).with_label(p.name.clone())),
        )
        .collect()
}

#[component]
pub fn App() -> impl IntoView {
    let plots = RwSignal::new(sample_plots());
    let log = EventLog(RwSignal::new(Vec::new()));

    view! {
        <div style="min-height: 100vh; background: #eef1f5; font-family: 'Inter', system-ui, sans-serif; color: #1f2430; padding: 24px; box-sizing: border-box;">
            <h1 style="margin: 0 0 16px; font-size: 1.3rem;">"Field survey admin"</h1>
            <div style="display: grid; grid-template-columns: minmax(320px, 1fr) minmax(320px, 1.4fr); gap: 16px; align-items: start;">
                <PlotForm plots=plots log=log />
                <SurveyMap plots=plots log=log />
            </div>
            <div style=format!("{PANEL_STYLE} margin-top: 16px;")>
                <strong>"Events"</strong>
                <pre style=LOG_STYLE>
                    {move || log.0.get().join("\n")}
                </pre>
            </div>
        </div>
    }
}

#[component]
fn PlotForm(plots: RwSignal<Vec<SavedPlot>>, log: EventLog) -> impl IntoView {
    let name = RwSignal::new(String::new());
    let drawn = RwSignal::new(None::<String>);
    let read_only = RwSignal::new(false);
    let dialog_open = RwSignal::new(false);
    let commands = CommandQueue::<EditorCommand>::new();

    let savable = Memo::new(move |_| {
        drawn.with(|g| g.as_deref().is_some_and(|text| geometry::is_savable(&geometry::parse(text))))
    });
    let can_save = move || savable.get() && !name.with(|n| n.trim().is_empty());

    let on_editor_event = move |event: EditorEvent| match event {
        EditorEvent::GeometryChange(text) => {
            log.push(format!("editor: geometry {}", text.as_deref().unwrap_or("cleared")));
            drawn.set(text);
        }
        EditorEvent::DrawStart => log.push("editor: draw start".to_string()),
        EditorEvent::DrawEnd(text) => log.push(format!("editor: draw end {text}")),
    };

    let save = move |_| {
        let Some(text) = drawn.get_untracked() else {
            return;
        };
        let plot = SavedPlot {
            name: name.get_untracked().trim().to_string(),
            geometry: text,
        };
        log.push(format!("saved {}", plot.name));
        plots.update(|p| p.push(plot));
        name.set(String::new());
        commands.send(EditorCommand::ClearDrawing);
    };

    let sample = square(DEFAULT_CENTER.lon - 0.004, DEFAULT_CENTER.lat + 0.004, 0.002);

    view! {
        <section style=PANEL_STYLE>
            <strong>"New plot"</strong>
            <input
                type="text"
                placeholder="Plot name"
                prop:value=move || name.get()
                on:input=move |e| name.set(event_target_value(&e))
            />
            <GeometryEditor
                geometry=Signal::derive(move || drawn.get())
                disabled=Signal::derive(move || Some(read_only.get()))
                config=EditorConfig { zoom: 14.0, ..EditorConfig::default() }
                commands=commands
                on_event=Callback::new(on_editor_event)
                height="360px"
            />
            <div style=BUTTON_ROW_STYLE>
                <button type="button" on:click=move |_| drawn.set(Some(sample.clone()))>
                    "Load sample"
                </button>
                <button type="button" on:click=move |_| commands.send(EditorCommand::ToggleDrawing)>
                    "Toggle drawing"
                </button>
                <button type="button" on:click=move |_| commands.send(EditorCommand::ClearDrawing)>
                    "Clear"
                </button>
                <label style="display: flex; align-items: center; gap: 4px;">
                    <input
                        type="checkbox"
                        prop:checked=move || read_only.get()
                        on:change=move |e| read_only.set(event_target_checked(&e))
                    />
                    "Read only"
                </label>
            </div>
            <div style="font-size: 0.8rem; color: #5b6474;">
                {move || match drawn.get() {
                    Some(_) if savable.get() => "Polygon ready to save".to_string(),
                    Some(_) => "Polygon needs at least 3 distinct points".to_string(),
                    None => "No polygon drawn".to_string(),
                }}
            </div>
            <div style=BUTTON_ROW_STYLE>
                <button type="button" disabled=move || !can_save() on:click=save>
                    "Save plot"
                </button>
                <button type="button" on:click=move |_| dialog_open.update(|open| *open = !*open)>
                    {move || if dialog_open.get() { "Close quick edit" } else { "Quick edit in dialog" }}
                </button>
            </div>
            <Show when=move || dialog_open.get()>
                <QuickEditDialog target=drawn log=log on_close=move || dialog_open.set(false) />
            </Show>
        </section>
    }
}

/// A second editor mounted and torn down with the dialog.
#[component]
fn QuickEditDialog(
    target: RwSignal<Option<String>>,
    log: EventLog,
    on_close: impl Fn() + Copy + Send + Sync + 'static,
) -> impl IntoView {
    let draft = RwSignal::new(target.get_untracked());

    let on_event = move |event: EditorEvent| {
        if let EditorEvent::GeometryChange(text) = event {
            log.push("dialog: geometry changed".to_string());
            draft.set(text);
        }
    };

    view! {
        <div style="position: fixed; inset: 0; background: rgba(20, 24, 32, 0.45); display: flex; align-items: center; justify-content: center; z-index: 50;">
            <div style=format!("{PANEL_STYLE} width: min(720px, 92vw);")>
                <strong>"Quick edit"</strong>
                <GeometryEditor
                    geometry=Signal::derive(move || draft.get())
                    on_event=Callback::new(on_event)
                    height="420px"
                />
                <div style=BUTTON_ROW_STYLE>
                    <button
                        type="button"
                        on:click=move |_| {
                            target.set(draft.get_untracked());
                            on_close();
                        }
                    >
                        "Apply"
                    </button>
                    <button type="button" on:click=move |_| on_close()>
                        "Cancel"
                    </button>
                </div>
            </div>
        </div>
    }
}

#[component]
fn SurveyMap(plots: RwSignal<Vec<SavedPlot>>, log: EventLog) -> impl IntoView {
    let markers = RwSignal::new(sample_markers());
    let highlighted = RwSignal::new(None::<usize>);
    let clustering = RwSignal::new(true);
    let map_click = RwSignal::new(true);
    let selected = RwSignal::new(Vec::<usize>::new());
    let commands = CommandQueue::<MapCommand>::new();
    let tall = RwSignal::new(false);

    let layers = Memo::new(move |_| plots.with(|p| plot_layers(p)));

    let on_map_event = move |event: MapEvent| match event {
        MapEvent::MarkerClick { index, marker } => {
            log.push(format!(
                "map: marker {index} {}",
                marker.label.as_deref().unwrap_or("(unlabelled)")
            ));
            let stacked = markers.with(|all| {
                group_by_exact_position(all, SAME_POSITION_EPSILON)
                    .into_iter()
                    .find(|group| group.contains(&index))
                    .unwrap_or_else(|| vec![index])
            });
            selected.set(stacked);
        }
        MapEvent::MapClick {
            latitude,
            longitude,
        } => {
            log.push(format!("map: click {latitude:.5}, {longitude:.5}"));
            selected.set(Vec::new());
        }
        MapEvent::MarkerHover(Some(index)) => log.push(format!("map: hover {index}")),
        MapEvent::MarkerHover(None) => {}
        MapEvent::ViewChanged => {}
    };

    let add_marker_here = move |_| {
        markers.update(|all| {
            let n = all.len();
            all.push(
                MapMarker::at(
                    DEFAULT_CENTER.lat + 0.0005 * n as f64,
                    DEFAULT_CENTER.lon - 0.0005 * n as f64,
                )
                .with_label(format!("Specimen #{n}")),
            );
        });
    };

    view! {
        <section style=PANEL_STYLE>
            <strong>"Survey map"</strong>
            <div style=move || format!("height: {};", if tall.get() { "640px" } else { "440px" })>
                <MapVisualizer
                    layers=Signal::derive(move || Some(layers.get()))
                    markers=Signal::derive(move || Some(markers.get()))
                    highlighted_index=Signal::derive(move || highlighted.get())
                    clustering=Signal::derive(move || Some(clustering.get()))
                    enable_map_click=Signal::derive(move || Some(map_click.get()))
                    config=VisualizerConfig { zoom: 13.0, clustering: true, ..VisualizerConfig::default() }
                    commands=commands
                    on_event=Callback::new(on_map_event)
                    height="100%"
                />
            </div>
            <div style=BUTTON_ROW_STYLE>
                <button type="button" on:click=move |_| commands.send(MapCommand::FitToMarkers)>
                    "Fit markers"
                </button>
                <button type="button" on:click=move |_| commands.send(MapCommand::FitToGeometries)>
                    "Fit plots"
                </button>
                <button
                    type="button"
                    on:click=move |_| {
                        highlighted.set(None);
                        commands.send(MapCommand::ClearHighlight);
                    }
                >
                    "Clear highlight"
                </button>
                <button type="button" on:click=add_marker_here>
                    "Add specimen"
                </button>
                <button
                    type="button"
                    on:click=move |_| {
                        tall.update(|t| *t = !*t);
                        commands.send(MapCommand::UpdateMapSize);
                    }
                >
                    {move || if tall.get() { "Shorter map" } else { "Taller map" }}
                </button>
                <label style="display: flex; align-items: center; gap: 4px;">
                    <input
                        type="checkbox"
                        prop:checked=move || clustering.get()
                        on:change=move |e| clustering.set(event_target_checked(&e))
                    />
                    "Cluster"
                </label>
                <label style="display: flex; align-items: center; gap: 4px;">
                    <input
                        type="checkbox"
                        prop:checked=move || map_click.get()
                        on:change=move |e| map_click.set(event_target_checked(&e))
                    />
                    "Map clicks"
                </label>
            </div>
            <ul style="margin: 0; padding-left: 18px; font-size: 0.85rem;">
                <For
                    each={move || plots.get().into_iter().enumerate().collect::<Vec<_>>()}
                    key=|(i, plot)| (*i, plot.name.clone())
                    children=move |(i, plot)| {
                        // Layer 0 is the survey area.
                        let layer = i + 1;
                        view! {
                            <li style="display: flex; align-items: center; gap: 6px; margin: 2px 0;">
                                <span style=move || {
                                    if highlighted.get() == Some(layer) { "font-weight: 700;" } else { "" }
                                }>{plot.name}</span>
                                <button
                                    type="button"
                                    on:click=move |_| {
                                        highlighted.set(Some(layer));
                                        commands.send(MapCommand::HighlightAndFlyTo(layer));
                                    }
                                >
                                    "Fly to"
                                </button>
                                <button
                                    type="button"
                                    on:click=move |_| commands.send(MapCommand::ToggleGeometryVisibility(layer))
                                >
                                    "Show/hide"
                                </button>
                            </li>
                        }
                    }
                />
            </ul>
            <Show when=move || selected.with(|s| !s.is_empty())>
                <div style="font-size: 0.85rem; border-top: 1px solid #e1e5ea; padding-top: 8px;">
                    {move || {
                        let picked = selected.get();
                        let title = if picked.len() > 1 {
                            format!("{} specimens at this spot", picked.len())
                        } else {
                            "Selected specimen".to_string()
                        };
                        let rows = markers.with(|all| {
                            picked
                                .iter()
                                .filter_map(|i| all.get(*i))
                                .map(|m| {
                                    format!(
                                        "{} ({}) at {:.5}, {:.5}",
                                        m.label.as_deref().unwrap_or("(unlabelled)"),
                                        m.kind.as_deref().unwrap_or("specimen"),
                                        m.latitude,
                                        m.longitude,
                                    )
                                })
                                .collect::<Vec<_>>()
                        });
                        view! {
                            <strong>{title}</strong>
                            <ul style="margin: 4px 0 0; padding-left: 18px;">
                                {rows.into_iter().map(|row| view! { <li>{row}</li> }).collect_view()}
                            </ul>
                        }
                    }}
                </div>
            </Show>
        </section>
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_plots_are_savable() {
        for plot in sample_plots() {
            assert!(geometry::is_savable(&geometry::parse(&plot.geometry)), "{}", plot.name);
        }
    }

    #[test]
    fn survey_area_is_the_first_layer() {
        let layers = plot_layers(&sample_plots());
        assert_eq!(layers.len(), 4);
        assert_eq!(layers[0].label.as_deref(), Some("Survey area"));
        assert_eq!(layers[2].label.as_deref(), Some("Plot B"));
    }

    #[test]
    fn stacked_samples_group_together() {
        let markers = sample_markers();
        let groups = group_by_exact_position(&markers, SAME_POSITION_EPSILON);
        assert!(groups.contains(&vec![3, 4, 5]));
        assert_eq!(groups.len(), 4);
    }
}
