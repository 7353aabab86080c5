pub mod basemap;
pub mod cluster;
pub mod config;
pub mod editor;
pub mod error;
pub mod geometry;
pub mod layer;
pub mod marker;
pub mod mount;
pub mod projection;
pub mod scene;
pub mod style;
pub mod viewport;
pub mod visualizer;

pub use basemap::{BasemapKind, TileCoord, VisibleTile};
pub use cluster::{Cluster, ClusterClick, group_by_exact_position};
pub use config::{EditorConfig, VisualizerConfig};
pub use editor::{DrawState, EditorCommand, EditorEvent, EditorSession};
pub use error::GeometryError;
pub use geometry::{LonLat, ParsedGeometry};
pub use layer::GeometryLayer;
pub use marker::MapMarker;
pub use mount::{MountSlot, SlotHandle};
pub use projection::{Extent, MapPoint};
pub use scene::{Scene, Shape};
pub use viewport::MapView;
pub use visualizer::{MapCommand, MapEvent, VisualizerState};
