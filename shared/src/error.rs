use thiserror::Error;

/// Why a geometry string could not be turned into a point list.
///
/// Never surfaced to the host: the codec logs it and degrades to "no geometry".
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("geometry text is empty")]
    Empty,

    #[error("invalid number {token:?} in coordinate pair {index}")]
    InvalidNumber { index: usize, token: String },

    #[error("coordinate pair {index} is malformed: {pair:?}")]
    MalformedPair { index: usize, pair: String },

    #[error("GeoJSON geometry is a {0}, expected Polygon")]
    NotPolygon(String),

    #[error("not paren-tuple text and not GeoJSON: {0}")]
    Json(String),
}
