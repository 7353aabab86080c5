use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::GeometryError;

/// A geographic position in degrees, longitude first (the order the backend stores).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LonLat {
    pub lon: f64,
    pub lat: f64,
}

impl LonLat {
    pub const fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// True when both components differ by at most `epsilon` degrees.
    pub fn approx_eq(&self, other: &LonLat, epsilon: f64) -> bool {
        (self.lon - other.lon).abs() <= epsilon && (self.lat - other.lat).abs() <= epsilon
    }
}

/// Outcome of reading geometry text, tagged by the format that matched.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedGeometry {
    PointTuple(Vec<LonLat>),
    GeoJson(Vec<LonLat>),
    Unparseable(GeometryError),
}

impl ParsedGeometry {
    pub fn into_points(self) -> Vec<LonLat> {
        match self {
            ParsedGeometry::PointTuple(points) | ParsedGeometry::GeoJson(points) => points,
            ParsedGeometry::Unparseable(_) => Vec::new(),
        }
    }
}

/// Classify and decode geometry text without logging.
pub fn parse_tagged(text: &str) -> ParsedGeometry {
    let text = text.trim();
    if text.is_empty() {
        return ParsedGeometry::Unparseable(GeometryError::Empty);
    }

    if looks_like_point_tuple(text) {
        return match parse_point_tuple(text) {
            Ok(points) => ParsedGeometry::PointTuple(points),
            Err(err) => ParsedGeometry::Unparseable(err),
        };
    }

    match parse_geojson_polygon(text) {
        Ok(points) => ParsedGeometry::GeoJson(points),
        Err(err) => ParsedGeometry::Unparseable(err),
    }
}

/// Decode paren-tuple or GeoJSON Polygon text into the outer ring.
///
/// Malformed input yields an empty list and a warning; it is never an error
/// for the caller.
pub fn parse(text: &str) -> Vec<LonLat> {
    match parse_tagged(text) {
        ParsedGeometry::Unparseable(GeometryError::Empty) => Vec::new(),
        ParsedGeometry::Unparseable(err) => {
            warn!(error = %err, "ignoring unparseable geometry");
            Vec::new()
        }
        parsed => parsed.into_points(),
    }
}

/// Encode points in the backend's paren-tuple format: `((lon,lat),(lon,lat))`.
pub fn serialize(points: &[LonLat]) -> String {
    let mut out = String::with_capacity(2 + points.len() * 24);
    out.push('(');
    for (i, p) in points.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push('(');
        out.push_str(&p.lon.to_string());
        out.push(',');
        out.push_str(&p.lat.to_string());
        out.push(')');
    }
    out.push(')');
    out
}

/// Serialize, mapping an empty ring to `None` (the "no geometry" value hosts store).
pub fn serialize_ring(points: &[LonLat]) -> Option<String> {
    if points.is_empty() {
        None
    } else {
        Some(serialize(points))
    }
}

fn looks_like_point_tuple(text: &str) -> bool {
    text.starts_with("((") && text.ends_with("))")
}

fn parse_point_tuple(text: &str) -> Result<Vec<LonLat>, GeometryError> {
    let body = &text[2..text.len() - 2];
    if body.trim().is_empty() {
        return Err(GeometryError::Empty);
    }

    body.split("),(")
        .enumerate()
        .map(|(index, pair)| {
            let mut parts = pair.split(',');
            let (Some(lon), Some(lat), None) = (parts.next(), parts.next(), parts.next()) else {
                return Err(GeometryError::MalformedPair {
                    index,
                    pair: pair.to_string(),
                });
            };
            Ok(LonLat::new(
                parse_component(lon, index)?,
                parse_component(lat, index)?,
            ))
        })
        .collect()
}

fn parse_component(token: &str, index: usize) -> Result<f64, GeometryError> {
    token
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| GeometryError::InvalidNumber {
            index,
            token: token.to_string(),
        })
}

fn parse_geojson_polygon(text: &str) -> Result<Vec<LonLat>, GeometryError> {
    let geojson: geojson::GeoJson = text
        .parse()
        .map_err(|e: geojson::Error| GeometryError::Json(e.to_string()))?;

    let geojson::GeoJson::Geometry(geometry) = geojson else {
        return Err(GeometryError::NotPolygon(geojson_object_kind(&geojson).to_string()));
    };

    let geojson::Value::Polygon(rings) = geometry.value else {
        return Err(GeometryError::NotPolygon(
            geometry_kind(&geometry.value).to_string(),
        ));
    };

    let Some(outer) = rings.into_iter().next() else {
        debug!("GeoJSON polygon has no rings");
        return Ok(Vec::new());
    };

    let mut points = outer
        .into_iter()
        .enumerate()
        .map(|(index, position)| match position.as_slice() {
            [lon, lat, ..] if lon.is_finite() && lat.is_finite() => Ok(LonLat::new(*lon, *lat)),
            _ => Err(GeometryError::MalformedPair {
                index,
                pair: format!("{position:?}"),
            }),
        })
        .collect::<Result<Vec<_>, _>>()?;

    // GeoJSON repeats the first position to close the ring; the tuple format never does.
    if points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    Ok(points)
}

fn geojson_object_kind(geojson: &geojson::GeoJson) -> &'static str {
    match geojson {
        geojson::GeoJson::Geometry(_) => "Geometry",
        geojson::GeoJson::Feature(_) => "Feature",
        geojson::GeoJson::FeatureCollection(_) => "FeatureCollection",
    }
}

fn geometry_kind(value: &geojson::Value) -> &'static str {
    match value {
        geojson::Value::Point(_) => "Point",
        geojson::Value::MultiPoint(_) => "MultiPoint",
        geojson::Value::LineString(_) => "LineString",
        geojson::Value::MultiLineString(_) => "MultiLineString",
        geojson::Value::Polygon(_) => "Polygon",
        geojson::Value::MultiPolygon(_) => "MultiPolygon",
        geojson::Value::GeometryCollection(_) => "GeometryCollection",
    }
}

/// Number of distinct vertices, comparing at the 1e-6° precision coordinates are stored with.
pub fn distinct_count(points: &[LonLat]) -> usize {
    let mut seen: Vec<LonLat> = Vec::with_capacity(points.len());
    for p in points {
        if !seen.iter().any(|s| s.approx_eq(p, 1e-6)) {
            seen.push(*p);
        }
    }
    seen.len()
}

/// Whether a ring is good enough to submit: at least three distinct vertices.
pub fn is_savable(points: &[LonLat]) -> bool {
    distinct_count(points) >= 3
}

/// Area-weighted centroid of an implicitly closed ring.
///
/// Degenerate rings (collinear or fewer than three points) fall back to the
/// vertex average. Returns `None` for an empty ring.
pub fn ring_centroid(points: &[LonLat]) -> Option<LonLat> {
    if points.is_empty() {
        return None;
    }

    let mut area2 = 0.0;
    let mut cx = 0.0;
    let mut cy = 0.0;
    for i in 0..points.len() {
        let a = points[i];
        let b = points[(i + 1) % points.len()];
        let cross = a.lon * b.lat - b.lon * a.lat;
        area2 += cross;
        cx += (a.lon + b.lon) * cross;
        cy += (a.lat + b.lat) * cross;
    }

    if area2.abs() < 1e-12 {
        let n = points.len() as f64;
        let (sx, sy) = points
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p.lon, sy + p.lat));
        return Some(LonLat::new(sx / n, sy / n));
    }

    Some(LonLat::new(cx / (3.0 * area2), cy / (3.0 * area2)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        let diff = (actual - expected).abs();
        assert!(
            diff < 1e-6,
            "expected {expected}, got {actual} (diff: {diff})"
        );
    }

    fn triangle() -> Vec<LonLat> {
        vec![
            LonLat::new(-47.93, -15.78),
            LonLat::new(-47.91, -15.78),
            LonLat::new(-47.92, -15.76),
        ]
    }

    #[test]
    fn serialize_emits_backend_format() {
        assert_eq!(
            serialize(&triangle()),
            "((-47.93,-15.78),(-47.91,-15.78),(-47.92,-15.76))"
        );
    }

    #[test]
    fn serialize_does_not_close_ring() {
        let text = serialize(&triangle());
        assert_eq!(text.matches("),(").count(), 2);
    }

    #[test]
    fn serialize_empty_ring() {
        assert_eq!(serialize(&[]), "()");
        assert_eq!(serialize_ring(&[]), None);
    }

    #[test]
    fn parse_point_tuple_text() {
        let parsed = parse_tagged("((-47.93,-15.78),(-47.91,-15.78),(-47.92,-15.76))");
        assert_eq!(parsed, ParsedGeometry::PointTuple(triangle()));
    }

    #[test]
    fn parse_tolerates_surrounding_whitespace() {
        assert_eq!(parse("  ((1,2),(3,4),(5,6))\n").len(), 3);
        assert_eq!(parse("((1, 2),(3 ,4))").len(), 2);
    }

    #[test]
    fn parse_geojson_polygon_text() {
        let json = r#"{"type":"Polygon","coordinates":[[[-47.93,-15.78],[-47.91,-15.78],[-47.92,-15.76]]]}"#;
        assert_eq!(parse_tagged(json), ParsedGeometry::GeoJson(triangle()));
    }

    #[test]
    fn paren_tuple_and_geojson_agree() {
        let tuple = "((10.5,20.25),(11,20.25),(11,21),(10.5,21))";
        let json = r#"{"type":"Polygon","coordinates":[[[10.5,20.25],[11,20.25],[11,21],[10.5,21]]]}"#;
        assert_eq!(parse(tuple), parse(json));
    }

    #[test]
    fn closed_geojson_ring_drops_the_repeat() {
        let json = r#"{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,0]]]}"#;
        assert_eq!(parse(json), parse("((0,0),(1,0),(1,1))"));
        assert_eq!(serialize(&parse(json)), "((0,0),(1,0),(1,1))");
    }

    #[test]
    fn geojson_takes_only_outer_ring() {
        let json = r#"{"type":"Polygon","coordinates":[[[0,0],[4,0],[4,4],[0,4]],[[1,1],[2,1],[2,2]]]}"#;
        let points = parse(json);
        assert_eq!(points.len(), 4);
        assert_eq!(points[1], LonLat::new(4.0, 0.0));
    }

    #[test]
    fn malformed_inputs_yield_empty() {
        assert!(parse("garbage").is_empty());
        assert!(parse("").is_empty());
        assert!(parse("((1,2),(bad,4))").is_empty());
        assert!(parse("((1,2),(3))").is_empty());
        assert!(parse("((1,2,3),(4,5))").is_empty());
        assert!(parse("((NaN,2),(3,4))").is_empty());
        assert!(parse("(())").is_empty());
    }

    #[test]
    fn malformed_inputs_are_tagged_with_cause() {
        assert_eq!(parse_tagged(""), ParsedGeometry::Unparseable(GeometryError::Empty));
        assert!(matches!(
            parse_tagged("((1,2),(bad,4))"),
            ParsedGeometry::Unparseable(GeometryError::InvalidNumber { index: 1, .. })
        ));
        assert!(matches!(
            parse_tagged("garbage"),
            ParsedGeometry::Unparseable(GeometryError::Json(_))
        ));
        assert!(matches!(
            parse_tagged(r#"{"type":"Point","coordinates":[1,2]}"#),
            ParsedGeometry::Unparseable(GeometryError::NotPolygon(kind)) if kind == "Point"
        ));
    }

    #[test]
    fn geojson_feature_is_not_accepted() {
        let json = r#"{"type":"Feature","properties":{},"geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1]]]}}"#;
        assert!(parse(json).is_empty());
    }

    #[test]
    fn round_trip_preserves_six_decimals() {
        // Deterministic LCG so the property covers many rings without a proptest dependency.
        let mut state: u64 = 0x5eed_1234_abcd_0001;
        let mut next = || {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            (state >> 11) as f64 / (1u64 << 53) as f64
        };

        for _ in 0..200 {
            let n = 3 + (next() * 12.0) as usize;
            let ring: Vec<LonLat> = (0..n)
                .map(|_| {
                    let lon = (next() * 360.0 - 180.0) * 1e6;
                    let lat = (next() * 170.0 - 85.0) * 1e6;
                    LonLat::new(lon.round() / 1e6, lat.round() / 1e6)
                })
                .collect();

            let text = serialize(&ring);
            let again = serialize(&parse(&text));
            let reparsed = parse(&again);
            assert_eq!(reparsed.len(), ring.len());
            for (a, b) in ring.iter().zip(&reparsed) {
                assert_close(a.lon, b.lon);
                assert_close(a.lat, b.lat);
            }
            assert_eq!(text, again);
        }
    }

    #[test]
    fn savable_needs_three_distinct_points() {
        assert!(is_savable(&triangle()));
        let mut degenerate = triangle();
        degenerate[2] = degenerate[0];
        assert!(!is_savable(&degenerate));
        assert!(!is_savable(&[]));
    }

    #[test]
    fn centroid_of_square() {
        let square = vec![
            LonLat::new(0.0, 0.0),
            LonLat::new(2.0, 0.0),
            LonLat::new(2.0, 2.0),
            LonLat::new(0.0, 2.0),
        ];
        let c = ring_centroid(&square).unwrap();
        assert_close(c.lon, 1.0);
        assert_close(c.lat, 1.0);
    }

    #[test]
    fn centroid_of_collinear_ring_uses_average() {
        let line = vec![
            LonLat::new(0.0, 0.0),
            LonLat::new(1.0, 0.0),
            LonLat::new(2.0, 0.0),
        ];
        let c = ring_centroid(&line).unwrap();
        assert_close(c.lon, 1.0);
        assert_close(c.lat, 0.0);
        assert_eq!(ring_centroid(&[]), None);
    }
}
