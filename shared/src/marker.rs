use serde::{Deserialize, Serialize};

use crate::geometry::LonLat;
use crate::projection::{self, MapPoint};

/// A point entity on the visualizer, e.g. one specimen observation.
///
/// `data` is the host's back-reference to its own record and is carried
/// through events untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MapMarker {
    pub id: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub label: Option<String>,
    pub data: serde_json::Value,
}

impl MapMarker {
    pub fn at(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            ..Self::default()
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn lonlat(&self) -> LonLat {
        LonLat::new(self.longitude, self.latitude)
    }

    pub fn projected(&self) -> MapPoint {
        projection::forward(self.lonlat())
    }

    pub fn has_valid_position(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_host_json() {
        let marker: MapMarker = serde_json::from_str(
            r#"{"id":"sp-9","latitude":-15.78,"longitude":-47.93,"type":"specimen","data":{"specimenId":9}}"#,
        )
        .unwrap();
        assert_eq!(marker.id.as_deref(), Some("sp-9"));
        assert_eq!(marker.kind.as_deref(), Some("specimen"));
        assert_eq!(marker.lonlat(), LonLat::new(-47.93, -15.78));
        assert_eq!(marker.data["specimenId"], 9);
        assert!(marker.label.is_none());
    }

    #[test]
    fn rejects_out_of_range_positions() {
        assert!(MapMarker::at(10.0, 20.0).has_valid_position());
        assert!(!MapMarker::at(91.0, 20.0).has_valid_position());
        assert!(!MapMarker::at(f64::NAN, 0.0).has_valid_position());
    }
}
