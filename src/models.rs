//! Data models for the USGS GeoJSON feed and the ingested event.
//!
//! The wire structures mirror the summary feed format. [`Event`] is the
//! flattened, immutable record the rest of the crate works with.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::IngestError;

/// Top-level GeoJSON response from USGS feeds.
#[derive(Debug, Clone, Deserialize)]
pub struct FeatureCollection {
    /// Always "FeatureCollection"
    #[serde(rename = "type")]
    pub type_: String,

    /// Feed metadata
    #[serde(default)]
    pub metadata: Option<Metadata>,

    /// Earthquake events
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    /// Validate the response structure.
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.type_ != "FeatureCollection" {
            return Err(IngestError::InvalidResponse(format!(
                "expected type 'FeatureCollection', got '{}'",
                self.type_
            )));
        }
        Ok(())
    }

    /// Convert the features into events, in feed order.
    ///
    /// Malformed features are skipped and logged.
    #[must_use]
    pub fn into_events(self) -> Vec<Event> {
        self.features
            .into_iter()
            .filter_map(|feature| match feature.validate() {
                Ok(()) => Some(Event::from(feature)),
                Err(e) => {
                    warn!("skipping feature: {e}");
                    None
                }
            })
            .collect()
    }
}

/// Metadata about the feed response.
#[derive(Debug, Clone, Deserialize)]
pub struct Metadata {
    /// When this feed was generated (ms since epoch)
    pub generated: i64,

    /// Human-readable title
    #[serde(default)]
    pub title: Option<String>,
}

/// A single feature of the feed.
#[derive(Debug, Clone, Deserialize)]
pub struct Feature {
    /// Unique event ID
    pub id: String,

    /// Geographic location
    pub geometry: Geometry,

    /// Event properties
    pub properties: Properties,
}

impl Feature {
    /// Validate the feature structure.
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.id.is_empty() {
            return Err(IngestError::InvalidResponse("empty event ID".into()));
        }
        if self.geometry.coordinates.len() < 3 {
            return Err(IngestError::InvalidResponse(format!(
                "event {}: expected 3 coordinates, got {}",
                self.id,
                self.geometry.coordinates.len()
            )));
        }
        Ok(())
    }
}

/// Point geometry: `[longitude, latitude, depth_km]`.
#[derive(Debug, Clone, Deserialize)]
pub struct Geometry {
    pub coordinates: Vec<f64>,
}

/// Feature properties. Only the fields the dashboard reads are decoded.
#[derive(Debug, Clone, Deserialize)]
pub struct Properties {
    /// Magnitude value
    pub mag: Option<f64>,

    /// Magnitude type (mb, ml, mw, ...)
    #[serde(rename = "magType", default)]
    pub mag_type: Option<String>,

    /// Human-readable place description
    pub place: Option<String>,

    /// Event time (ms since epoch)
    pub time: i64,

    /// Event page URL
    pub url: Option<String>,
}

/// An ingested seismic event.
///
/// Identity is `id`; events are never mutated after ingestion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub id: String,
    pub magnitude: f64,
    pub magnitude_type: Option<String>,
    pub occurred_at_millis: i64,
    pub place: String,
    pub longitude: f64,
    pub latitude: f64,
    pub depth_km: f64,
    pub detail_url: String,
}

impl Event {
    /// Event time as a `DateTime<Utc>`.
    #[must_use]
    pub fn occurred_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.occurred_at_millis).single()
    }

    /// Age of the event relative to `now_millis`.
    #[must_use]
    pub fn age_millis(&self, now_millis: i64) -> i64 {
        now_millis.saturating_sub(self.occurred_at_millis)
    }
}

impl From<Feature> for Event {
    // A null magnitude counts as zero for filtering and averaging.
    fn from(f: Feature) -> Self {
        let coord = |i: usize| f.geometry.coordinates.get(i).copied().unwrap_or(0.0);
        Self {
            longitude: coord(0),
            latitude: coord(1),
            depth_km: coord(2),
            id: f.id,
            magnitude: f.properties.mag.unwrap_or(0.0),
            magnitude_type: f.properties.mag_type,
            occurred_at_millis: f.properties.time,
            place: f.properties.place.unwrap_or_default(),
            detail_url: f.properties.url.unwrap_or_default(),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sample_feed() {
        let feed: FeatureCollection =
            serde_json::from_str(fixtures::SAMPLE_FEED).expect("failed to parse sample feed");

        feed.validate().expect("invalid feed");
        assert_eq!(feed.metadata.as_ref().map(|m| m.generated), Some(1_700_000_000_000));

        let events = feed.into_events();
        // The third feature has no id and only two coordinates.
        assert_eq!(events.len(), 2);

        let first = &events[0];
        assert_eq!(first.id, "ci40000001");
        assert!((first.magnitude - 2.1).abs() < f64::EPSILON);
        assert!((first.longitude - (-117.6)).abs() < f64::EPSILON);
        assert!((first.latitude - 35.7).abs() < f64::EPSILON);
        assert!((first.depth_km - 7.9).abs() < f64::EPSILON);
        assert_eq!(first.place, "12 km SW of Searles Valley, CA");
    }

    #[test]
    fn test_null_fields_default() {
        let feed: FeatureCollection = serde_json::from_str(fixtures::SAMPLE_FEED).unwrap();
        let events = feed.into_events();
        let second = &events[1];
        assert!(second.magnitude.abs() < f64::EPSILON);
        assert!(second.place.is_empty());
        assert!(second.detail_url.is_empty());
    }

    #[test]
    fn test_rejects_wrong_type() {
        let feed: FeatureCollection =
            serde_json::from_str(r#"{"type": "Feature", "features": []}"#).unwrap();
        assert!(matches!(feed.validate(), Err(IngestError::InvalidResponse(_))));
    }

    #[test]
    fn test_age_millis() {
        let event = fixtures::event("a", 1.0, 5_000, 100_000);
        assert_eq!(event.age_millis(100_000), 5_000);
        assert!(event.occurred_at().is_some());
    }
}
