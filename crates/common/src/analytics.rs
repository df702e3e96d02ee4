//! Per-frame analytics input and the periodic rollup written for
//! time-series queries.

use crate::alerts::Severity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One detected person, in pixel coordinates of the source frame.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DetectionPoint {
    pub x: f64,
    pub y: f64,
    pub confidence: f32,
}

/// Per-frame measurement for one zone, produced upstream by the detector.
///
/// Immutable once constructed; the pipeline owns it transiently while
/// evaluating alert conditions for the zone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalyticsSample {
    pub zone_id: String,

    pub timestamp: DateTime<Utc>,

    pub person_count: u32,

    /// Detected person positions, in frame order
    #[serde(default)]
    pub detections: Vec<DetectionPoint>,

    /// Producer-side density estimate, in `[0, 1]`. Advisory only; the
    /// engine recomputes density from `person_count` and zone capacity.
    #[serde(default)]
    pub crowd_density: f64,
}

impl AnalyticsSample {
    pub fn new(zone_id: impl Into<String>, person_count: u32) -> Self {
        Self {
            zone_id: zone_id.into(),
            timestamp: Utc::now(),
            person_count,
            detections: Vec::new(),
            crowd_density: 0.0,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_detections(mut self, detections: Vec<DetectionPoint>) -> Self {
        self.detections = detections;
        self
    }

    pub fn with_density(mut self, crowd_density: f64) -> Self {
        self.crowd_density = crowd_density;
        self
    }
}

/// Live rollup for one zone, embedded in snapshots and status responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ZoneSummary {
    pub crowd_density: f64,
    pub person_count: u32,
    pub safety_score: f64,
    pub alert_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_severity: Option<Severity>,
}

/// Periodic append-only rollup across all zones.
///
/// `crowd_density` and `safety_score` carry the worst case over zones
/// (highest density, lowest score); `person_count` is the total.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalyticsSnapshot {
    pub timestamp: DateTime<Utc>,

    pub crowd_density: f64,

    pub person_count: u32,

    pub safety_score: f64,

    pub active_alerts: u64,

    #[serde(default)]
    pub zones: HashMap<String, ZoneSummary>,
}

impl Default for AnalyticsSnapshot {
    fn default() -> Self {
        Self {
            timestamp: Utc::now(),
            crowd_density: 0.0,
            person_count: 0,
            safety_score: 100.0,
            active_alerts: 0,
            zones: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sample_deserializes_without_detections() {
        let sample: AnalyticsSample = serde_json::from_value(json!({
            "zone_id": "MainStage",
            "timestamp": "2026-08-25T12:00:00Z",
            "person_count": 85
        }))
        .unwrap();
        assert!(sample.detections.is_empty());
        assert_eq!(sample.crowd_density, 0.0);
    }

    #[test]
    fn default_snapshot_is_fully_safe() {
        let snapshot = AnalyticsSnapshot::default();
        assert_eq!(snapshot.safety_score, 100.0);
        assert_eq!(snapshot.person_count, 0);
        assert!(snapshot.zones.is_empty());
    }

    #[test]
    fn zone_summary_omits_absent_severity() {
        let summary = ZoneSummary {
            crowd_density: 0.2,
            person_count: 20,
            safety_score: 80.0,
            alert_active: false,
            last_severity: None,
        };
        let value = serde_json::to_value(&summary).unwrap();
        assert!(value.get("last_severity").is_none());
    }
}
