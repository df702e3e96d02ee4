//! Alert and audit-trail contracts shared across the monitoring pipeline.
//!
//! These types mirror the persisted schema: an [`Alert`] is created when a
//! zone trips its density or clustering condition (or an operator raises one
//! manually), and every transition leaves an append-only [`EventLogEntry`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Alert severity, ordered from least to most urgent.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("Invalid severity: {}", s)),
        }
    }
}

/// Category of an audit-trail entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Alert,
    Detection,
    System,
    UserAction,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Alert => write!(f, "alert"),
            EventType::Detection => write!(f, "detection"),
            EventType::System => write!(f, "system"),
            EventType::UserAction => write!(f, "user_action"),
        }
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "alert" => Ok(EventType::Alert),
            "detection" => Ok(EventType::Detection),
            "system" => Ok(EventType::System),
            "user_action" => Ok(EventType::UserAction),
            _ => Err(format!("Invalid event type: {}", s)),
        }
    }
}

/// A persisted alert raised for a zone.
///
/// Created once on trigger and mutated only by a resolve operation; all other
/// fields are immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alert {
    /// Unique alert identifier (UUID v4, string form)
    pub id: String,

    /// Human-readable description of the condition
    pub message: String,

    pub severity: Severity,

    /// Zone or free-form location the alert applies to
    pub location: String,

    /// Zone crowd density at trigger time, in `[0, 1]`
    #[serde(default)]
    pub crowd_density: f64,

    pub timestamp: DateTime<Utc>,

    #[serde(default)]
    pub resolved: bool,

    /// Identity that resolved the alert ("system" for auto-resolution)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,

    /// Free-form context (cluster details, source, etc.)
    #[serde(default = "empty_metadata")]
    pub metadata: serde_json::Value,
}

fn empty_metadata() -> serde_json::Value {
    json!({})
}

impl Alert {
    pub fn new(
        message: impl Into<String>,
        severity: Severity,
        location: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            message: message.into(),
            severity,
            location: location.into(),
            crowd_density: 0.0,
            timestamp: Utc::now(),
            resolved: false,
            resolved_by: None,
            resolved_at: None,
            metadata: empty_metadata(),
        }
    }

    pub fn with_density(mut self, crowd_density: f64) -> Self {
        self.crowd_density = crowd_density;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Mark the alert resolved. Idempotence is the caller's concern; this
    /// overwrites the resolution fields unconditionally.
    pub fn resolve(&mut self, resolved_by: impl Into<String>, at: DateTime<Utc>) {
        self.resolved = true;
        self.resolved_by = Some(resolved_by.into());
        self.resolved_at = Some(at);
    }
}

/// One append-only audit-trail record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventLogEntry {
    pub id: String,

    pub timestamp: DateTime<Utc>,

    pub event_type: EventType,

    pub description: String,

    /// Structured payload attached to the entry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Acting user for `user_action` entries
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl EventLogEntry {
    pub fn new(event_type: EventType, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type,
            description: description.into(),
            data: None,
            location: None,
            user_id: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(Severity::Critical).unwrap(),
            json!("critical")
        );
        assert_eq!(serde_json::to_value(Severity::Low).unwrap(), json!("low"));
    }

    #[test]
    fn severity_ordering_matches_urgency() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn severity_parses_case_insensitively() {
        assert_eq!("HIGH".parse::<Severity>().unwrap(), Severity::High);
        assert!("extreme".parse::<Severity>().is_err());
    }

    #[test]
    fn event_type_uses_snake_case() {
        assert_eq!(
            serde_json::to_value(EventType::UserAction).unwrap(),
            json!("user_action")
        );
        assert_eq!(
            "user_action".parse::<EventType>().unwrap(),
            EventType::UserAction
        );
    }

    #[test]
    fn new_alert_is_unresolved() {
        let alert = Alert::new("High crowd density detected", Severity::High, "MainStage");
        assert!(!alert.resolved);
        assert!(alert.resolved_by.is_none());
        assert_eq!(alert.metadata, json!({}));
        assert!(!alert.id.is_empty());
    }

    #[test]
    fn resolve_sets_all_resolution_fields() {
        let mut alert = Alert::new("test", Severity::Medium, "GateB");
        let at = Utc::now();
        alert.resolve("system", at);
        assert!(alert.resolved);
        assert_eq!(alert.resolved_by.as_deref(), Some("system"));
        assert_eq!(alert.resolved_at, Some(at));
    }

    #[test]
    fn alert_deserializes_with_optional_fields_absent() {
        let alert: Alert = serde_json::from_value(json!({
            "id": "a-1",
            "message": "Manual alert",
            "severity": "medium",
            "location": "GateB",
            "timestamp": "2026-08-25T12:00:00Z"
        }))
        .unwrap();
        assert!(!alert.resolved);
        assert_eq!(alert.crowd_density, 0.0);
        assert_eq!(alert.metadata, json!({}));
    }
}
