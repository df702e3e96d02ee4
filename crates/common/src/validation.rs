//! Input validation utilities to prevent panics and unbounded inputs
//!
//! This module provides safe validation for all external inputs to prevent:
//! - Panic-induced service crashes
//! - OOM attacks via unbounded strings or detection lists
//! - Path traversal via zone identifiers used as keys

use crate::alerts::{Alert, EventLogEntry};
use crate::analytics::AnalyticsSample;
use anyhow::{anyhow, Result};

// ============================================================================
// CONSTANTS: Input Size Limits
// ============================================================================

/// Maximum length for zone identifiers
pub const MAX_ZONE_ID_LENGTH: usize = 128;

/// Maximum length for alert messages
pub const MAX_MESSAGE_LENGTH: usize = 1024;

/// Maximum length for locations
pub const MAX_LOCATION_LENGTH: usize = 256;

/// Maximum length for event log descriptions
pub const MAX_DESCRIPTION_LENGTH: usize = 2048;

/// Maximum length for resolver/actor identities
pub const MAX_ACTOR_LENGTH: usize = 128;

/// Maximum number of detection points accepted in one sample
pub const MAX_DETECTIONS_PER_SAMPLE: usize = 10_000;

// ============================================================================
// String Validation
// ============================================================================

/// Validate string length against a maximum
pub fn validate_length(value: &str, max_length: usize, field_name: &str) -> Result<()> {
    if value.len() > max_length {
        return Err(anyhow!(
            "{} exceeds maximum length of {} bytes (got {})",
            field_name,
            max_length,
            value.len()
        ));
    }
    Ok(())
}

/// Validate non-empty string
pub fn validate_non_empty(value: &str, field_name: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(anyhow!("{} cannot be empty", field_name));
    }
    Ok(())
}

/// Validate a zone identifier used as a state-arena key
pub fn validate_zone_id(zone_id: &str) -> Result<()> {
    validate_non_empty(zone_id, "zone_id")?;
    validate_length(zone_id, MAX_ZONE_ID_LENGTH, "zone_id")?;

    // Zone ids key in-memory state and appear in log fields
    if zone_id.contains("..") || zone_id.contains('/') || zone_id.contains('\\') {
        return Err(anyhow!(
            "zone_id contains invalid characters (no path separators or '..' allowed)"
        ));
    }

    Ok(())
}

/// Validate an alert or event location
pub fn validate_location(location: &str) -> Result<()> {
    validate_non_empty(location, "location")?;
    validate_length(location, MAX_LOCATION_LENGTH, "location")?;
    Ok(())
}

/// Validate an alert message
pub fn validate_message(message: &str) -> Result<()> {
    validate_non_empty(message, "message")?;
    validate_length(message, MAX_MESSAGE_LENGTH, "message")?;
    Ok(())
}

/// Validate a resolver/actor identity
pub fn validate_actor(actor: &str, field_name: &str) -> Result<()> {
    validate_non_empty(actor, field_name)?;
    validate_length(actor, MAX_ACTOR_LENGTH, field_name)?;
    Ok(())
}

// ============================================================================
// Numeric Validation
// ============================================================================

/// Clamp a ratio into `[0, 1]`, treating NaN and infinities as 0
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

// ============================================================================
// Record Validation (schema invariants enforced before write)
// ============================================================================

/// Validate an incoming analytics sample at the ingest boundary
pub fn validate_sample(sample: &AnalyticsSample) -> Result<()> {
    validate_zone_id(&sample.zone_id)?;

    if sample.detections.len() > MAX_DETECTIONS_PER_SAMPLE {
        return Err(anyhow!(
            "detections exceeds maximum of {} points (got {})",
            MAX_DETECTIONS_PER_SAMPLE,
            sample.detections.len()
        ));
    }

    for point in &sample.detections {
        if !point.x.is_finite() || !point.y.is_finite() {
            return Err(anyhow!("detection coordinates must be finite"));
        }
    }

    Ok(())
}

/// Validate an alert record before it is persisted
pub fn validate_alert(alert: &Alert) -> Result<()> {
    validate_non_empty(&alert.id, "id")?;
    validate_message(&alert.message)?;
    validate_location(&alert.location)?;

    if !alert.crowd_density.is_finite() || !(0.0..=1.0).contains(&alert.crowd_density) {
        return Err(anyhow!(
            "crowd_density must be within [0, 1] (got {})",
            alert.crowd_density
        ));
    }

    Ok(())
}

/// Validate an event log entry before it is persisted
pub fn validate_event_log(entry: &EventLogEntry) -> Result<()> {
    validate_non_empty(&entry.id, "id")?;
    validate_non_empty(&entry.description, "description")?;
    validate_length(&entry.description, MAX_DESCRIPTION_LENGTH, "description")?;

    if let Some(location) = &entry.location {
        validate_location(location)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::Severity;
    use crate::analytics::DetectionPoint;

    #[test]
    fn test_validate_zone_id() {
        assert!(validate_zone_id("MainStage").is_ok());
        assert!(validate_zone_id("gate-b-east").is_ok());
        assert!(validate_zone_id("").is_err());
        assert!(validate_zone_id("   ").is_err());
        assert!(validate_zone_id("../etc").is_err());
        assert!(validate_zone_id("a/b").is_err());
        assert!(validate_zone_id(&"x".repeat(MAX_ZONE_ID_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_clamp_unit() {
        assert_eq!(clamp_unit(0.5), 0.5);
        assert_eq!(clamp_unit(-0.1), 0.0);
        assert_eq!(clamp_unit(1.7), 1.0);
        assert_eq!(clamp_unit(f64::NAN), 0.0);
        assert_eq!(clamp_unit(f64::INFINITY), 0.0);
    }

    #[test]
    fn test_validate_sample_rejects_bad_coordinates() {
        let sample = AnalyticsSample::new("MainStage", 1).with_detections(vec![DetectionPoint {
            x: f64::NAN,
            y: 10.0,
            confidence: 0.9,
        }]);
        assert!(validate_sample(&sample).is_err());
    }

    #[test]
    fn test_validate_alert() {
        let alert = Alert::new("High crowd density detected", Severity::High, "MainStage")
            .with_density(0.85);
        assert!(validate_alert(&alert).is_ok());

        let empty_message = Alert::new("", Severity::High, "MainStage");
        assert!(validate_alert(&empty_message).is_err());

        let bad_density = Alert::new("x", Severity::High, "MainStage").with_density(1.5);
        assert!(validate_alert(&bad_density).is_err());
    }

    #[test]
    fn test_validate_event_log() {
        use crate::alerts::EventType;

        let entry = EventLogEntry::new(EventType::Alert, "alert raised");
        assert!(validate_event_log(&entry).is_ok());

        let empty = EventLogEntry::new(EventType::System, " ");
        assert!(validate_event_log(&empty).is_err());
    }
}
