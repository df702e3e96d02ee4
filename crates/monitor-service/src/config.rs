use anyhow::{bail, ensure, Context, Result};
use std::collections::HashMap;
use std::env;
use std::str::FromStr;

/// Runtime configuration for the monitoring engine, loaded from the
/// environment at startup. Invalid values fail fast here; nothing is
/// re-validated on the hot path.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Address to bind the HTTP server to
    pub bind_addr: String,

    /// Postgres connection string; absent means the in-memory store
    pub database_url: Option<String>,

    /// Zone density at or above which an alert is triggered, in (0, 1]
    pub density_threshold: f64,

    /// Minimum seconds between repeated alerts for the same zone
    pub alert_cooldown_secs: i64,

    /// Capacity assumed for zones without an explicit entry
    pub default_zone_capacity: u32,

    /// Per-zone capacity overrides ("MainStage=100,GateB=250")
    pub zone_capacities: HashMap<String, u32>,

    /// Proximity radius in pixels for grouping detections into clusters
    pub cluster_radius: f64,

    /// Minimum number of members for a group to count as a cluster
    pub min_cluster_size: usize,

    /// Local density (persons per square pixel) above which a cluster
    /// is dangerous
    pub cluster_density_threshold: f64,

    /// Weight of crowd density in the safety score
    pub density_weight: f64,

    /// Safety-score penalty per dangerous cluster
    pub cluster_penalty: f64,

    /// Density at or above which alert severity is "high"
    pub severity_high_at: f64,

    /// Density at or above which alert severity is "critical"
    pub severity_critical_at: f64,

    /// Seconds between persisted analytics snapshots
    pub snapshot_interval_secs: u64,

    /// Upper bound on any single persistence operation
    pub store_timeout_secs: u64,

    /// Per-subscriber broadcast buffer capacity (drop-oldest on overflow)
    pub broadcast_capacity: usize,
}

impl MonitorConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr =
            env::var("MONITOR_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string());

        let database_url = env::var("DATABASE_URL").ok();

        let config = Self {
            bind_addr,
            database_url,
            density_threshold: parse_env("MONITOR_DENSITY_THRESHOLD", 0.8)?,
            alert_cooldown_secs: parse_env("MONITOR_ALERT_COOLDOWN_SECS", 30)?,
            default_zone_capacity: parse_env("MONITOR_DEFAULT_ZONE_CAPACITY", 100)?,
            zone_capacities: parse_zone_capacities(
                env::var("MONITOR_ZONE_CAPACITIES").ok().as_deref(),
            )?,
            cluster_radius: parse_env("MONITOR_CLUSTER_RADIUS", 50.0)?,
            min_cluster_size: parse_env("MONITOR_MIN_CLUSTER_SIZE", 3)?,
            cluster_density_threshold: parse_env("MONITOR_CLUSTER_DENSITY_THRESHOLD", 0.01)?,
            density_weight: parse_env("MONITOR_DENSITY_WEIGHT", 100.0)?,
            cluster_penalty: parse_env("MONITOR_CLUSTER_PENALTY", 5.0)?,
            severity_high_at: parse_env("MONITOR_SEVERITY_HIGH_AT", 0.8)?,
            severity_critical_at: parse_env("MONITOR_SEVERITY_CRITICAL_AT", 0.9)?,
            snapshot_interval_secs: parse_env("MONITOR_SNAPSHOT_INTERVAL_SECS", 10)?,
            store_timeout_secs: parse_env("MONITOR_STORE_TIMEOUT_SECS", 5)?,
            broadcast_capacity: parse_env("MONITOR_BROADCAST_CAPACITY", 256)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject out-of-range values before the engine ever sees them.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.density_threshold > 0.0 && self.density_threshold <= 1.0,
            "MONITOR_DENSITY_THRESHOLD must be within (0, 1], got {}",
            self.density_threshold
        );
        ensure!(
            self.alert_cooldown_secs > 0,
            "MONITOR_ALERT_COOLDOWN_SECS must be positive, got {}",
            self.alert_cooldown_secs
        );
        ensure!(
            self.default_zone_capacity > 0,
            "MONITOR_DEFAULT_ZONE_CAPACITY must be positive"
        );
        for (zone, capacity) in &self.zone_capacities {
            ensure!(
                *capacity > 0,
                "MONITOR_ZONE_CAPACITIES entry for '{}' must be positive",
                zone
            );
        }
        ensure!(
            self.cluster_radius > 0.0 && self.cluster_radius.is_finite(),
            "MONITOR_CLUSTER_RADIUS must be positive, got {}",
            self.cluster_radius
        );
        ensure!(
            self.min_cluster_size >= 2,
            "MONITOR_MIN_CLUSTER_SIZE must be at least 2, got {}",
            self.min_cluster_size
        );
        ensure!(
            self.cluster_density_threshold > 0.0,
            "MONITOR_CLUSTER_DENSITY_THRESHOLD must be positive"
        );
        ensure!(
            self.density_weight >= 0.0 && self.cluster_penalty >= 0.0,
            "safety score weights must not be negative"
        );
        ensure!(
            self.severity_high_at > 0.0
                && self.severity_high_at <= self.severity_critical_at
                && self.severity_critical_at <= 1.0,
            "severity bands must satisfy 0 < MONITOR_SEVERITY_HIGH_AT <= MONITOR_SEVERITY_CRITICAL_AT <= 1"
        );
        ensure!(
            self.snapshot_interval_secs > 0,
            "MONITOR_SNAPSHOT_INTERVAL_SECS must be positive"
        );
        ensure!(
            self.store_timeout_secs > 0,
            "MONITOR_STORE_TIMEOUT_SECS must be positive"
        );
        ensure!(
            self.broadcast_capacity > 0,
            "MONITOR_BROADCAST_CAPACITY must be positive"
        );
        Ok(())
    }

    /// Configured capacity for a zone, falling back to the default.
    pub fn capacity_for(&self, zone_id: &str) -> u32 {
        self.zone_capacities
            .get(zone_id)
            .copied()
            .unwrap_or(self.default_zone_capacity)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
            database_url: None,
            density_threshold: 0.8,
            alert_cooldown_secs: 30,
            default_zone_capacity: 100,
            zone_capacities: HashMap::new(),
            cluster_radius: 50.0,
            min_cluster_size: 3,
            cluster_density_threshold: 0.01,
            density_weight: 100.0,
            cluster_penalty: 5.0,
            severity_high_at: 0.8,
            severity_critical_at: 0.9,
            snapshot_interval_secs: 10,
            store_timeout_secs: 5,
            broadcast_capacity: 256,
        }
    }
}

fn parse_env<T: FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}: '{}'", key, raw)),
        Err(_) => Ok(default),
    }
}

fn parse_zone_capacities(raw: Option<&str>) -> Result<HashMap<String, u32>> {
    let mut capacities = HashMap::new();
    let Some(raw) = raw else {
        return Ok(capacities);
    };

    for entry in raw.split(',').filter(|e| !e.trim().is_empty()) {
        let Some((zone, capacity)) = entry.split_once('=') else {
            bail!(
                "MONITOR_ZONE_CAPACITIES entry '{}' is not of the form zone=capacity",
                entry
            );
        };
        let zone = zone.trim();
        ensure!(!zone.is_empty(), "MONITOR_ZONE_CAPACITIES has an empty zone name");
        let capacity: u32 = capacity
            .trim()
            .parse()
            .with_context(|| format!("Invalid capacity for zone '{}'", zone))?;
        capacities.insert(zone.to_string(), capacity);
    }

    Ok(capacities)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = MonitorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.density_threshold, 0.8);
        assert_eq!(config.alert_cooldown_secs, 30);
        assert_eq!(config.capacity_for("anything"), 100);
    }

    #[test]
    fn zone_capacities_parse_and_override() {
        let capacities =
            parse_zone_capacities(Some("MainStage=100, GateB=250")).unwrap();
        assert_eq!(capacities.get("MainStage"), Some(&100));
        assert_eq!(capacities.get("GateB"), Some(&250));

        let config = MonitorConfig {
            zone_capacities: capacities,
            ..MonitorConfig::default()
        };
        assert_eq!(config.capacity_for("GateB"), 250);
        assert_eq!(config.capacity_for("Unknown"), 100);
    }

    #[test]
    fn malformed_zone_capacities_rejected() {
        assert!(parse_zone_capacities(Some("MainStage")).is_err());
        assert!(parse_zone_capacities(Some("MainStage=lots")).is_err());
        assert!(parse_zone_capacities(Some("=5")).is_err());
        assert!(parse_zone_capacities(None).unwrap().is_empty());
    }

    #[test]
    fn validation_rejects_out_of_range_values() {
        let mut config = MonitorConfig::default();
        config.density_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.alert_cooldown_secs = 0;
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.severity_high_at = 0.95;
        config.severity_critical_at = 0.9;
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.min_cluster_size = 1;
        assert!(config.validate().is_err());
    }
}
