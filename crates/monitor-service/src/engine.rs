//! Alert engine: per-zone alert state machines driven by the analytics
//! sample stream.
//!
//! Each zone owns an independent state machine guarded by its own lock, so
//! evaluation for one zone never blocks another. An alert transition only
//! commits after the store accepted it; a failed write leaves the zone
//! exactly where it was.

use crate::broadcaster::{AlertBroadcaster, AlertFlash, AnalyticsUpdate, StreamMessage};
use crate::cluster::ClusterDetector;
use crate::config::MonitorConfig;
use crate::density::{DensityEvaluator, DensityScore};
use crate::error::EngineError;
use crate::store::{AlertQuery, AlertStore, MAX_QUERY_LIMIT};
use chrono::{DateTime, Duration, Utc};
use common::alerts::{Alert, EventLogEntry, EventType, Severity};
use common::analytics::{AnalyticsSample, AnalyticsSnapshot, ZoneSummary};
use common::validation::{validate_actor, validate_alert, validate_sample};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use telemetry::metrics::{
    MONITOR_ACTIVE_ALERTS, MONITOR_ALERTS_RESOLVED, MONITOR_ALERTS_SUPPRESSED,
    MONITOR_ALERTS_TRIGGERED, MONITOR_EVALUATION_LATENCY, MONITOR_SAMPLES_EVALUATED,
    MONITOR_STORE_OPERATIONS,
};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Result of evaluating one analytics sample.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Evaluation {
    pub zone_id: String,
    pub crowd_density: f64,
    pub safety_score: f64,
    pub person_count: u32,
    pub active_alerts: u64,
    #[serde(flatten)]
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Outcome {
    /// A new alert was raised for the zone.
    Triggered { alert: Alert },
    /// Conditions warrant an alert but the zone is still in cooldown.
    Suppressed { seconds_remaining: i64 },
    /// The zone's active alert was auto-resolved.
    Resolved { alert: Alert },
    /// Nothing to do.
    Normal,
}

impl Outcome {
    pub fn kind(&self) -> &'static str {
        match self {
            Outcome::Triggered { .. } => "triggered",
            Outcome::Suppressed { .. } => "suppressed",
            Outcome::Resolved { .. } => "resolved",
            Outcome::Normal => "normal",
        }
    }
}

/// Point-in-time view of the engine, served over the API and pushed to
/// websocket clients when they join.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusSummary {
    pub monitoring_active: bool,
    pub active_alerts: u64,
    pub connections: usize,
    pub zones: HashMap<String, ZoneSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct ActiveAlert {
    id: String,
    triggered_at: DateTime<Utc>,
}

struct ZoneAlertState {
    zone_id: String,
    alert: Option<ActiveAlert>,
    last_severity: Option<Severity>,
    last_density: f64,
    last_safety_score: f64,
    last_person_count: u32,
}

impl ZoneAlertState {
    fn new(zone_id: &str) -> Self {
        Self {
            zone_id: zone_id.to_string(),
            alert: None,
            last_severity: None,
            last_density: 0.0,
            last_safety_score: 100.0,
            last_person_count: 0,
        }
    }

    fn summary(&self) -> ZoneSummary {
        ZoneSummary {
            crowd_density: self.last_density,
            person_count: self.last_person_count,
            safety_score: self.last_safety_score,
            alert_active: self.alert.is_some(),
            last_severity: self.last_severity,
        }
    }
}

pub struct AlertEngine {
    config: MonitorConfig,
    store: Arc<dyn AlertStore>,
    broadcaster: AlertBroadcaster,
    density: DensityEvaluator,
    clusters: ClusterDetector,
    zones: RwLock<HashMap<String, Arc<Mutex<ZoneAlertState>>>>,
    monitoring: AtomicBool,
    active_alerts: AtomicI64,
    last_updated: RwLock<Option<DateTime<Utc>>>,
}

impl AlertEngine {
    pub fn new(
        config: MonitorConfig,
        store: Arc<dyn AlertStore>,
        broadcaster: AlertBroadcaster,
    ) -> Self {
        Self {
            density: DensityEvaluator::new(&config),
            clusters: ClusterDetector::new(&config),
            store,
            broadcaster,
            zones: RwLock::new(HashMap::new()),
            monitoring: AtomicBool::new(false),
            active_alerts: AtomicI64::new(0),
            last_updated: RwLock::new(None),
            config,
        }
    }

    /// Rebuild in-memory zone state from alerts that were still open when
    /// the service last went down. Without this a restart could raise a
    /// second alert for a zone that already has one.
    pub async fn hydrate(&self) -> Result<(), EngineError> {
        let query = AlertQuery {
            resolved: Some(false),
            limit: MAX_QUERY_LIMIT,
            ..AlertQuery::default()
        };
        let open = self
            .store_op("query_alerts", self.store.query_alerts(&query))
            .await?;

        let mut zones = self.zones.write().await;
        for alert in &open {
            let state = zones
                .entry(alert.location.clone())
                .or_insert_with(|| Arc::new(Mutex::new(ZoneAlertState::new(&alert.location))));
            let mut state = state.lock().await;
            // Alerts arrive newest first; keep the most recent one per zone.
            if state.alert.is_none() {
                state.alert = Some(ActiveAlert {
                    id: alert.id.clone(),
                    triggered_at: alert.timestamp,
                });
                state.last_severity = Some(alert.severity);
                state.last_density = alert.crowd_density;
            }
        }
        drop(zones);

        let count = self
            .store_op("count_active_alerts", self.store.count_active_alerts())
            .await?;
        self.active_alerts.store(count as i64, Ordering::SeqCst);
        MONITOR_ACTIVE_ALERTS.set(count as i64);
        tracing::info!(open_alerts = count, "alert engine hydrated");
        Ok(())
    }

    /// Run one analytics sample through the zone's state machine.
    pub async fn evaluate_sample(
        &self,
        sample: &AnalyticsSample,
    ) -> Result<Evaluation, EngineError> {
        validate_sample(sample).map_err(EngineError::validation)?;

        let timer = MONITOR_EVALUATION_LATENCY.start_timer();
        let result = self.evaluate_locked(sample).await;
        timer.observe_duration();

        let outcome_label = match &result {
            Ok(evaluation) => evaluation.outcome.kind(),
            Err(_) => "error",
        };
        MONITOR_SAMPLES_EVALUATED
            .with_label_values(&[sample.zone_id.as_str(), outcome_label])
            .inc();

        result
    }

    async fn evaluate_locked(&self, sample: &AnalyticsSample) -> Result<Evaluation, EngineError> {
        let clusters = self.clusters.detect(sample);
        let dangerous = self.clusters.dangerous_count(&clusters);
        let score = self.density.evaluate(sample, dangerous);
        let over_threshold =
            score.crowd_density >= self.config.density_threshold || dangerous > 0;

        let state = self.zone_state(&sample.zone_id).await;
        let mut state = state.lock().await;

        let outcome = match state.alert.clone() {
            Some(active) => {
                let cooldown = Duration::seconds(self.config.alert_cooldown_secs);
                let elapsed = sample.timestamp - active.triggered_at;
                if elapsed < cooldown {
                    // Also covers samples dated before the trigger; anything
                    // inside the cooldown leaves the active alert untouched.
                    let seconds_remaining =
                        (cooldown - elapsed.max(Duration::zero())).num_seconds();
                    MONITOR_ALERTS_SUPPRESSED
                        .with_label_values(&[sample.zone_id.as_str()])
                        .inc();
                    tracing::debug!(
                        zone = %sample.zone_id,
                        seconds_remaining,
                        "alert suppressed, cooldown active"
                    );
                    Outcome::Suppressed { seconds_remaining }
                } else if over_threshold {
                    // Conditions persist past the cooldown. Resolve the stale
                    // alert before raising the fresh one so the zone never
                    // holds two open alerts, even if the second write fails.
                    self.resolve_for_zone(&mut state, &active.id, sample).await?;
                    let alert = self
                        .trigger_for_zone(&mut state, sample, score, dangerous)
                        .await?;
                    Outcome::Triggered { alert }
                } else {
                    match self.resolve_for_zone(&mut state, &active.id, sample).await? {
                        Some(alert) => Outcome::Resolved { alert },
                        None => Outcome::Normal,
                    }
                }
            }
            None => {
                if over_threshold {
                    let alert = self
                        .trigger_for_zone(&mut state, sample, score, dangerous)
                        .await?;
                    Outcome::Triggered { alert }
                } else {
                    Outcome::Normal
                }
            }
        };

        state.last_density = score.crowd_density;
        state.last_safety_score = score.safety_score;
        state.last_person_count = sample.person_count;
        *self.last_updated.write().await = Some(Utc::now());

        let flash = match &outcome {
            Outcome::Triggered { alert } => Some(AlertFlash {
                triggered: true,
                message: alert.message.clone(),
            }),
            _ => None,
        };
        // Published while the zone lock is held so subscribers observe one
        // zone's transitions in order.
        self.broadcaster.publish(StreamMessage::VideoFrame {
            frame: None,
            analytics: AnalyticsUpdate {
                crowd_density: score.crowd_density,
                safety_score: score.safety_score,
                person_count: sample.person_count,
                active_alerts: self.active_alert_count(),
            },
            alert: flash,
        });

        Ok(Evaluation {
            zone_id: sample.zone_id.clone(),
            crowd_density: score.crowd_density,
            safety_score: score.safety_score,
            person_count: sample.person_count,
            active_alerts: self.active_alert_count(),
            outcome,
        })
    }

    /// Persist and commit a new alert for the zone. The store write happens
    /// first; zone state only changes once it succeeded.
    async fn trigger_for_zone(
        &self,
        state: &mut ZoneAlertState,
        sample: &AnalyticsSample,
        score: DensityScore,
        dangerous_clusters: usize,
    ) -> Result<Alert, EngineError> {
        let severity = self.severity_for(score.crowd_density);
        let message = if score.crowd_density >= self.config.density_threshold {
            format!(
                "High crowd density detected: {:.2}%",
                score.crowd_density * 100.0
            )
        } else {
            format!("Dangerous crowd clustering detected: {dangerous_clusters} clusters")
        };

        let alert = Alert::new(message, severity, state.zone_id.clone())
            .with_density(score.crowd_density)
            .with_timestamp(sample.timestamp)
            .with_metadata(json!({
                "person_count": sample.person_count,
                "dangerous_clusters": dangerous_clusters,
                "safety_score": score.safety_score,
            }));

        self.store_op("save_alert", self.store.save_alert(&alert))
            .await?;

        state.alert = Some(ActiveAlert {
            id: alert.id.clone(),
            triggered_at: sample.timestamp,
        });
        state.last_severity = Some(severity);

        self.active_alerts.fetch_add(1, Ordering::SeqCst);
        MONITOR_ACTIVE_ALERTS.inc();
        MONITOR_ALERTS_TRIGGERED
            .with_label_values(&[state.zone_id.as_str(), &severity.to_string()])
            .inc();
        tracing::info!(
            alert_id = %alert.id,
            zone = %state.zone_id,
            severity = %severity,
            crowd_density = score.crowd_density,
            "alert triggered"
        );

        self.log_event(
            EventLogEntry::new(EventType::Alert, alert.message.clone())
                .with_location(state.zone_id.clone())
                .with_timestamp(sample.timestamp)
                .with_data(json!({
                    "alert_id": alert.id,
                    "crowd_density": score.crowd_density,
                    "severity": severity,
                })),
        )
        .await;

        Ok(alert)
    }

    /// Resolve the zone's active alert on behalf of the system, using the
    /// sample's timestamp as the resolution time.
    async fn resolve_for_zone(
        &self,
        state: &mut ZoneAlertState,
        alert_id: &str,
        sample: &AnalyticsSample,
    ) -> Result<Option<Alert>, EngineError> {
        let resolved = self
            .store_op(
                "resolve_alert",
                self.store.resolve_alert(alert_id, "system", sample.timestamp),
            )
            .await?;

        // The store answered; whatever it said, the zone slot is free now.
        state.alert = None;

        let Some(resolved) = resolved else {
            tracing::warn!(
                alert_id = %alert_id,
                zone = %state.zone_id,
                "active alert missing from store"
            );
            return Ok(None);
        };

        if resolved.was_updated() {
            self.active_alerts.fetch_sub(1, Ordering::SeqCst);
            MONITOR_ACTIVE_ALERTS.dec();
            MONITOR_ALERTS_RESOLVED.with_label_values(&["system"]).inc();
            tracing::info!(
                alert_id = %alert_id,
                zone = %state.zone_id,
                "alert auto-resolved"
            );
            self.log_event(
                EventLogEntry::new(EventType::System, "Crowd conditions returned to normal")
                    .with_location(state.zone_id.clone())
                    .with_timestamp(sample.timestamp)
                    .with_data(json!({ "alert_id": alert_id })),
            )
            .await;
        }

        Ok(Some(resolved.into_alert()))
    }

    /// Raise an operator-initiated alert. Manual alerts are not tied to a
    /// zone's state machine and never count against its cooldown.
    pub async fn manual_alert(
        &self,
        message: String,
        severity: Severity,
        location: String,
        metadata: Option<serde_json::Value>,
    ) -> Result<Alert, EngineError> {
        let crowd_density = self.zone_density(&location).await;
        let mut alert = Alert::new(message, severity, location).with_density(crowd_density);
        if let Some(metadata) = metadata {
            alert = alert.with_metadata(metadata);
        }
        validate_alert(&alert).map_err(EngineError::validation)?;

        self.store_op("save_alert", self.store.save_alert(&alert))
            .await?;

        self.active_alerts.fetch_add(1, Ordering::SeqCst);
        MONITOR_ACTIVE_ALERTS.inc();
        MONITOR_ALERTS_TRIGGERED
            .with_label_values(&[alert.location.as_str(), &alert.severity.to_string()])
            .inc();
        tracing::info!(
            alert_id = %alert.id,
            location = %alert.location,
            severity = %alert.severity,
            "manual alert created"
        );

        self.log_event(
            EventLogEntry::new(
                EventType::Alert,
                format!("Manual alert created: {}", alert.message),
            )
            .with_location(alert.location.clone())
            .with_data(json!({ "alert_id": alert.id, "severity": alert.severity })),
        )
        .await;

        self.broadcaster
            .publish(StreamMessage::ManualAlert {
                alert: alert.clone(),
            });

        Ok(alert)
    }

    /// Resolve an alert on behalf of an operator. Returns `None` when no
    /// alert with that id exists; an already-resolved alert is returned as
    /// stored, with its original resolver intact.
    pub async fn resolve_alert(
        &self,
        alert_id: &str,
        resolved_by: &str,
    ) -> Result<Option<Alert>, EngineError> {
        validate_actor(resolved_by, "resolved_by").map_err(EngineError::validation)?;

        let resolved = self
            .store_op(
                "resolve_alert",
                self.store.resolve_alert(alert_id, resolved_by, Utc::now()),
            )
            .await?;

        let Some(resolved) = resolved else {
            return Ok(None);
        };

        if !resolved.was_updated() {
            // Someone else won the race; report the stored state as is.
            return Ok(Some(resolved.into_alert()));
        }

        self.active_alerts.fetch_sub(1, Ordering::SeqCst);
        MONITOR_ACTIVE_ALERTS.dec();
        MONITOR_ALERTS_RESOLVED.with_label_values(&["manual"]).inc();
        self.release_zone_slot(alert_id).await;

        let alert = resolved.into_alert();
        tracing::info!(
            alert_id = %alert.id,
            resolved_by = %resolved_by,
            "alert resolved"
        );
        self.log_event(
            EventLogEntry::new(
                EventType::UserAction,
                format!("Alert resolved by {resolved_by}"),
            )
            .with_location(alert.location.clone())
            .with_user(resolved_by)
            .with_data(json!({ "alert_id": alert.id })),
        )
        .await;

        self.broadcaster.publish(StreamMessage::SystemStatus {
            status: self.status().await,
        });

        Ok(Some(alert))
    }

    /// Enable sample ingestion. Returns false if monitoring was already on.
    pub async fn start_monitoring(&self) -> bool {
        let started = !self.monitoring.swap(true, Ordering::SeqCst);
        if started {
            tracing::info!("monitoring started");
            self.log_event(EventLogEntry::new(EventType::System, "Monitoring started"))
                .await;
            self.broadcaster.publish(StreamMessage::SystemStatus {
                status: self.status().await,
            });
        }
        started
    }

    /// Disable sample ingestion. Active alerts stay open until resolved.
    pub async fn stop_monitoring(&self) -> bool {
        let stopped = self.monitoring.swap(false, Ordering::SeqCst);
        if stopped {
            tracing::info!("monitoring stopped");
            self.log_event(EventLogEntry::new(EventType::System, "Monitoring stopped"))
                .await;
            self.broadcaster.publish(StreamMessage::SystemStatus {
                status: self.status().await,
            });
        }
        stopped
    }

    pub fn monitoring_active(&self) -> bool {
        self.monitoring.load(Ordering::SeqCst)
    }

    pub async fn status(&self) -> StatusSummary {
        StatusSummary {
            monitoring_active: self.monitoring_active(),
            active_alerts: self.active_alert_count(),
            connections: self.broadcaster.subscriber_count(),
            zones: self.zone_summaries().await,
            last_updated: *self.last_updated.read().await,
        }
    }

    /// Venue-wide snapshot: worst zone density and safety score, summed
    /// head count.
    pub async fn current_analytics(&self) -> AnalyticsSnapshot {
        let zones = self.zone_summaries().await;
        let mut snapshot = AnalyticsSnapshot {
            timestamp: Utc::now(),
            active_alerts: self.active_alert_count(),
            ..AnalyticsSnapshot::default()
        };
        for summary in zones.values() {
            snapshot.crowd_density = snapshot.crowd_density.max(summary.crowd_density);
            snapshot.safety_score = snapshot.safety_score.min(summary.safety_score);
            snapshot.person_count += summary.person_count;
        }
        snapshot.zones = zones;
        snapshot
    }

    pub async fn record_snapshot(&self) -> Result<(), EngineError> {
        let snapshot = self.current_analytics().await;
        self.store_op("append_analytics", self.store.append_analytics(&snapshot))
            .await
    }

    /// Persist an analytics snapshot at a fixed interval while monitoring
    /// is active.
    pub fn start_snapshot_loop(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let period = std::time::Duration::from_secs(self.config.snapshot_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if !self.monitoring_active() {
                    continue;
                }
                if let Err(e) = self.record_snapshot().await {
                    tracing::warn!(error = %e, "failed to persist analytics snapshot");
                }
            }
            tracing::info!("analytics snapshot loop stopped");
        })
    }

    pub fn active_alert_count(&self) -> u64 {
        self.active_alerts.load(Ordering::SeqCst).max(0) as u64
    }

    fn severity_for(&self, density: f64) -> Severity {
        if density >= self.config.severity_critical_at {
            Severity::Critical
        } else if density >= self.config.severity_high_at {
            Severity::High
        } else {
            Severity::Medium
        }
    }

    async fn zone_state(&self, zone_id: &str) -> Arc<Mutex<ZoneAlertState>> {
        {
            let zones = self.zones.read().await;
            if let Some(state) = zones.get(zone_id) {
                return state.clone();
            }
        }
        let mut zones = self.zones.write().await;
        zones
            .entry(zone_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(ZoneAlertState::new(zone_id))))
            .clone()
    }

    async fn zone_summaries(&self) -> HashMap<String, ZoneSummary> {
        let states: Vec<Arc<Mutex<ZoneAlertState>>> = {
            let zones = self.zones.read().await;
            zones.values().cloned().collect()
        };
        let mut summaries = HashMap::with_capacity(states.len());
        for state in states {
            let state = state.lock().await;
            summaries.insert(state.zone_id.clone(), state.summary());
        }
        summaries
    }

    async fn zone_density(&self, location: &str) -> f64 {
        let state = {
            let zones = self.zones.read().await;
            zones.get(location).cloned()
        };
        match state {
            Some(state) => state.lock().await.last_density,
            None => 0.0,
        }
    }

    /// Drop the in-memory active marker for an alert resolved manually.
    async fn release_zone_slot(&self, alert_id: &str) {
        let states: Vec<Arc<Mutex<ZoneAlertState>>> = {
            let zones = self.zones.read().await;
            zones.values().cloned().collect()
        };
        for state in states {
            let mut state = state.lock().await;
            let held = match &state.alert {
                Some(active) => active.id == alert_id,
                None => false,
            };
            if held {
                state.alert = None;
                return;
            }
        }
    }

    /// Event logs are best effort and never veto an alert transition.
    async fn log_event(&self, entry: EventLogEntry) {
        if let Err(e) = self
            .store_op("append_event_log", self.store.append_event_log(&entry))
            .await
        {
            tracing::warn!(error = %e, "failed to append event log");
        }
    }

    /// Wrap a store call with the configured timeout and record the result.
    async fn store_op<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> Result<T, EngineError> {
        let timeout = std::time::Duration::from_secs(self.config.store_timeout_secs);
        let result = match tokio::time::timeout(timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(EngineError::persistence(format!("{operation} failed: {e:#}"))),
            Err(_) => Err(EngineError::persistence(format!(
                "{operation} timed out after {}s",
                self.config.store_timeout_secs
            ))),
        };
        let status = if result.is_ok() { "ok" } else { "error" };
        MONITOR_STORE_OPERATIONS
            .with_label_values(&[operation, status])
            .inc();
        result
    }
}
