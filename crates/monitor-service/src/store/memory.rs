//! In-memory store used when no `DATABASE_URL` is configured, and by tests.

use super::{AlertQuery, AlertStore, EventLogQuery, ResolvedAlert};
use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::alerts::{Alert, EventLogEntry};
use common::analytics::AnalyticsSnapshot;
use common::validation::{validate_alert, validate_event_log};
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryAlertStore {
    inner: RwLock<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
    alerts: Vec<Alert>,
    event_logs: Vec<EventLogEntry>,
    analytics: Vec<AnalyticsSnapshot>,
}

impl MemoryAlertStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
        }
    }
}

#[async_trait]
impl AlertStore for MemoryAlertStore {
    async fn save_alert(&self, alert: &Alert) -> Result<()> {
        validate_alert(alert)?;

        let mut inner = self.inner.write().await;
        if inner.alerts.iter().any(|a| a.id == alert.id) {
            bail!("alert id '{}' already exists", alert.id);
        }
        inner.alerts.push(alert.clone());
        Ok(())
    }

    async fn resolve_alert(
        &self,
        id: &str,
        resolved_by: &str,
        resolved_at: DateTime<Utc>,
    ) -> Result<Option<ResolvedAlert>> {
        let mut inner = self.inner.write().await;
        let Some(alert) = inner.alerts.iter_mut().find(|a| a.id == id) else {
            return Ok(None);
        };

        if alert.resolved {
            return Ok(Some(ResolvedAlert::AlreadyResolved(alert.clone())));
        }

        alert.resolve(resolved_by, resolved_at);
        Ok(Some(ResolvedAlert::Updated(alert.clone())))
    }

    async fn append_event_log(&self, entry: &EventLogEntry) -> Result<()> {
        validate_event_log(entry)?;

        let mut inner = self.inner.write().await;
        inner.event_logs.push(entry.clone());
        Ok(())
    }

    async fn append_analytics(&self, snapshot: &AnalyticsSnapshot) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.analytics.push(snapshot.clone());
        Ok(())
    }

    async fn query_alerts(&self, query: &AlertQuery) -> Result<Vec<Alert>> {
        let inner = self.inner.read().await;
        let mut matches: Vec<Alert> = inner
            .alerts
            .iter()
            .filter(|a| matches_alert(query, a))
            .cloned()
            .collect();

        matches.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(paginate(matches, query.offset(), query.normalized_limit()))
    }

    async fn query_event_logs(&self, query: &EventLogQuery) -> Result<Vec<EventLogEntry>> {
        let inner = self.inner.read().await;
        let mut matches: Vec<EventLogEntry> = inner
            .event_logs
            .iter()
            .filter(|e| matches_event_log(query, e))
            .cloned()
            .collect();

        matches.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(paginate(matches, query.offset(), query.normalized_limit()))
    }

    async fn analytics_history(
        &self,
        since: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<AnalyticsSnapshot>> {
        let inner = self.inner.read().await;
        let mut matches: Vec<AnalyticsSnapshot> = inner
            .analytics
            .iter()
            .filter(|s| s.timestamp >= since)
            .cloned()
            .collect();

        matches.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        matches.truncate(limit as usize);
        Ok(matches)
    }

    async fn count_active_alerts(&self) -> Result<u64> {
        let inner = self.inner.read().await;
        Ok(inner.alerts.iter().filter(|a| !a.resolved).count() as u64)
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

fn matches_alert(query: &AlertQuery, alert: &Alert) -> bool {
    if let Some(severity) = query.severity {
        if alert.severity != severity {
            return false;
        }
    }
    if let Some(resolved) = query.resolved {
        if alert.resolved != resolved {
            return false;
        }
    }
    if let Some(location) = &query.location {
        if &alert.location != location {
            return false;
        }
    }
    if let Some(since) = query.since {
        if alert.timestamp < since {
            return false;
        }
    }
    if let Some(until) = query.until {
        if alert.timestamp > until {
            return false;
        }
    }
    true
}

fn matches_event_log(query: &EventLogQuery, entry: &EventLogEntry) -> bool {
    if let Some(event_type) = query.event_type {
        if entry.event_type != event_type {
            return false;
        }
    }
    if let Some(location) = &query.location {
        if entry.location.as_deref() != Some(location.as_str()) {
            return false;
        }
    }
    if let Some(since) = query.since {
        if entry.timestamp < since {
            return false;
        }
    }
    if let Some(until) = query.until {
        if entry.timestamp > until {
            return false;
        }
    }
    true
}

fn paginate<T>(items: Vec<T>, offset: u32, limit: u32) -> Vec<T> {
    items
        .into_iter()
        .skip(offset as usize)
        .take(limit as usize)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use common::alerts::{EventType, Severity};

    fn store() -> MemoryAlertStore {
        MemoryAlertStore::new()
    }

    fn alert_at(message: &str, offset_secs: i64) -> Alert {
        Alert::new(message, Severity::High, "MainStage")
            .with_density(0.85)
            .with_timestamp(Utc::now() + Duration::seconds(offset_secs))
    }

    #[tokio::test]
    async fn queries_return_newest_first() {
        let store = store();
        store.save_alert(&alert_at("older", 0)).await.unwrap();
        store.save_alert(&alert_at("newer", 10)).await.unwrap();

        let alerts = store.query_alerts(&AlertQuery::default()).await.unwrap();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].message, "newer");
        assert_eq!(alerts[1].message, "older");
    }

    #[tokio::test]
    async fn duplicate_alert_id_is_rejected() {
        let store = store();
        let alert = alert_at("first", 0);
        store.save_alert(&alert).await.unwrap();
        assert!(store.save_alert(&alert).await.is_err());
    }

    #[tokio::test]
    async fn invalid_alert_is_rejected_before_write() {
        let store = store();
        let alert = Alert::new("x", Severity::High, "MainStage").with_density(2.0);
        assert!(store.save_alert(&alert).await.is_err());
        assert_eq!(store.count_active_alerts().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn resolve_is_compare_and_set() {
        let store = store();
        let alert = alert_at("resolve me", 0);
        store.save_alert(&alert).await.unwrap();

        let first_at = Utc::now();
        let first = store
            .resolve_alert(&alert.id, "system", first_at)
            .await
            .unwrap()
            .unwrap();
        assert!(first.was_updated());
        assert_eq!(first.alert().resolved_by.as_deref(), Some("system"));

        // A second resolve does not overwrite the original resolution
        let second = store
            .resolve_alert(&alert.id, "operator-7", Utc::now() + Duration::seconds(5))
            .await
            .unwrap()
            .unwrap();
        assert!(!second.was_updated());
        assert_eq!(second.alert().resolved_by.as_deref(), Some("system"));
        assert_eq!(second.alert().resolved_at, Some(first_at));
    }

    #[tokio::test]
    async fn resolve_unknown_id_returns_none() {
        let store = store();
        let outcome = store
            .resolve_alert("missing", "system", Utc::now())
            .await
            .unwrap();
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn alert_filters_combine() {
        let store = store();
        store.save_alert(&alert_at("stage", 0)).await.unwrap();

        let gate = Alert::new("gate", Severity::Critical, "GateB").with_density(0.5);
        store.save_alert(&gate).await.unwrap();
        store
            .resolve_alert(&gate.id, "system", Utc::now())
            .await
            .unwrap();

        let by_severity = store
            .query_alerts(&AlertQuery {
                severity: Some(Severity::Critical),
                ..AlertQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(by_severity.len(), 1);
        assert_eq!(by_severity[0].location, "GateB");

        let unresolved = store
            .query_alerts(&AlertQuery {
                resolved: Some(false),
                ..AlertQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(unresolved.len(), 1);
        assert_eq!(unresolved[0].message, "stage");

        let by_location = store
            .query_alerts(&AlertQuery {
                location: Some("Elsewhere".to_string()),
                ..AlertQuery::default()
            })
            .await
            .unwrap();
        assert!(by_location.is_empty());
    }

    #[tokio::test]
    async fn time_window_filter_applies() {
        let store = store();
        store.save_alert(&alert_at("early", -3600)).await.unwrap();
        store.save_alert(&alert_at("recent", 0)).await.unwrap();

        let recent = store
            .query_alerts(&AlertQuery {
                since: Some(Utc::now() - Duration::seconds(60)),
                ..AlertQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].message, "recent");
    }

    #[tokio::test]
    async fn pagination_walks_the_result_set() {
        let store = store();
        for i in 0..5 {
            store
                .save_alert(&alert_at(&format!("alert {}", i), i))
                .await
                .unwrap();
        }

        let page2 = store
            .query_alerts(&AlertQuery {
                page: 2,
                limit: 2,
                ..AlertQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(page2.len(), 2);
        assert_eq!(page2[0].message, "alert 2");
        assert_eq!(page2[1].message, "alert 1");
    }

    #[tokio::test]
    async fn event_logs_filter_by_type_and_location() {
        let store = store();
        store
            .append_event_log(
                &EventLogEntry::new(EventType::Alert, "alert raised").with_location("MainStage"),
            )
            .await
            .unwrap();
        store
            .append_event_log(&EventLogEntry::new(EventType::System, "monitoring started"))
            .await
            .unwrap();

        let alerts_only = store
            .query_event_logs(&EventLogQuery {
                event_type: Some(EventType::Alert),
                ..EventLogQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(alerts_only.len(), 1);
        assert_eq!(alerts_only[0].location.as_deref(), Some("MainStage"));
    }

    #[tokio::test]
    async fn analytics_history_honors_cutoff_and_limit() {
        let store = store();
        for offset in [-7200_i64, -60, -30, -10] {
            let snapshot = AnalyticsSnapshot {
                timestamp: Utc::now() + Duration::seconds(offset),
                ..AnalyticsSnapshot::default()
            };
            store.append_analytics(&snapshot).await.unwrap();
        }

        let history = store
            .analytics_history(Utc::now() - Duration::seconds(3600), 2)
            .await
            .unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].timestamp >= history[1].timestamp);
    }

    #[tokio::test]
    async fn count_tracks_unresolved_alerts() {
        let store = store();
        assert_eq!(store.count_active_alerts().await.unwrap(), 0);

        let alert = alert_at("active", 0);
        store.save_alert(&alert).await.unwrap();
        assert_eq!(store.count_active_alerts().await.unwrap(), 1);

        store
            .resolve_alert(&alert.id, "system", Utc::now())
            .await
            .unwrap();
        assert_eq!(store.count_active_alerts().await.unwrap(), 0);
    }
}
