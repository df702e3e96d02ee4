//! Postgres-backed store. Runs its own migrations on connect.

use super::{AlertQuery, AlertStore, EventLogQuery, ResolvedAlert};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::alerts::{Alert, EventLogEntry, EventType, Severity};
use common::analytics::{AnalyticsSnapshot, ZoneSummary};
use common::validation::{validate_alert, validate_event_log};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, Pool, Postgres};
use std::collections::HashMap;

const ALERT_COLUMNS: &str =
    "id, message, severity, location, crowd_density, timestamp, resolved, resolved_by, resolved_at, metadata";
const EVENT_LOG_COLUMNS: &str = "id, timestamp, event_type, description, data, location, user_id";
const ANALYTICS_COLUMNS: &str =
    "timestamp, crowd_density, person_count, safety_score, active_alerts, zones";

pub struct PgAlertStore {
    pool: Pool<Postgres>,
}

impl PgAlertStore {
    /// Connect and bring the schema up to date.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;

        Ok(Self { pool })
    }

    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AlertStore for PgAlertStore {
    async fn save_alert(&self, alert: &Alert) -> Result<()> {
        validate_alert(alert)?;

        sqlx::query(
            r#"
            INSERT INTO alerts (id, message, severity, location, crowd_density, timestamp, resolved, resolved_by, resolved_at, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(&alert.id)
        .bind(&alert.message)
        .bind(alert.severity.to_string())
        .bind(&alert.location)
        .bind(alert.crowd_density)
        .bind(alert.timestamp)
        .bind(alert.resolved)
        .bind(&alert.resolved_by)
        .bind(alert.resolved_at)
        .bind(&alert.metadata)
        .execute(&self.pool)
        .await
        .context("failed to save alert")?;

        Ok(())
    }

    async fn resolve_alert(
        &self,
        id: &str,
        resolved_by: &str,
        resolved_at: DateTime<Utc>,
    ) -> Result<Option<ResolvedAlert>> {
        // Compare-and-set on `resolved`; only one caller can win the update.
        let updated = sqlx::query_as::<_, AlertRow>(&format!(
            r#"
            UPDATE alerts
            SET resolved = TRUE, resolved_by = $2, resolved_at = $3
            WHERE id = $1 AND resolved = FALSE
            RETURNING {ALERT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(resolved_by)
        .bind(resolved_at)
        .fetch_optional(&self.pool)
        .await
        .context("failed to resolve alert")?;

        if let Some(row) = updated {
            return Ok(Some(ResolvedAlert::Updated(row.try_into()?)));
        }

        let existing = sqlx::query_as::<_, AlertRow>(&format!(
            "SELECT {ALERT_COLUMNS} FROM alerts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch alert after resolve")?;

        match existing {
            Some(row) => Ok(Some(ResolvedAlert::AlreadyResolved(row.try_into()?))),
            None => Ok(None),
        }
    }

    async fn append_event_log(&self, entry: &EventLogEntry) -> Result<()> {
        validate_event_log(entry)?;

        sqlx::query(
            r#"
            INSERT INTO event_logs (id, timestamp, event_type, description, data, location, user_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&entry.id)
        .bind(entry.timestamp)
        .bind(entry.event_type.to_string())
        .bind(&entry.description)
        .bind(&entry.data)
        .bind(&entry.location)
        .bind(&entry.user_id)
        .execute(&self.pool)
        .await
        .context("failed to append event log")?;

        Ok(())
    }

    async fn append_analytics(&self, snapshot: &AnalyticsSnapshot) -> Result<()> {
        let zones =
            serde_json::to_value(&snapshot.zones).context("failed to serialize zone summaries")?;

        sqlx::query(
            r#"
            INSERT INTO analytics (timestamp, crowd_density, person_count, safety_score, active_alerts, zones)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(snapshot.timestamp)
        .bind(snapshot.crowd_density)
        .bind(snapshot.person_count as i32)
        .bind(snapshot.safety_score)
        .bind(snapshot.active_alerts as i64)
        .bind(zones)
        .execute(&self.pool)
        .await
        .context("failed to append analytics snapshot")?;

        Ok(())
    }

    async fn query_alerts(&self, query: &AlertQuery) -> Result<Vec<Alert>> {
        // Build dynamic query based on provided filters
        let mut sql = format!("SELECT {ALERT_COLUMNS} FROM alerts");
        let mut conditions = Vec::new();
        let mut param_count = 1;

        if query.severity.is_some() {
            conditions.push(format!("severity = ${}", param_count));
            param_count += 1;
        }
        if query.resolved.is_some() {
            conditions.push(format!("resolved = ${}", param_count));
            param_count += 1;
        }
        if query.location.is_some() {
            conditions.push(format!("location = ${}", param_count));
            param_count += 1;
        }
        if query.since.is_some() {
            conditions.push(format!("timestamp >= ${}", param_count));
            param_count += 1;
        }
        if query.until.is_some() {
            conditions.push(format!("timestamp <= ${}", param_count));
            param_count += 1;
        }

        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(&format!(
            " ORDER BY timestamp DESC LIMIT ${} OFFSET ${}",
            param_count,
            param_count + 1
        ));

        let mut db_query = sqlx::query_as::<_, AlertRow>(&sql);
        if let Some(severity) = query.severity {
            db_query = db_query.bind(severity.to_string());
        }
        if let Some(resolved) = query.resolved {
            db_query = db_query.bind(resolved);
        }
        if let Some(location) = &query.location {
            db_query = db_query.bind(location.clone());
        }
        if let Some(since) = query.since {
            db_query = db_query.bind(since);
        }
        if let Some(until) = query.until {
            db_query = db_query.bind(until);
        }

        let rows = db_query
            .bind(i64::from(query.normalized_limit()))
            .bind(i64::from(query.offset()))
            .fetch_all(&self.pool)
            .await
            .context("failed to query alerts")?;

        rows.into_iter().map(Alert::try_from).collect()
    }

    async fn query_event_logs(&self, query: &EventLogQuery) -> Result<Vec<EventLogEntry>> {
        let mut sql = format!("SELECT {EVENT_LOG_COLUMNS} FROM event_logs");
        let mut conditions = Vec::new();
        let mut param_count = 1;

        if query.event_type.is_some() {
            conditions.push(format!("event_type = ${}", param_count));
            param_count += 1;
        }
        if query.location.is_some() {
            conditions.push(format!("location = ${}", param_count));
            param_count += 1;
        }
        if query.since.is_some() {
            conditions.push(format!("timestamp >= ${}", param_count));
            param_count += 1;
        }
        if query.until.is_some() {
            conditions.push(format!("timestamp <= ${}", param_count));
            param_count += 1;
        }

        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(&format!(
            " ORDER BY timestamp DESC LIMIT ${} OFFSET ${}",
            param_count,
            param_count + 1
        ));

        let mut db_query = sqlx::query_as::<_, EventLogRow>(&sql);
        if let Some(event_type) = query.event_type {
            db_query = db_query.bind(event_type.to_string());
        }
        if let Some(location) = &query.location {
            db_query = db_query.bind(location.clone());
        }
        if let Some(since) = query.since {
            db_query = db_query.bind(since);
        }
        if let Some(until) = query.until {
            db_query = db_query.bind(until);
        }

        let rows = db_query
            .bind(i64::from(query.normalized_limit()))
            .bind(i64::from(query.offset()))
            .fetch_all(&self.pool)
            .await
            .context("failed to query event logs")?;

        rows.into_iter().map(EventLogEntry::try_from).collect()
    }

    async fn analytics_history(
        &self,
        since: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<AnalyticsSnapshot>> {
        let rows = sqlx::query_as::<_, AnalyticsRow>(&format!(
            r#"
            SELECT {ANALYTICS_COLUMNS} FROM analytics
            WHERE timestamp >= $1
            ORDER BY timestamp DESC
            LIMIT $2
            "#
        ))
        .bind(since)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .context("failed to query analytics history")?;

        rows.into_iter().map(AnalyticsSnapshot::try_from).collect()
    }

    async fn count_active_alerts(&self) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM alerts WHERE resolved = FALSE")
                .fetch_one(&self.pool)
                .await
                .context("failed to count active alerts")?;

        Ok(count.max(0) as u64)
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("database health check failed")?;
        Ok(())
    }
}

#[derive(Debug, FromRow)]
struct AlertRow {
    id: String,
    message: String,
    severity: String,
    location: String,
    crowd_density: Option<f64>,
    timestamp: DateTime<Utc>,
    resolved: bool,
    resolved_by: Option<String>,
    resolved_at: Option<DateTime<Utc>>,
    metadata: Option<serde_json::Value>,
}

impl TryFrom<AlertRow> for Alert {
    type Error = anyhow::Error;

    fn try_from(row: AlertRow) -> Result<Self> {
        let severity = row
            .severity
            .parse::<Severity>()
            .map_err(|e| anyhow!(e))
            .context("alert row has invalid severity")?;

        Ok(Alert {
            id: row.id,
            message: row.message,
            severity,
            location: row.location,
            crowd_density: row.crowd_density.unwrap_or(0.0),
            timestamp: row.timestamp,
            resolved: row.resolved,
            resolved_by: row.resolved_by,
            resolved_at: row.resolved_at,
            metadata: row.metadata.unwrap_or_else(|| serde_json::json!({})),
        })
    }
}

#[derive(Debug, FromRow)]
struct EventLogRow {
    id: String,
    timestamp: DateTime<Utc>,
    event_type: String,
    description: String,
    data: Option<serde_json::Value>,
    location: Option<String>,
    user_id: Option<String>,
}

impl TryFrom<EventLogRow> for EventLogEntry {
    type Error = anyhow::Error;

    fn try_from(row: EventLogRow) -> Result<Self> {
        let event_type = row
            .event_type
            .parse::<EventType>()
            .map_err(|e| anyhow!(e))
            .context("event log row has invalid event type")?;

        Ok(EventLogEntry {
            id: row.id,
            timestamp: row.timestamp,
            event_type,
            description: row.description,
            data: row.data,
            location: row.location,
            user_id: row.user_id,
        })
    }
}

#[derive(Debug, FromRow)]
struct AnalyticsRow {
    timestamp: DateTime<Utc>,
    crowd_density: Option<f64>,
    person_count: Option<i32>,
    safety_score: Option<f64>,
    active_alerts: Option<i64>,
    zones: Option<serde_json::Value>,
}

impl TryFrom<AnalyticsRow> for AnalyticsSnapshot {
    type Error = anyhow::Error;

    fn try_from(row: AnalyticsRow) -> Result<Self> {
        let zones: HashMap<String, ZoneSummary> = match row.zones {
            Some(value) => serde_json::from_value(value)
                .context("analytics row has invalid zones payload")?,
            None => HashMap::new(),
        };

        Ok(AnalyticsSnapshot {
            timestamp: row.timestamp,
            crowd_density: row.crowd_density.unwrap_or(0.0),
            person_count: row.person_count.unwrap_or(0).max(0) as u32,
            safety_score: row.safety_score.unwrap_or(100.0),
            active_alerts: row.active_alerts.unwrap_or(0).max(0) as u64,
            zones,
        })
    }
}
