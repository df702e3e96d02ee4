use crate::engine::{Evaluation, StatusSummary};
use crate::error::ApiError;
use crate::state::AppState;
use crate::store::{AlertQuery, EventLogQuery, MAX_QUERY_LIMIT};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Duration, Utc};
use common::alerts::{Alert, EventType, Severity};
use common::analytics::{AnalyticsSample, AnalyticsSnapshot};
use serde::Deserialize;
use serde_json::json;

/// Health check endpoint
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "monitor-service"
        })),
    )
}

/// Readiness check endpoint; not ready when the store is unreachable
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.health_check().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ready" }))),
        Err(e) => {
            tracing::error!("Readiness check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "not ready" })),
            )
        }
    }
}

/// Metrics endpoint (Prometheus format)
pub async fn metrics() -> impl IntoResponse {
    match telemetry::metrics::encode_metrics() {
        Ok(body) => body.into_response(),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to encode metrics",
            )
                .into_response()
        }
    }
}

/// Feed one analytics sample through the alert engine
pub async fn ingest_sample(
    State(state): State<AppState>,
    Json(sample): Json<AnalyticsSample>,
) -> Result<Json<Evaluation>, ApiError> {
    if !state.engine.monitoring_active() {
        return Err(ApiError::conflict("monitoring is not active"));
    }
    let evaluation = state.engine.evaluate_sample(&sample).await?;
    Ok(Json(evaluation))
}

#[derive(Debug, Deserialize)]
pub struct AlertListParams {
    severity: Option<String>,
    resolved: Option<bool>,
    location: Option<String>,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
    page: Option<u32>,
    limit: Option<u32>,
}

pub async fn list_alerts(
    State(state): State<AppState>,
    Query(params): Query<AlertListParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let severity = match params.severity.as_deref() {
        Some(raw) => Some(raw.parse::<Severity>().map_err(ApiError::bad_request)?),
        None => None,
    };

    let defaults = AlertQuery::default();
    let query = AlertQuery {
        severity,
        resolved: params.resolved,
        location: params.location,
        since: params.since,
        until: params.until,
        page: params.page.unwrap_or(defaults.page),
        limit: params.limit.unwrap_or(defaults.limit),
    };

    let alerts = state
        .store
        .query_alerts(&query)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to list alerts: {}", e)))?;

    Ok(Json(json!({ "alerts": alerts })))
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateAlertRequest {
    message: Option<String>,
    severity: Option<String>,
    location: Option<String>,
    metadata: Option<serde_json::Value>,
}

/// Raise a manual alert. Absent fields fall back to a generic message,
/// medium severity and an unknown location.
pub async fn create_alert(
    State(state): State<AppState>,
    body: Option<Json<CreateAlertRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let request = body.map(|Json(request)| request).unwrap_or_default();

    let severity = match request.severity.as_deref() {
        Some(raw) => raw.parse::<Severity>().map_err(ApiError::bad_request)?,
        None => Severity::Medium,
    };
    let message = request
        .message
        .unwrap_or_else(|| "Manual alert".to_string());
    let location = request.location.unwrap_or_else(|| "Unknown".to_string());

    let alert = state
        .engine
        .manual_alert(message, severity, location, request.metadata)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "status": "success", "alert_id": alert.id })),
    ))
}

#[derive(Debug, Default, Deserialize)]
pub struct ResolveAlertRequest {
    resolved_by: Option<String>,
}

pub async fn resolve_alert(
    State(state): State<AppState>,
    Path(alert_id): Path<String>,
    body: Option<Json<ResolveAlertRequest>>,
) -> Result<Json<Alert>, ApiError> {
    let resolved_by = body
        .and_then(|Json(request)| request.resolved_by)
        .unwrap_or_else(|| "operator".to_string());

    let alert = state
        .engine
        .resolve_alert(&alert_id, &resolved_by)
        .await?
        .ok_or_else(|| ApiError::not_found("alert not found"))?;

    Ok(Json(alert))
}

#[derive(Debug, Deserialize)]
pub struct EventLogListParams {
    event_type: Option<String>,
    location: Option<String>,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
    page: Option<u32>,
    limit: Option<u32>,
}

pub async fn list_logs(
    State(state): State<AppState>,
    Query(params): Query<EventLogListParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let event_type = match params.event_type.as_deref() {
        Some(raw) => Some(raw.parse::<EventType>().map_err(ApiError::bad_request)?),
        None => None,
    };

    let defaults = EventLogQuery::default();
    let query = EventLogQuery {
        event_type,
        location: params.location,
        since: params.since,
        until: params.until,
        page: params.page.unwrap_or(defaults.page),
        limit: params.limit.unwrap_or(defaults.limit),
    };

    let logs = state
        .store
        .query_event_logs(&query)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to list event logs: {}", e)))?;

    Ok(Json(json!({ "logs": logs })))
}

/// Live venue-wide analytics rollup
pub async fn current_analytics(State(state): State<AppState>) -> Json<AnalyticsSnapshot> {
    Json(state.engine.current_analytics().await)
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    hours: Option<i64>,
    limit: Option<u32>,
}

pub async fn analytics_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let hours = params.hours.unwrap_or(24).clamp(1, 24 * 30);
    let limit = params.limit.unwrap_or(MAX_QUERY_LIMIT).min(MAX_QUERY_LIMIT);
    let since = Utc::now() - Duration::hours(hours);

    let history = state
        .store
        .analytics_history(since, limit)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to load analytics history: {}", e)))?;

    Ok(Json(json!({ "history": history })))
}

pub async fn status(State(state): State<AppState>) -> Json<StatusSummary> {
    Json(state.engine.status().await)
}

pub async fn start_monitoring(State(state): State<AppState>) -> Json<serde_json::Value> {
    if state.engine.start_monitoring().await {
        Json(json!({ "status": "started" }))
    } else {
        Json(json!({ "status": "already_running" }))
    }
}

pub async fn stop_monitoring(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.engine.stop_monitoring().await;
    Json(json!({ "status": "stopped" }))
}
