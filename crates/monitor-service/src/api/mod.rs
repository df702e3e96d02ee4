pub mod routes;
pub mod ws;

use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Build the API router
pub fn router(state: AppState) -> Router {
    Router::new()
        // Health and metrics endpoints
        .route("/healthz", get(routes::healthz))
        .route("/readyz", get(routes::readyz))
        .route("/metrics", get(routes::metrics))
        // Analytics sample ingest
        .route("/api/samples", post(routes::ingest_sample))
        // Alerts
        .route(
            "/api/alerts",
            get(routes::list_alerts).post(routes::create_alert),
        )
        .route("/api/alerts/:id/resolve", post(routes::resolve_alert))
        // Event logs
        .route("/api/logs", get(routes::list_logs))
        // Analytics
        .route("/api/analytics", get(routes::current_analytics))
        .route("/api/analytics/history", get(routes::analytics_history))
        // Monitoring session
        .route("/api/status", get(routes::status))
        .route("/api/start-monitoring", post(routes::start_monitoring))
        .route("/api/stop-monitoring", post(routes::stop_monitoring))
        // WebSocket for real-time updates
        .route("/ws", get(ws::ws_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
