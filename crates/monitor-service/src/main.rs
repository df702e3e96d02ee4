use anyhow::{Context, Result};
use monitor_service::api;
use monitor_service::broadcaster::AlertBroadcaster;
use monitor_service::config::MonitorConfig;
use monitor_service::engine::AlertEngine;
use monitor_service::state::AppState;
use monitor_service::store::{AlertStore, MemoryAlertStore, PgAlertStore};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize telemetry (logging and metrics). The guard flushes file
    // logs on shutdown when LOG_TO_FILE is set.
    let _guard = telemetry::init_with_service("monitor-service");

    info!("Starting monitor-service");

    let config = MonitorConfig::from_env()?;
    info!(
        "Monitor configuration: bind={}, density_threshold={}, cooldown={}s",
        config.bind_addr, config.density_threshold, config.alert_cooldown_secs
    );

    let store: Arc<dyn AlertStore> = match &config.database_url {
        Some(url) => {
            let store = PgAlertStore::connect(url)
                .await
                .context("Failed to initialize Postgres store")?;
            info!("Connected to database");
            Arc::new(store)
        }
        None => {
            warn!("DATABASE_URL not set, alerts will not survive restarts");
            Arc::new(MemoryAlertStore::new())
        }
    };

    let broadcaster = AlertBroadcaster::new(config.broadcast_capacity);
    let engine = Arc::new(AlertEngine::new(
        config.clone(),
        store.clone(),
        broadcaster.clone(),
    ));
    engine
        .hydrate()
        .await
        .context("Failed to hydrate alert engine")?;

    let shutdown = CancellationToken::new();
    let snapshot_task = engine.clone().start_snapshot_loop(shutdown.clone());

    let state = AppState::new(config.clone(), store, engine, broadcaster);
    let app = api::router(state);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .context("Failed to bind to address")?;
    info!("Monitor service listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    shutdown.cancel();
    snapshot_task.await.ok();
    info!("Monitor service stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }

    info!("Shutting down gracefully...");
}
