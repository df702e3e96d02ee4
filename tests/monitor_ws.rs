/// Integration tests for the monitor-service websocket stream
use anyhow::Result;
use chrono::{DateTime, Duration, TimeZone, Utc};
use common::alerts::Severity;
use common::analytics::AnalyticsSample;
use futures::StreamExt;
use monitor_service::api;
use monitor_service::broadcaster::AlertBroadcaster;
use monitor_service::config::MonitorConfig;
use monitor_service::engine::AlertEngine;
use monitor_service::state::AppState;
use monitor_service::store::MemoryAlertStore;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_server() -> Result<(SocketAddr, Arc<AlertEngine>)> {
    let config = MonitorConfig::default();
    let store = Arc::new(MemoryAlertStore::new());
    let broadcaster = AlertBroadcaster::new(config.broadcast_capacity);
    let engine = Arc::new(AlertEngine::new(
        config.clone(),
        store.clone(),
        broadcaster.clone(),
    ));
    let state = AppState::new(config, store, engine.clone(), broadcaster);
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    Ok((addr, engine))
}

async fn connect_ws(addr: SocketAddr) -> Result<WsStream> {
    let (ws, _) = connect_async(format!("ws://{addr}/ws")).await?;
    Ok(ws)
}

async fn next_json(ws: &mut WsStream) -> Value {
    loop {
        let message = tokio::time::timeout(std::time::Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for websocket message")
            .expect("websocket closed unexpectedly")
            .expect("websocket read failed");
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).expect("websocket payload is valid json");
        }
    }
}

fn at(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap() + Duration::seconds(secs)
}

fn sample(zone: &str, person_count: u32, secs: i64) -> AnalyticsSample {
    AnalyticsSample::new(zone, person_count).with_timestamp(at(secs))
}

#[tokio::test]
async fn test_client_receives_status_snapshot_then_live_updates() -> Result<()> {
    let (addr, engine) = spawn_server().await?;
    engine.start_monitoring().await;

    let mut ws = connect_ws(addr).await?;

    // The first frame is always a status snapshot.
    let snapshot = next_json(&mut ws).await;
    assert_eq!(snapshot["type"], "system_status");
    assert_eq!(snapshot["status"]["monitoring_active"], true);

    // The open socket shows up in the connection count.
    let client = reqwest::Client::new();
    let status: Value = client
        .get(format!("http://{addr}/api/status"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(status["connections"], 1);

    // A triggering sample produces a frame with an alert flash.
    engine.evaluate_sample(&sample("MainStage", 85, 0)).await?;
    let frame = next_json(&mut ws).await;
    assert_eq!(frame["type"], "video_frame");
    assert!(frame.get("frame").is_none());
    assert_eq!(frame["analytics"]["crowd_density"], 0.85);
    assert_eq!(frame["analytics"]["active_alerts"], 1);
    assert_eq!(frame["alert"]["triggered"], true);

    // A suppressed follow-up still streams analytics, without a flash.
    engine.evaluate_sample(&sample("MainStage", 90, 5)).await?;
    let frame = next_json(&mut ws).await;
    assert_eq!(frame["type"], "video_frame");
    assert!(frame["alert"].is_null());

    ws.close(None).await.ok();
    Ok(())
}

#[tokio::test]
async fn test_manual_alert_is_broadcast_to_clients() -> Result<()> {
    let (addr, engine) = spawn_server().await?;

    let mut ws = connect_ws(addr).await?;
    let snapshot = next_json(&mut ws).await;
    assert_eq!(snapshot["type"], "system_status");

    engine
        .manual_alert(
            "Fire reported".to_string(),
            Severity::Critical,
            "GateB".to_string(),
            None,
        )
        .await?;

    let message = next_json(&mut ws).await;
    assert_eq!(message["type"], "manual_alert");
    assert_eq!(message["alert"]["message"], "Fire reported");
    assert_eq!(message["alert"]["severity"], "critical");
    assert_eq!(message["alert"]["location"], "GateB");

    ws.close(None).await.ok();
    Ok(())
}

#[tokio::test]
async fn test_late_joiner_gets_no_replayed_history() -> Result<()> {
    let (addr, engine) = spawn_server().await?;
    engine.start_monitoring().await;

    // Updates published before the client connects are gone for good.
    engine.evaluate_sample(&sample("MainStage", 85, 0)).await?;
    engine.evaluate_sample(&sample("MainStage", 90, 5)).await?;

    let mut ws = connect_ws(addr).await?;
    let snapshot = next_json(&mut ws).await;
    assert_eq!(snapshot["type"], "system_status");
    assert_eq!(snapshot["status"]["active_alerts"], 1);

    engine.evaluate_sample(&sample("GateA", 77, 10)).await?;
    let frame = next_json(&mut ws).await;
    assert_eq!(frame["type"], "video_frame");
    assert_eq!(frame["analytics"]["person_count"], 77);

    ws.close(None).await.ok();
    Ok(())
}
