//! Crowd-safety monitoring service.
//!
//! Ingests per-zone analytics samples, scores crowd density and clustering,
//! drives one alert state machine per zone, persists alerts and event logs,
//! and fans live updates out to websocket dashboards.

pub mod api;
pub mod broadcaster;
pub mod cluster;
pub mod config;
pub mod density;
pub mod engine;
pub mod error;
pub mod state;
pub mod store;

pub use broadcaster::{AlertBroadcaster, StreamMessage};
pub use config::MonitorConfig;
pub use engine::{AlertEngine, Evaluation, Outcome, StatusSummary};
pub use error::{ApiError, EngineError};
pub use state::AppState;
pub use store::{AlertStore, MemoryAlertStore, PgAlertStore};
