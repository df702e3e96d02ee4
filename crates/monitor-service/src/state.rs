use crate::broadcaster::AlertBroadcaster;
use crate::config::MonitorConfig;
use crate::engine::AlertEngine;
use crate::store::AlertStore;
use std::sync::Arc;

/// Shared application state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub config: MonitorConfig,
    pub store: Arc<dyn AlertStore>,
    pub engine: Arc<AlertEngine>,
    pub broadcaster: AlertBroadcaster,
}

impl AppState {
    pub fn new(
        config: MonitorConfig,
        store: Arc<dyn AlertStore>,
        engine: Arc<AlertEngine>,
        broadcaster: AlertBroadcaster,
    ) -> Self {
        Self {
            config,
            store,
            engine,
            broadcaster,
        }
    }
}
