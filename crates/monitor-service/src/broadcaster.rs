//! Fan-out of real-time monitoring messages to WebSocket subscribers.
//!
//! Built on [`tokio::sync::broadcast`]: each subscriber gets its own bounded
//! buffer, a slow subscriber only loses its own oldest messages, and publish
//! never blocks the evaluation pipeline.

use crate::engine::StatusSummary;
use common::alerts::Alert;
use serde::{Deserialize, Serialize};
use telemetry::metrics::MONITOR_BROADCAST_MESSAGES;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 256;

/// Per-zone live analytics figures carried on every processed frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalyticsUpdate {
    pub crowd_density: f64,
    pub safety_score: f64,
    pub person_count: u32,
    pub active_alerts: u64,
}

/// Alert flash attached to the frame that triggered it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertFlash {
    pub triggered: bool,
    pub message: String,
}

/// Wire envelope for the real-time channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    /// One processed frame: pass-through image, analytics, and the alert
    /// flash when this frame tripped a new alert.
    VideoFrame {
        #[serde(skip_serializing_if = "Option::is_none")]
        frame: Option<String>,
        analytics: AnalyticsUpdate,
        alert: Option<AlertFlash>,
    },
    /// An operator-created alert.
    ManualAlert { alert: Alert },
    /// Status refresh after a resolve or a monitoring start/stop.
    SystemStatus { status: StatusSummary },
}

impl StreamMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            StreamMessage::VideoFrame { .. } => "video_frame",
            StreamMessage::ManualAlert { .. } => "manual_alert",
            StreamMessage::SystemStatus { .. } => "system_status",
        }
    }
}

/// Cloneable handle to the broadcast channel.
#[derive(Debug, Clone)]
pub struct AlertBroadcaster {
    sender: broadcast::Sender<StreamMessage>,
}

impl AlertBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a message to all current subscribers.
    pub fn publish(&self, message: StreamMessage) {
        MONITOR_BROADCAST_MESSAGES
            .with_label_values(&[message.kind()])
            .inc();
        // A SendError only means there are zero receivers right now.
        let _ = self.sender.send(message);
    }

    /// Create a new subscription. The receiver observes messages published
    /// after this call, in publish order; it never sees history.
    pub fn subscribe(&self) -> broadcast::Receiver<StreamMessage> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for AlertBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
