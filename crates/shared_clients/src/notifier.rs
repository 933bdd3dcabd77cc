use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identifiers {
    pub org_id: String,
    pub app_id: String,
    pub version_id: String,
    pub env_id: String,
}

/// Telemetry pushed to platform users watching an environment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RealtimeEvent {
    pub actor: Option<Value>,
    pub action: String,
    pub object: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub data: Value,
    pub identifiers: Identifiers,
}

/// Fire-and-forget notifications; delivery failures never reach the caller.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn realtime(&self, channel: &str, event: RealtimeEvent);
    /// Tells the environment's API servers to reload their cached configuration.
    async fn api_servers(&self, env_iid: &str, message: Value);
}

/// Writes notifications to the log only.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn realtime(&self, channel: &str, event: RealtimeEvent) {
        info!(channel, action = %event.action, "{}", event.description);
    }

    async fn api_servers(&self, env_iid: &str, message: Value) {
        info!(env = env_iid, "notifying api servers: {}", message);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Realtime { channel: String, event: RealtimeEvent },
    ApiServers { env_iid: String, message: Value },
}

/// Keeps every notification for later inspection.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    seen: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn realtime(&self, channel: &str, event: RealtimeEvent) {
        self.seen.lock().push(Notification::Realtime {
            channel: channel.to_string(),
            event,
        });
    }

    async fn api_servers(&self, env_iid: &str, message: Value) {
        self.seen.lock().push(Notification::ApiServers {
            env_iid: env_iid.to_string(),
            message,
        });
    }
}
