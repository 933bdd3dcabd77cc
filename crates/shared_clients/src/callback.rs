use chrono::{DateTime, SecondsFormat, Utc};
use common::error::diagnostics::DiagnosticMessage;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize, Serializer};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogStatus {
    #[serde(rename = "OK")]
    Ok,
    Error,
}

impl LogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogStatus::Ok => "OK",
            LogStatus::Error => "Error",
        }
    }
}

fn iso_millis<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// One timed entry of a workflow's operation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    #[serde(serialize_with = "iso_millis")]
    pub started_at: DateTime<Utc>,
    /// Milliseconds since the previous entry.
    pub duration: i64,
    pub status: LogStatus,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackPayload {
    pub status: LogStatus,
    pub logs: Vec<LogEntry>,
    #[serde(rename = "type")]
    pub kind: String,
}

impl CallbackPayload {
    pub fn db(status: LogStatus, logs: Vec<LogEntry>) -> Self {
        Self {
            status,
            logs,
            kind: "db".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("callback endpoint unreachable: {context}")]
    FailedToConnect { context: DiagnosticMessage },
    #[error("callback rejected: {context}")]
    Rejected { context: DiagnosticMessage },
    #[error("unexpected callback error: {context}")]
    UnexpectedError { context: DiagnosticMessage },
}

impl CallbackError {
    #[track_caller]
    pub fn failed_to_connect(message: impl Into<String>) -> Self {
        Self::FailedToConnect {
            context: DiagnosticMessage::new(message.into()),
        }
    }

    #[track_caller]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            context: DiagnosticMessage::new(message.into()),
        }
    }

    #[track_caller]
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::UnexpectedError {
            context: DiagnosticMessage::new(message.into()),
        }
    }
}

impl From<reqwest::Error> for CallbackError {
    #[track_caller]
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            CallbackError::failed_to_connect(err.to_string())
        } else if let Some(status) = err.status() {
            CallbackError::rejected(format!("status code {status}"))
        } else {
            CallbackError::unexpected(format!("Unexpected error sending callback: {err}"))
        }
    }
}

/// Delivers workflow logs to the platform.
#[async_trait::async_trait]
pub trait CallbackSink: Send + Sync {
    async fn send(&self, url: &str, payload: &CallbackPayload) -> Result<(), CallbackError>;
}

#[derive(Debug, Clone)]
pub struct CallbackClient {
    client: Client,
    token: String,
}

impl CallbackClient {
    pub fn new(token: impl Into<String>, timeout: Duration) -> Result<Self, CallbackError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            token: token.into(),
        })
    }
}

#[async_trait::async_trait]
impl CallbackSink for CallbackClient {
    async fn send(&self, url: &str, payload: &CallbackPayload) -> Result<(), CallbackError> {
        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .json(payload)
            .send()
            .await?;

        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(CallbackError::rejected(
                format!("callback refused the master token ({})", resp.status()),
            )),
            s => Err(CallbackError::rejected(format!(
                "callback {url} answered {s}"
            ))),
        }
    }
}

/// Sink that keeps every payload in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingCallbacks {
    sent: std::sync::Arc<parking_lot::Mutex<Vec<(String, CallbackPayload)>>>,
}

impl RecordingCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(String, CallbackPayload)> {
        self.sent.lock().clone()
    }
}

#[async_trait::async_trait]
impl CallbackSink for RecordingCallbacks {
    async fn send(&self, url: &str, payload: &CallbackPayload) -> Result<(), CallbackError> {
        self.sent.lock().push((url.to_string(), payload.clone()));
        Ok(())
    }
}
