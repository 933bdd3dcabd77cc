use crate::{AsyncDatabaseAdapter, DatabaseAdapterError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Statements captured by every adapter created from the same log.
#[derive(Clone, Default)]
pub struct StatementLog {
    inner: Arc<Mutex<Vec<String>>>,
}

impl StatementLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, sql: impl Into<String>) {
        self.inner.lock().push(sql.into());
    }

    pub fn statements(&self) -> Vec<String> {
        self.inner.lock().clone()
    }

    pub fn joined(&self) -> String {
        self.inner.lock().join("\n")
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

/// Adapter that executes nothing and records every script it receives.
///
/// Queries are answered from canned results keyed by the exact SQL text,
/// empty when nothing was registered.
pub struct RecordingAdapter {
    log: StatementLog,
    answers: HashMap<String, Vec<String>>,
    failure: Option<String>,
    closed: bool,
}

impl RecordingAdapter {
    pub fn new(log: StatementLog) -> Self {
        Self {
            log,
            answers: HashMap::new(),
            failure: None,
            closed: false,
        }
    }

    pub fn with_answer(mut self, sql: impl Into<String>, rows: Vec<String>) -> Self {
        self.answers.insert(sql.into(), rows);
        self
    }

    /// Fails every `execute` whose script contains `needle`.
    pub fn failing_on(mut self, needle: impl Into<String>) -> Self {
        self.failure = Some(needle.into());
        self
    }
}

#[async_trait]
impl AsyncDatabaseAdapter for RecordingAdapter {
    async fn execute(&mut self, sql: &str) -> Result<(), DatabaseAdapterError> {
        if self.closed {
            return Err(DatabaseAdapterError::invalid_connection("connection is closed"));
        }
        if let Some(needle) = &self.failure {
            if sql.contains(needle.as_str()) {
                return Err(DatabaseAdapterError::unexpected(format!(
                    "statement rejected: {needle}"
                )));
            }
        }
        self.log.push(sql);
        Ok(())
    }

    async fn query_column(&self, sql: &str) -> Result<Vec<String>, DatabaseAdapterError> {
        Ok(self.answers.get(sql).cloned().unwrap_or_default())
    }

    async fn close(&mut self) -> Result<(), DatabaseAdapterError> {
        self.closed = true;
        Ok(())
    }
}
