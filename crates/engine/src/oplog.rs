//! Timed operation log reported back to the platform after every workflow.

use chrono::{DateTime, Utc};
use executor::Progress;
use shared_clients::callback::{LogEntry, LogStatus};
use tracing::{error, info};

/// Append-only list of workflow steps. Each entry records how long it took
/// since the previous one.
#[derive(Debug, Clone)]
pub struct OpLog {
    entries: Vec<LogEntry>,
    last: DateTime<Utc>,
}

impl Default for OpLog {
    fn default() -> Self {
        Self::new()
    }
}

impl OpLog {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            last: Utc::now(),
        }
    }

    pub fn add(&mut self, message: impl Into<String>) {
        self.push(message.into(), LogStatus::Ok);
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.push(message.into(), LogStatus::Error);
    }

    fn push(&mut self, message: String, status: LogStatus) {
        let now = Utc::now();
        let duration = (now - self.last).num_milliseconds().max(0);
        match status {
            LogStatus::Ok => info!("{message} ({duration}ms)"),
            LogStatus::Error => error!("{message} ({duration}ms)"),
        }
        self.entries.push(LogEntry {
            started_at: now,
            duration,
            status,
            message,
        });
        self.last = now;
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<LogEntry> {
        self.entries
    }
}

impl Progress for OpLog {
    fn step(&mut self, message: String) {
        self.add(message);
    }
}
