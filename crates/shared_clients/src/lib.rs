pub mod cache;
pub mod callback;
pub mod connector;
pub mod document;
pub mod notifier;
pub mod postgres;
pub mod queue;
pub mod recording;

use async_trait::async_trait;
use common::error::diagnostics::DiagnosticMessage;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatabaseAdapterError {
    #[error("invalid connection details: {context}")]
    InvalidConnectionError { context: DiagnosticMessage },
    #[error("syntax error: {context}")]
    SyntaxError { context: DiagnosticMessage },
    #[error("object not found: {context}")]
    NotFound { context: DiagnosticMessage },
    #[error("object already exists: {context}")]
    AlreadyExists { context: DiagnosticMessage },
    #[error("unexpected error: {context}")]
    UnexpectedError { context: DiagnosticMessage },
    #[error("I/O error: {context}")]
    IoError {
        context: DiagnosticMessage,
        #[source]
        source: std::io::Error,
    },
    #[error("configuration error: {context}")]
    ConfigError { context: DiagnosticMessage },
}

impl DatabaseAdapterError {
    #[track_caller]
    pub fn invalid_connection(message: impl Into<String>) -> Self {
        Self::InvalidConnectionError {
            context: DiagnosticMessage::new(message.into()),
        }
    }

    #[track_caller]
    pub fn syntax(message: impl Into<String>) -> Self {
        Self::SyntaxError {
            context: DiagnosticMessage::new(message.into()),
        }
    }

    #[track_caller]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            context: DiagnosticMessage::new(message.into()),
        }
    }

    #[track_caller]
    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::AlreadyExists {
            context: DiagnosticMessage::new(message.into()),
        }
    }

    #[track_caller]
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::UnexpectedError {
            context: DiagnosticMessage::new(message.into()),
        }
    }

    #[track_caller]
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            context: DiagnosticMessage::new(message.into()),
        }
    }

    pub fn context(&self) -> &DiagnosticMessage {
        match self {
            Self::InvalidConnectionError { context }
            | Self::SyntaxError { context }
            | Self::NotFound { context }
            | Self::AlreadyExists { context }
            | Self::UnexpectedError { context }
            | Self::IoError { context, .. }
            | Self::ConfigError { context } => context,
        }
    }
}

impl From<std::io::Error> for DatabaseAdapterError {
    #[track_caller]
    fn from(err: std::io::Error) -> Self {
        DatabaseAdapterError::IoError {
            context: DiagnosticMessage::new(err.to_string()),
            source: err,
        }
    }
}

/// A live connection to a relational server.
///
/// Statements arrive as one script per phase; adapters must accept several
/// `;`-separated statements in a single `execute` call.
#[async_trait]
pub trait AsyncDatabaseAdapter: Send + Sync {
    async fn execute(&mut self, sql: &str) -> Result<(), DatabaseAdapterError>;
    /// Returns the first column of every row rendered as text.
    async fn query_column(&self, sql: &str) -> Result<Vec<String>, DatabaseAdapterError>;
    async fn close(&mut self) -> Result<(), DatabaseAdapterError>;
}

pub type AsyncDbAdapter = Box<dyn AsyncDatabaseAdapter>;

