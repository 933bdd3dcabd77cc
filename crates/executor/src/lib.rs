pub mod backend;
pub mod connection;
pub mod document;
pub mod factory;
pub mod reconcile;
pub mod relational;
pub mod statement;

pub use backend::{Apply, BackendSettings, Progress, SchemaBackend};
pub use connection::{connection_id, Connection, ConnectionManager};
pub use factory::create_backend;
pub use statement::{DocumentOp, Statement};

use common::error::diagnostics::DiagnosticMessage;
use common::types::UnknownFieldType;
use shared_clients::DatabaseAdapterError;
use std::error::Error;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("connection failed: {context}")]
    FailedToConnect {
        context: DiagnosticMessage,
        #[source]
        source: Option<Box<dyn Error + Send + Sync>>,
    },
    #[error("execution failed: {context}")]
    FailedToExecute {
        context: DiagnosticMessage,
        #[source]
        source: Option<Box<dyn Error + Send + Sync>>,
    },
    #[error("unexpected error: {context}")]
    UnexpectedError {
        context: DiagnosticMessage,
        #[source]
        source: Option<Box<dyn Error + Send + Sync>>,
    },
    #[error("configuration error: {context}")]
    ConfigError {
        context: DiagnosticMessage,
        #[source]
        source: Option<Box<dyn Error + Send + Sync>>,
    },
    #[error("I/O error: {context}")]
    IoError {
        context: DiagnosticMessage,
        #[source]
        source: std::io::Error,
    },
    #[error("resource not found: {context}")]
    ResourceNotFound { context: DiagnosticMessage },
    #[error("resource already exists: {context}")]
    AlreadyExists { context: DiagnosticMessage },
    #[error("unsupported field type '{kind}': {context}")]
    UnsupportedFieldType {
        kind: String,
        context: DiagnosticMessage,
    },
    #[error("unsupported database: {context}")]
    UnsupportedDatabase { context: DiagnosticMessage },
}

impl ExecutorError {
    #[track_caller]
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            context: DiagnosticMessage::new(message.into()),
            source: None,
        }
    }

    #[track_caller]
    pub fn resource_not_found(message: impl Into<String>) -> Self {
        Self::ResourceNotFound {
            context: DiagnosticMessage::new(message.into()),
        }
    }

    #[track_caller]
    pub fn failed_to_execute(message: impl Into<String>) -> Self {
        Self::FailedToExecute {
            context: DiagnosticMessage::new(message.into()),
            source: None,
        }
    }

    #[track_caller]
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::UnexpectedError {
            context: DiagnosticMessage::new(message.into()),
            source: None,
        }
    }

    #[track_caller]
    pub fn unsupported_database(message: impl Into<String>) -> Self {
        Self::UnsupportedDatabase {
            context: DiagnosticMessage::new(message.into()),
        }
    }

    /// Short class name of the failure, as reported in operation logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::FailedToConnect { .. } => "ConnectionError",
            Self::FailedToExecute { .. } => "ExecutionError",
            Self::UnexpectedError { .. } => "UnexpectedError",
            Self::ConfigError { .. } => "ConfigurationError",
            Self::IoError { .. } => "IoError",
            Self::ResourceNotFound { .. } => "NotFoundError",
            Self::AlreadyExists { .. } => "AlreadyExistsError",
            Self::UnsupportedFieldType { .. } => "UnsupportedFieldType",
            Self::UnsupportedDatabase { .. } => "UnsupportedDatabase",
        }
    }

    pub fn context(&self) -> &DiagnosticMessage {
        match self {
            Self::FailedToConnect { context, .. }
            | Self::FailedToExecute { context, .. }
            | Self::UnexpectedError { context, .. }
            | Self::ConfigError { context, .. }
            | Self::IoError { context, .. }
            | Self::ResourceNotFound { context }
            | Self::AlreadyExists { context }
            | Self::UnsupportedFieldType { context, .. }
            | Self::UnsupportedDatabase { context } => context,
        }
    }
}

impl From<DatabaseAdapterError> for ExecutorError {
    #[track_caller]
    fn from(value: DatabaseAdapterError) -> Self {
        match value {
            DatabaseAdapterError::InvalidConnectionError { context } => {
                ExecutorError::FailedToConnect {
                    context,
                    source: None,
                }
            }
            DatabaseAdapterError::SyntaxError { context } => ExecutorError::FailedToExecute {
                context,
                source: None,
            },
            DatabaseAdapterError::NotFound { context } => {
                ExecutorError::ResourceNotFound { context }
            }
            DatabaseAdapterError::AlreadyExists { context } => {
                ExecutorError::AlreadyExists { context }
            }
            DatabaseAdapterError::UnexpectedError { context } => ExecutorError::UnexpectedError {
                context,
                source: None,
            },
            DatabaseAdapterError::IoError { context, source } => {
                ExecutorError::IoError { context, source }
            }
            DatabaseAdapterError::ConfigError { context } => ExecutorError::ConfigError {
                context,
                source: None,
            },
        }
    }
}

impl From<UnknownFieldType> for ExecutorError {
    #[track_caller]
    fn from(value: UnknownFieldType) -> Self {
        ExecutorError::UnsupportedFieldType {
            context: DiagnosticMessage::new(value.to_string()),
            kind: value.0,
        }
    }
}
