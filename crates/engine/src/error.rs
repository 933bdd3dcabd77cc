use catalog::CatalogError;
use common::error::diagnostics::DiagnosticMessage;
use common::error::source_chain;
use executor::ExecutorError;
use shared_clients::cache::CacheError;
use shared_clients::DatabaseAdapterError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("schema operation failed: {context}")]
    Executor {
        context: DiagnosticMessage,
        #[source]
        source: ExecutorError,
    },
    #[error("model processing failed: {context}")]
    Catalog {
        context: DiagnosticMessage,
        #[source]
        source: CatalogError,
    },
    #[error("cache operation failed: {context}")]
    Cache {
        context: DiagnosticMessage,
        #[source]
        source: CacheError,
    },
    #[error("environment store failed: {context}")]
    Store {
        context: DiagnosticMessage,
        #[source]
        source: DatabaseAdapterError,
    },
    #[error("malformed document: {context}")]
    Serialization {
        context: DiagnosticMessage,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid job: {context}")]
    InvalidJob { context: DiagnosticMessage },
    #[error("missing resource: {context}")]
    MissingResource { context: DiagnosticMessage },
}

impl EngineError {
    #[track_caller]
    pub fn invalid_job(message: impl Into<String>) -> Self {
        Self::InvalidJob {
            context: DiagnosticMessage::new(message.into()),
        }
    }

    #[track_caller]
    pub fn missing_resource(message: impl Into<String>) -> Self {
        Self::MissingResource {
            context: DiagnosticMessage::new(message.into()),
        }
    }

    pub fn context(&self) -> &DiagnosticMessage {
        match self {
            Self::Executor { context, .. }
            | Self::Catalog { context, .. }
            | Self::Cache { context, .. }
            | Self::Store { context, .. }
            | Self::Serialization { context, .. }
            | Self::InvalidJob { context }
            | Self::MissingResource { context } => context,
        }
    }

    /// Error class reported in the failure entry of an operation log.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Executor { source, .. } => source.name(),
            Self::Catalog { source, .. } => match source {
                CatalogError::MissingParent { .. } => "MissingParentError",
                CatalogError::Cycle { .. } => "ModelCycleError",
            },
            Self::Cache { .. } => "CacheError",
            Self::Store { .. } => "StoreError",
            Self::Serialization { .. } => "SerializationError",
            Self::InvalidJob { .. } => "InvalidJobError",
            Self::MissingResource { .. } => "ResourceNotFoundError",
        }
    }

    pub fn message(&self) -> &str {
        self.context().message()
    }

    /// Raising call-site followed by every underlying cause.
    pub fn stack(&self) -> String {
        let origin = format!("at {}", self.context().origin());
        let chain = source_chain(self);
        if chain.is_empty() {
            origin
        } else {
            format!("{origin}\n{chain}")
        }
    }
}

impl From<ExecutorError> for EngineError {
    #[track_caller]
    fn from(err: ExecutorError) -> Self {
        Self::Executor {
            context: DiagnosticMessage::new(err.context().message().to_string()),
            source: err,
        }
    }
}

impl From<CatalogError> for EngineError {
    #[track_caller]
    fn from(err: CatalogError) -> Self {
        Self::Catalog {
            context: DiagnosticMessage::new(err.context().message().to_string()),
            source: err,
        }
    }
}

impl From<CacheError> for EngineError {
    #[track_caller]
    fn from(err: CacheError) -> Self {
        Self::Cache {
            context: DiagnosticMessage::new(err.to_string()),
            source: err,
        }
    }
}

impl From<DatabaseAdapterError> for EngineError {
    #[track_caller]
    fn from(err: DatabaseAdapterError) -> Self {
        Self::Store {
            context: DiagnosticMessage::new(err.context().message().to_string()),
            source: err,
        }
    }
}

impl From<serde_json::Error> for EngineError {
    #[track_caller]
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            context: DiagnosticMessage::new(err.to_string()),
            source: err,
        }
    }
}
