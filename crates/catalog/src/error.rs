use common::error::diagnostics::DiagnosticMessage;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("model hierarchy is broken: {context}")]
    MissingParent { context: DiagnosticMessage },
    #[error("model hierarchy contains a cycle: {context}")]
    Cycle { context: DiagnosticMessage },
}

impl CatalogError {
    #[track_caller]
    pub fn missing_parent(message: impl Into<String>) -> Self {
        Self::MissingParent {
            context: DiagnosticMessage::new(message.into()),
        }
    }

    #[track_caller]
    pub fn cycle(message: impl Into<String>) -> Self {
        Self::Cycle {
            context: DiagnosticMessage::new(message.into()),
        }
    }

    pub fn context(&self) -> &DiagnosticMessage {
        match self {
            Self::MissingParent { context } | Self::Cycle { context } => context,
        }
    }
}
