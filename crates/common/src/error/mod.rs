pub mod diagnostics;
pub use crate::config::error::ConfigError;
pub use diagnostics::DiagnosticMessage;

use std::{error::Error as StdError, fmt::Debug};
use thiserror::Error;

/// Top-level failure of the worker process.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("initialisation failed: {context}")]
    Init {
        context: DiagnosticMessage,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },
    #[error("invalid input: {context}")]
    Input {
        context: DiagnosticMessage,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },
    #[error("run failed: {context}")]
    Run {
        context: DiagnosticMessage,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },
}

impl WorkerError {
    #[track_caller]
    pub fn init<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        WorkerError::Init {
            context: DiagnosticMessage::new(err.to_string()),
            source: Some(Box::new(err)),
        }
    }

    #[track_caller]
    pub fn input<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        WorkerError::Input {
            context: DiagnosticMessage::new(err.to_string()),
            source: Some(Box::new(err)),
        }
    }

    #[track_caller]
    pub fn input_msg(message: impl Into<String>) -> Self {
        WorkerError::Input {
            context: DiagnosticMessage::new(message.into()),
            source: None,
        }
    }

    #[track_caller]
    pub fn run<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        WorkerError::Run {
            context: DiagnosticMessage::new(err.to_string()),
            source: Some(Box::new(err)),
        }
    }

    #[track_caller]
    pub fn run_msg(message: impl Into<String>) -> Self {
        WorkerError::Run {
            context: DiagnosticMessage::new(message.into()),
            source: None,
        }
    }
}

/// Renders the `source()` chain of an error, outermost first, one per line.
pub fn source_chain(err: &(dyn StdError + 'static)) -> String {
    let mut lines = Vec::new();
    let mut current = err.source();
    while let Some(cause) = current {
        lines.push(format!("caused by: {cause}"));
        current = cause.source();
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_chain_lists_causes() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "engine-config.yml");
        let err = WorkerError::init(io);
        assert_eq!(source_chain(&err), "caused by: engine-config.yml");
    }

    #[test]
    fn message_only_errors_have_no_chain() {
        let err = WorkerError::run_msg("queue closed");
        assert!(source_chain(&err).is_empty());
        assert!(err.to_string().contains("queue closed"));
    }
}
