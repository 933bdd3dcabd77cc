use crate::document::{DocumentStore, MemoryDocumentStore};
use crate::postgres::PostgresAdapter;
use crate::recording::{RecordingAdapter, StatementLog};
use crate::{AsyncDbAdapter, DatabaseAdapterError};
use async_trait::async_trait;
use common::types::{DatabaseType, ResourceAccess};
use std::sync::Arc;

/// Opens connections to the servers behind a resource.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect_sql(
        &self,
        db_type: DatabaseType,
        access: &ResourceAccess,
    ) -> Result<AsyncDbAdapter, DatabaseAdapterError>;

    async fn connect_document(
        &self,
        access: &ResourceAccess,
    ) -> Result<Arc<dyn DocumentStore>, DatabaseAdapterError>;
}

/// Connects to real servers. Only PostgreSQL has a driver in this build.
#[derive(Debug, Clone, Default)]
pub struct NativeConnector;

#[async_trait]
impl Connector for NativeConnector {
    async fn connect_sql(
        &self,
        db_type: DatabaseType,
        access: &ResourceAccess,
    ) -> Result<AsyncDbAdapter, DatabaseAdapterError> {
        match db_type {
            DatabaseType::PostgreSQL => Ok(Box::new(PostgresAdapter::from_access(access).await?)),
            other => Err(DatabaseAdapterError::config(format!(
                "no native driver available for {other}"
            ))),
        }
    }

    async fn connect_document(
        &self,
        _access: &ResourceAccess,
    ) -> Result<Arc<dyn DocumentStore>, DatabaseAdapterError> {
        Err(DatabaseAdapterError::config(
            "no native driver available for MongoDB",
        ))
    }
}

/// Hands out recording SQL adapters and one shared in-memory document store.
#[derive(Clone, Default)]
pub struct DryRunConnector {
    log: StatementLog,
    documents: MemoryDocumentStore,
    failure: Option<String>,
}

impl DryRunConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every SQL adapter created afterwards rejects scripts containing `needle`.
    pub fn failing_on(mut self, needle: impl Into<String>) -> Self {
        self.failure = Some(needle.into());
        self
    }

    pub fn statements(&self) -> &StatementLog {
        &self.log
    }

    pub fn documents(&self) -> &MemoryDocumentStore {
        &self.documents
    }
}

#[async_trait]
impl Connector for DryRunConnector {
    async fn connect_sql(
        &self,
        db_type: DatabaseType,
        access: &ResourceAccess,
    ) -> Result<AsyncDbAdapter, DatabaseAdapterError> {
        if !db_type.is_relational() {
            return Err(DatabaseAdapterError::config(format!(
                "{db_type} is not a relational database"
            )));
        }
        tracing::debug!(
            host = %access.host,
            database = access.database.as_deref().unwrap_or_default(),
            "dry-run connection for {db_type}"
        );
        let mut adapter = RecordingAdapter::new(self.log.clone());
        if let Some(needle) = &self.failure {
            adapter = adapter.failing_on(needle.clone());
        }
        Ok(Box::new(adapter))
    }

    async fn connect_document(
        &self,
        _access: &ResourceAccess,
    ) -> Result<Arc<dyn DocumentStore>, DatabaseAdapterError> {
        Ok(Arc::new(self.documents.clone()))
    }
}
