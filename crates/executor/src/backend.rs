use crate::statement::Statement;
use crate::ExecutorError;
use async_trait::async_trait;
use common::types::{DatabaseType, Field, Model};

/// Whether an operation runs right away or is handed back for batching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Apply {
    Now,
    Deferred,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendSettings {
    pub max_document_index_count: usize,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            max_document_index_count: 64,
        }
    }
}

/// Receives one human readable line per completed step.
pub trait Progress: Send {
    fn step(&mut self, message: String);
}

impl Progress for Vec<String> {
    fn step(&mut self, message: String) {
        self.push(message);
    }
}

/// Schema operations against one tenant database.
///
/// Mutating operations are idempotent: adding something that exists or
/// dropping something that is absent is a no-op. With [`Apply::Deferred`] they
/// return the statement instead of running it, so a caller can run a whole
/// phase with one [`SchemaBackend::execute`]. `Ok(None)` means the operation
/// has nothing to do on this backend.
#[async_trait]
pub trait SchemaBackend: Send {
    fn db_type(&self) -> DatabaseType;
    /// Physical name of the database this backend manages.
    fn database_name(&self) -> &str;

    async fn create_database(&mut self) -> Result<(), ExecutorError>;
    async fn drop_database(&mut self) -> Result<(), ExecutorError>;
    async fn use_database(&mut self, name: &str) -> Result<(), ExecutorError>;
    async fn existing_databases(&mut self) -> Result<Vec<String>, ExecutorError>;
    async fn existing_models(&mut self) -> Result<Vec<String>, ExecutorError>;

    async fn create_model(
        &mut self,
        model: &Model,
        apply: Apply,
    ) -> Result<Option<Statement>, ExecutorError>;
    async fn drop_model(
        &mut self,
        model: &Model,
        apply: Apply,
    ) -> Result<Option<Statement>, ExecutorError>;
    async fn rename_model(
        &mut self,
        old_name: &str,
        model: &Model,
        apply: Apply,
    ) -> Result<Option<Statement>, ExecutorError>;

    async fn create_field(
        &mut self,
        model: &Model,
        field: &Field,
        apply: Apply,
    ) -> Result<Option<Statement>, ExecutorError>;
    async fn drop_field(
        &mut self,
        model: &Model,
        field: &Field,
        apply: Apply,
    ) -> Result<Option<Statement>, ExecutorError>;
    async fn rename_field(
        &mut self,
        model: &Model,
        field: &Field,
        previous: &Field,
        apply: Apply,
    ) -> Result<Option<Statement>, ExecutorError>;
    async fn set_nullability(
        &mut self,
        model: &Model,
        field: &Field,
        apply: Apply,
    ) -> Result<Option<Statement>, ExecutorError>;

    async fn add_index(
        &mut self,
        model: &Model,
        field: &Field,
        apply: Apply,
    ) -> Result<Option<Statement>, ExecutorError>;
    async fn drop_index(
        &mut self,
        model: &Model,
        field: &Field,
        apply: Apply,
    ) -> Result<Option<Statement>, ExecutorError>;
    async fn add_unique_constraint(
        &mut self,
        model: &Model,
        field: &Field,
        apply: Apply,
    ) -> Result<Option<Statement>, ExecutorError>;
    async fn drop_unique_constraint(
        &mut self,
        model: &Model,
        field: &Field,
        apply: Apply,
    ) -> Result<Option<Statement>, ExecutorError>;
    async fn add_full_text_index(
        &mut self,
        model: &Model,
        field: &Field,
        apply: Apply,
    ) -> Result<Option<Statement>, ExecutorError>;
    async fn drop_full_text_index(
        &mut self,
        model: &Model,
        field: &Field,
        apply: Apply,
    ) -> Result<Option<Statement>, ExecutorError>;

    /// Column plus constraint for a reference field; always deferred because
    /// it has to run after every table exists.
    fn create_foreign_key_query(
        &self,
        model: &Model,
        field: &Field,
    ) -> Result<Option<Statement>, ExecutorError>;
    async fn drop_foreign_key(
        &mut self,
        model: &Model,
        field: &Field,
        apply: Apply,
    ) -> Result<Option<Statement>, ExecutorError>;

    /// Runs one phase in order.
    async fn execute(&mut self, batch: Vec<Statement>) -> Result<(), ExecutorError>;

    /// Converges structures derived from the whole model set once all
    /// changes ran. Documents rebuild their indexes here.
    async fn finalize(&mut self, progress: &mut dyn Progress) -> Result<(), ExecutorError>;

    async fn settle(
        &mut self,
        statement: Option<Statement>,
        apply: Apply,
    ) -> Result<Option<Statement>, ExecutorError> {
        match (statement, apply) {
            (None, _) => Ok(None),
            (Some(statement), Apply::Deferred) => Ok(Some(statement)),
            (Some(statement), Apply::Now) => {
                self.execute(vec![statement]).await?;
                Ok(None)
            }
        }
    }
}
