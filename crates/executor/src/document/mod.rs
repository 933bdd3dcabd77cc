//! Schema backend for document databases.
//!
//! Documents carry no DDL: top-level models map to collections, fields only
//! matter when they are renamed or removed, and every index flag funnels into
//! one index synchronisation per collection.

mod indices;

use crate::backend::{Apply, BackendSettings, Progress, SchemaBackend};
use crate::connection::{Connection, ConnectionManager};
use crate::statement::{DocumentOp, Statement};
use crate::ExecutorError;
use async_trait::async_trait;
use catalog::paths::storage_name;
use common::types::{DatabaseConfig, DatabaseType, Field, Model, ModelType, ResourceAccess};
use shared_clients::document::DocumentStore;
use shared_clients::DatabaseAdapterError;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use indices::{is_primary, is_required, required_indexes};

pub struct DocumentBackend {
    config: DatabaseConfig,
    connections: Arc<ConnectionManager>,
    resource_id: String,
    access: ResourceAccess,
    db_name: String,
    settings: BackendSettings,
}

impl DocumentBackend {
    pub fn new(
        env_iid: &str,
        config: DatabaseConfig,
        resource_id: String,
        access: ResourceAccess,
        connections: Arc<ConnectionManager>,
        settings: BackendSettings,
    ) -> Self {
        let db_name = config.applied_name(env_iid);
        Self {
            config,
            connections,
            resource_id,
            access,
            db_name,
            settings,
        }
    }

    async fn store(&self) -> Result<Arc<dyn DocumentStore>, ExecutorError> {
        let conn = self
            .connections
            .get_conn(&self.resource_id, DatabaseType::MongoDB, &self.access, false)
            .await?;
        match conn {
            Connection::Document(store) => Ok(store),
            Connection::Sql(_) => Err(ExecutorError::unexpected(format!(
                "resource '{}' is not a document database",
                self.resource_id
            ))),
        }
    }

    fn collection_of(&self, model: &Model) -> String {
        storage_name(&self.config.models, model).to_string()
    }

    fn top_level(&self, collection: &str) -> Option<&Model> {
        self.config
            .models
            .iter()
            .find(|m| m.is_top_level() && m.name == collection)
    }

    async fn sync_indexes(
        &self,
        store: &dyn DocumentStore,
        collection: &str,
    ) -> Result<bool, ExecutorError> {
        let Some(model) = self.top_level(collection) else {
            return Ok(false);
        };
        let required = required_indexes(
            &self.config.models,
            model,
            self.settings.max_document_index_count,
        )?;

        for existing in store.list_indexes(&self.db_name, collection).await? {
            if is_primary(&existing) || is_required(&existing, &required) {
                continue;
            }
            let name = existing.resolved_name();
            debug!(collection, index = %name, "dropping obsolete index");
            store.drop_index(&self.db_name, collection, &name).await?;
        }
        if !required.is_empty() {
            store
                .create_indexes(&self.db_name, collection, &required)
                .await?;
        }
        Ok(true)
    }

    async fn apply(
        &self,
        store: &dyn DocumentStore,
        op: &DocumentOp,
    ) -> Result<(), ExecutorError> {
        let db = self.db_name.as_str();
        match op {
            DocumentOp::CreateCollection { name } => {
                match store.create_collection(db, name).await {
                    Err(DatabaseAdapterError::AlreadyExists { .. }) => Ok(()),
                    other => Ok(other?),
                }
            }
            DocumentOp::DropCollection { name } => match store.drop_collection(db, name).await {
                Err(DatabaseAdapterError::NotFound { .. }) => Ok(()),
                other => Ok(other?),
            },
            DocumentOp::RenameCollection { from, to } => {
                let existing = store.list_collections(db).await?;
                if existing.iter().any(|c| c == to) || !existing.iter().any(|c| c == from) {
                    return Ok(());
                }
                Ok(store.rename_collection(db, from, to).await?)
            }
            DocumentOp::RenameField {
                collection,
                path,
                new_name,
            } => {
                let touched = store.rename_field(db, collection, path, new_name).await?;
                debug!(collection, path, new_name, touched, "renamed field");
                Ok(())
            }
            DocumentOp::UnsetField { collection, path } => {
                let touched = store.unset_field(db, collection, path).await?;
                debug!(collection, path, touched, "removed field");
                Ok(())
            }
            DocumentOp::SyncIndexes { collection } => {
                self.sync_indexes(store, collection).await?;
                Ok(())
            }
        }
    }

    fn sync_for(&self, model: &Model) -> Option<Statement> {
        Some(Statement::Document(DocumentOp::SyncIndexes {
            collection: self.collection_of(model),
        }))
    }
}

/// Dotted path holding the field's old name.
///
/// Nested renames run parents first, so the ancestor segments already carry
/// their new names and only the last segment is the old one.
pub(crate) fn rename_path(field: &Field, previous: &Field) -> String {
    if field.query_path().split('.').count() > 1 {
        let mut segments: Vec<&str> = field.unwind_query_path().split('.').collect();
        if let Some(last) = segments.last_mut() {
            *last = previous.name.as_str();
        }
        segments.join(".")
    } else {
        previous.unwind_query_path().to_string()
    }
}

/// Path of a field of `model` in the model's current shape.
///
/// Deleted fields carry paths from the previous configuration, which are
/// stale once an ancestor was renamed.
pub(crate) fn current_path(model: &Model, field_name: &str) -> String {
    let mut path = String::new();
    for entry in model.parent_hierarchy.iter().skip(1) {
        path.push_str(&entry.name);
        path.push('.');
        if entry.model_type == ModelType::SubModelList {
            path.push_str("$[].");
        }
    }
    path.push_str(field_name);
    path
}

#[async_trait]
impl SchemaBackend for DocumentBackend {
    fn db_type(&self) -> DatabaseType {
        DatabaseType::MongoDB
    }

    fn database_name(&self) -> &str {
        &self.db_name
    }

    async fn create_database(&mut self) -> Result<(), ExecutorError> {
        // document databases come into existence with their first collection
        let name = self.db_name.clone();
        self.use_database(&name).await
    }

    async fn drop_database(&mut self) -> Result<(), ExecutorError> {
        let store = self.store().await?;
        store.drop_database(&self.db_name).await?;
        Ok(())
    }

    async fn use_database(&mut self, name: &str) -> Result<(), ExecutorError> {
        self.db_name = name.to_string();
        Ok(())
    }

    async fn existing_databases(&mut self) -> Result<Vec<String>, ExecutorError> {
        Ok(self.store().await?.list_databases().await?)
    }

    async fn existing_models(&mut self) -> Result<Vec<String>, ExecutorError> {
        Ok(self.store().await?.list_collections(&self.db_name).await?)
    }

    async fn create_model(
        &mut self,
        model: &Model,
        apply: Apply,
    ) -> Result<Option<Statement>, ExecutorError> {
        let statement = model.is_top_level().then(|| {
            Statement::Document(DocumentOp::CreateCollection {
                name: model.name.clone(),
            })
        });
        self.settle(statement, apply).await
    }

    async fn drop_model(
        &mut self,
        model: &Model,
        apply: Apply,
    ) -> Result<Option<Statement>, ExecutorError> {
        let statement = model.is_top_level().then(|| {
            Statement::Document(DocumentOp::DropCollection {
                name: model.name.clone(),
            })
        });
        self.settle(statement, apply).await
    }

    async fn rename_model(
        &mut self,
        old_name: &str,
        model: &Model,
        apply: Apply,
    ) -> Result<Option<Statement>, ExecutorError> {
        let statement = (model.is_top_level() && old_name != model.name).then(|| {
            Statement::Document(DocumentOp::RenameCollection {
                from: old_name.to_string(),
                to: model.name.clone(),
            })
        });
        self.settle(statement, apply).await
    }

    async fn create_field(
        &mut self,
        _model: &Model,
        field: &Field,
        _apply: Apply,
    ) -> Result<Option<Statement>, ExecutorError> {
        field.kind()?;
        Ok(None)
    }

    async fn drop_field(
        &mut self,
        model: &Model,
        field: &Field,
        apply: Apply,
    ) -> Result<Option<Statement>, ExecutorError> {
        let statement = Statement::Document(DocumentOp::UnsetField {
            collection: self.collection_of(model),
            path: current_path(model, &field.name),
        });
        self.settle(Some(statement), apply).await
    }

    async fn rename_field(
        &mut self,
        model: &Model,
        field: &Field,
        previous: &Field,
        apply: Apply,
    ) -> Result<Option<Statement>, ExecutorError> {
        if field.name == previous.name {
            return Ok(None);
        }
        let statement = Statement::Document(DocumentOp::RenameField {
            collection: self.collection_of(model),
            path: rename_path(field, previous),
            new_name: field.name.clone(),
        });
        self.settle(Some(statement), apply).await
    }

    async fn set_nullability(
        &mut self,
        _model: &Model,
        _field: &Field,
        _apply: Apply,
    ) -> Result<Option<Statement>, ExecutorError> {
        Ok(None)
    }

    async fn add_index(
        &mut self,
        model: &Model,
        _field: &Field,
        apply: Apply,
    ) -> Result<Option<Statement>, ExecutorError> {
        let statement = self.sync_for(model);
        self.settle(statement, apply).await
    }

    async fn drop_index(
        &mut self,
        model: &Model,
        _field: &Field,
        apply: Apply,
    ) -> Result<Option<Statement>, ExecutorError> {
        let statement = self.sync_for(model);
        self.settle(statement, apply).await
    }

    async fn add_unique_constraint(
        &mut self,
        model: &Model,
        _field: &Field,
        apply: Apply,
    ) -> Result<Option<Statement>, ExecutorError> {
        let statement = self.sync_for(model);
        self.settle(statement, apply).await
    }

    async fn drop_unique_constraint(
        &mut self,
        model: &Model,
        _field: &Field,
        apply: Apply,
    ) -> Result<Option<Statement>, ExecutorError> {
        let statement = self.sync_for(model);
        self.settle(statement, apply).await
    }

    async fn add_full_text_index(
        &mut self,
        model: &Model,
        _field: &Field,
        apply: Apply,
    ) -> Result<Option<Statement>, ExecutorError> {
        let statement = self.sync_for(model);
        self.settle(statement, apply).await
    }

    async fn drop_full_text_index(
        &mut self,
        model: &Model,
        _field: &Field,
        apply: Apply,
    ) -> Result<Option<Statement>, ExecutorError> {
        let statement = self.sync_for(model);
        self.settle(statement, apply).await
    }

    fn create_foreign_key_query(
        &self,
        _model: &Model,
        _field: &Field,
    ) -> Result<Option<Statement>, ExecutorError> {
        Ok(None)
    }

    async fn drop_foreign_key(
        &mut self,
        _model: &Model,
        _field: &Field,
        _apply: Apply,
    ) -> Result<Option<Statement>, ExecutorError> {
        Ok(None)
    }

    async fn execute(&mut self, batch: Vec<Statement>) -> Result<(), ExecutorError> {
        if batch.is_empty() {
            return Ok(());
        }
        let store = self.store().await?;
        let mut synced = HashSet::new();
        for statement in batch {
            let op = match statement {
                Statement::Document(op) => op,
                Statement::Sql(sql) => {
                    return Err(ExecutorError::unexpected(format!(
                        "document backend cannot run SQL: {sql}"
                    )))
                }
            };
            if let DocumentOp::SyncIndexes { collection } = &op {
                if !synced.insert(collection.clone()) {
                    continue;
                }
            }
            debug!(database = %self.db_name, "{op}");
            self.apply(store.as_ref(), &op).await?;
        }
        Ok(())
    }

    async fn finalize(&mut self, progress: &mut dyn Progress) -> Result<(), ExecutorError> {
        let store = self.store().await?;
        let collections = store.list_collections(&self.db_name).await?;
        for collection in collections {
            if self.sync_indexes(store.as_ref(), &collection).await? {
                progress.step(format!(
                    "Completed processing collection index definitions for model '{collection}'"
                ));
            }
        }
        Ok(())
    }
}
