//! Schema backend for relational databases.
//!
//! Only top-level models become tables. Nested models live in JSON columns of
//! their owner, so operations on them have nothing to do. Index and constraint
//! names derive from iids and survive table and column renames.

pub mod columns;
pub mod dialect;

use crate::backend::{Apply, Progress, SchemaBackend};
use crate::connection::{Connection, ConnectionManager};
use crate::statement::Statement;
use crate::ExecutorError;
use async_trait::async_trait;
use columns::{column, is_inline};
use common::types::{DatabaseConfig, DatabaseType, Field, FieldKind, Model, ResourceAccess};
use dialect::{Dialect, Object};
use shared_clients::AsyncDbAdapter;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

pub(crate) mod naming {
    use common::types::{Field, Model};

    fn sanitize(iid: &str) -> String {
        iid.chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect()
    }

    pub fn index(field: &Field) -> String {
        format!("index_{}", sanitize(&field.iid))
    }

    pub fn unique(field: &Field) -> String {
        format!("unique_{}", sanitize(&field.iid))
    }

    pub fn full_text(field: &Field) -> String {
        format!("fulltext_{}", sanitize(&field.iid))
    }

    pub fn foreign_key(field: &Field) -> String {
        format!("fk_{}", sanitize(&field.iid))
    }

    pub fn default_constraint(field: &Field) -> String {
        format!("df_{}", sanitize(&field.iid))
    }

    pub fn check_constraint(field: &Field) -> String {
        format!("ck_{}", sanitize(&field.iid))
    }

    pub fn primary_key(model: &Model) -> String {
        format!("pk_{}", sanitize(&model.iid))
    }
}

pub struct RelationalBackend<D: Dialect> {
    dialect: D,
    config: DatabaseConfig,
    connections: Arc<ConnectionManager>,
    resource_id: String,
    access: ResourceAccess,
    db_name: String,
}

impl<D: Dialect> RelationalBackend<D> {
    pub fn new(
        dialect: D,
        env_iid: &str,
        config: DatabaseConfig,
        resource_id: String,
        access: ResourceAccess,
        connections: Arc<ConnectionManager>,
    ) -> Self {
        let db_name = config.applied_name(env_iid).to_lowercase();
        Self {
            dialect,
            config,
            connections,
            resource_id,
            access,
            db_name,
        }
    }

    async fn connect(
        &self,
        access: &ResourceAccess,
        force_new: bool,
    ) -> Result<Arc<Mutex<AsyncDbAdapter>>, ExecutorError> {
        let conn = self
            .connections
            .get_conn(&self.resource_id, self.dialect.db_type(), access, force_new)
            .await?;
        match conn {
            Connection::Sql(adapter) => Ok(adapter),
            Connection::Document(_) => Err(ExecutorError::unexpected(format!(
                "resource '{}' is not a relational database",
                self.resource_id
            ))),
        }
    }

    async fn run(&self, sql: &str) -> Result<(), ExecutorError> {
        debug!(database = %self.db_name, "{sql}");
        let adapter = self.connect(&self.access, false).await?;
        let mut adapter = adapter.lock().await;
        adapter.execute(sql).await?;
        Ok(())
    }

    async fn query(&self, sql: &str) -> Result<Vec<String>, ExecutorError> {
        let adapter = self.connect(&self.access, false).await?;
        let adapter = adapter.lock().await;
        Ok(adapter.query_column(sql).await?)
    }

    fn guarded(&self, condition: &str, body: &str) -> Statement {
        Statement::Sql(self.dialect.guard(condition, body))
    }

    fn both(&self, a: String, b: String) -> String {
        format!("{a} AND {b}")
    }

    fn column_exists(&self, table: &str, column: &str) -> String {
        self.dialect.exists(Object::Column { table, column })
    }

    fn column_missing(&self, table: &str, column: &str) -> String {
        self.dialect.missing(Object::Column { table, column })
    }

    /// Primary key column of the referenced table.
    fn reference_target(&self, field: &Field) -> Result<(&Model, String), ExecutorError> {
        let target_iid = field.reference_iid().ok_or_else(|| {
            ExecutorError::config(format!("reference field '{}' has no target", field.name))
        })?;
        let target = self
            .config
            .model(target_iid)
            .filter(|m| m.is_top_level())
            .ok_or_else(|| {
                ExecutorError::config(format!(
                    "reference field '{}' points at unknown model '{target_iid}'",
                    field.name
                ))
            })?;
        let id = target
            .fields
            .iter()
            .find(|f| matches!(f.kind(), Ok(FieldKind::Id)))
            .map(|f| f.name.clone())
            .unwrap_or_else(|| "id".to_string());
        Ok((target, id))
    }
}

#[async_trait]
impl<D: Dialect> SchemaBackend for RelationalBackend<D> {
    fn db_type(&self) -> DatabaseType {
        self.dialect.db_type()
    }

    fn database_name(&self) -> &str {
        &self.db_name
    }

    async fn create_database(&mut self) -> Result<(), ExecutorError> {
        let name = self.db_name.clone();
        let existing = self.existing_databases().await?;
        if !existing.iter().any(|db| *db == name) {
            self.run(&self.dialect.create_database(&name)).await?;
        }
        self.use_database(&name).await
    }

    async fn drop_database(&mut self) -> Result<(), ExecutorError> {
        // a database cannot be dropped from a session connected to it
        let mut admin = self.access.clone();
        admin.database = None;
        self.connect(&admin, true).await?;
        self.access = admin;
        self.run(&self.dialect.drop_database(&self.db_name)).await
    }

    async fn use_database(&mut self, name: &str) -> Result<(), ExecutorError> {
        let mut access = self.access.clone();
        access.database = Some(name.to_string());
        self.connect(&access, true).await?;
        self.access = access;
        self.db_name = name.to_string();
        Ok(())
    }

    async fn existing_databases(&mut self) -> Result<Vec<String>, ExecutorError> {
        self.query(self.dialect.databases_query()).await
    }

    async fn existing_models(&mut self) -> Result<Vec<String>, ExecutorError> {
        self.query(self.dialect.tables_query()).await
    }

    async fn create_model(
        &mut self,
        model: &Model,
        apply: Apply,
    ) -> Result<Option<Statement>, ExecutorError> {
        if !model.is_top_level() {
            return Ok(None);
        }
        let mut columns = Vec::with_capacity(model.fields.len());
        for field in &model.fields {
            if is_inline(field)? {
                columns.push(column(&self.dialect, model, field)?.render(&self.dialect));
            }
        }
        let statement = Statement::Sql(self.dialect.create_table(&model.name, &columns));
        self.settle(Some(statement), apply).await
    }

    async fn drop_model(
        &mut self,
        model: &Model,
        apply: Apply,
    ) -> Result<Option<Statement>, ExecutorError> {
        if !model.is_top_level() {
            return Ok(None);
        }
        let statement = Statement::Sql(self.dialect.drop_table(&model.name));
        self.settle(Some(statement), apply).await
    }

    async fn rename_model(
        &mut self,
        old_name: &str,
        model: &Model,
        apply: Apply,
    ) -> Result<Option<Statement>, ExecutorError> {
        if !model.is_top_level() || old_name == model.name {
            return Ok(None);
        }
        let condition = self.both(
            self.dialect.exists(Object::Table(old_name)),
            self.dialect.missing(Object::Table(&model.name)),
        );
        let body = self.dialect.rename_table(old_name, &model.name);
        let statement = self.guarded(&condition, &body);
        self.settle(Some(statement), apply).await
    }

    /// Reference columns are created by [`SchemaBackend::create_foreign_key_query`].
    async fn create_field(
        &mut self,
        model: &Model,
        field: &Field,
        apply: Apply,
    ) -> Result<Option<Statement>, ExecutorError> {
        if !model.is_top_level() || !is_inline(field)? {
            return Ok(None);
        }
        let definition = column(&self.dialect, model, field)?.render(&self.dialect);
        let statement = self.guarded(
            &self.column_missing(&model.name, &field.name),
            &self.dialect.add_column(&model.name, &definition),
        );
        self.settle(Some(statement), apply).await
    }

    async fn drop_field(
        &mut self,
        model: &Model,
        field: &Field,
        apply: Apply,
    ) -> Result<Option<Statement>, ExecutorError> {
        if !model.is_top_level() {
            return Ok(None);
        }
        let table = model.name.as_str();
        let mut parts = Vec::new();

        let mut constraints = Vec::new();
        if field.kind()? == FieldKind::Reference {
            constraints.push(naming::foreign_key(field));
        }
        // SQL Server refuses to drop a column that constraints still depend on
        if self.dialect.named_defaults() {
            constraints.push(naming::unique(field));
            constraints.push(naming::default_constraint(field));
            constraints.push(naming::check_constraint(field));
            let index = naming::index(field);
            parts.push(self.dialect.guard(
                &self.dialect.exists(Object::Index { table, name: &index }),
                &self.dialect.drop_index(table, &index),
            ));
        }
        for name in &constraints {
            let body = if *name == naming::foreign_key(field) {
                self.dialect.drop_foreign_key(table, name)
            } else {
                self.dialect.drop_constraint(table, name)
            };
            parts.push(self.dialect.guard(
                &self.dialect.exists(Object::Constraint { table, name }),
                &body,
            ));
        }
        parts.push(self.dialect.guard(
            &self.column_exists(table, &field.name),
            &self.dialect.drop_column(table, &field.name),
        ));

        self.settle(Some(Statement::Sql(parts.join("\n"))), apply)
            .await
    }

    async fn rename_field(
        &mut self,
        model: &Model,
        field: &Field,
        previous: &Field,
        apply: Apply,
    ) -> Result<Option<Statement>, ExecutorError> {
        if !model.is_top_level() || field.name == previous.name {
            return Ok(None);
        }
        let table = model.name.as_str();
        let condition = self.both(
            self.column_exists(table, &previous.name),
            self.column_missing(table, &field.name),
        );
        let statement = self.guarded(
            &condition,
            &self.dialect.rename_column(table, &previous.name, &field.name),
        );
        self.settle(Some(statement), apply).await
    }

    async fn set_nullability(
        &mut self,
        model: &Model,
        field: &Field,
        apply: Apply,
    ) -> Result<Option<Statement>, ExecutorError> {
        if !model.is_top_level() || matches!(field.kind()?, FieldKind::Id) {
            return Ok(None);
        }
        let definition = column(&self.dialect, model, field)?;
        let statement = self.guarded(
            &self.column_exists(&model.name, &field.name),
            &self.dialect.set_nullability(&model.name, &definition),
        );
        self.settle(Some(statement), apply).await
    }

    async fn add_index(
        &mut self,
        model: &Model,
        field: &Field,
        apply: Apply,
    ) -> Result<Option<Statement>, ExecutorError> {
        if !model.is_top_level() {
            return Ok(None);
        }
        let table = model.name.as_str();
        let name = naming::index(field);
        let key = self.dialect.index_key(&field.name, field);
        let statement = self.guarded(
            &self.dialect.missing(Object::Index { table, name: &name }),
            &self.dialect.create_index(table, &name, &key),
        );
        self.settle(Some(statement), apply).await
    }

    async fn drop_index(
        &mut self,
        model: &Model,
        field: &Field,
        apply: Apply,
    ) -> Result<Option<Statement>, ExecutorError> {
        if !model.is_top_level() {
            return Ok(None);
        }
        let table = model.name.as_str();
        let name = naming::index(field);
        let statement = self.guarded(
            &self.dialect.exists(Object::Index { table, name: &name }),
            &self.dialect.drop_index(table, &name),
        );
        self.settle(Some(statement), apply).await
    }

    async fn add_unique_constraint(
        &mut self,
        model: &Model,
        field: &Field,
        apply: Apply,
    ) -> Result<Option<Statement>, ExecutorError> {
        if !model.is_top_level() {
            return Ok(None);
        }
        let table = model.name.as_str();
        let name = naming::unique(field);
        let key = self.dialect.index_key(&field.name, field);
        let statement = self.guarded(
            &self.dialect.missing(Object::Constraint { table, name: &name }),
            &self.dialect.add_unique(table, &name, &key),
        );
        self.settle(Some(statement), apply).await
    }

    async fn drop_unique_constraint(
        &mut self,
        model: &Model,
        field: &Field,
        apply: Apply,
    ) -> Result<Option<Statement>, ExecutorError> {
        if !model.is_top_level() {
            return Ok(None);
        }
        let table = model.name.as_str();
        let name = naming::unique(field);
        let statement = self.guarded(
            &self.dialect.exists(Object::Constraint { table, name: &name }),
            &self.dialect.drop_unique(table, &name),
        );
        self.settle(Some(statement), apply).await
    }

    async fn add_full_text_index(
        &mut self,
        model: &Model,
        field: &Field,
        apply: Apply,
    ) -> Result<Option<Statement>, ExecutorError> {
        if !model.is_top_level() {
            return Ok(None);
        }
        let sql = self.dialect.add_full_text(
            &model.name,
            &field.name,
            &naming::full_text(field),
            &naming::primary_key(model),
        );
        self.settle(Some(Statement::Sql(sql)), apply).await
    }

    async fn drop_full_text_index(
        &mut self,
        model: &Model,
        field: &Field,
        apply: Apply,
    ) -> Result<Option<Statement>, ExecutorError> {
        if !model.is_top_level() {
            return Ok(None);
        }
        let sql = self
            .dialect
            .drop_full_text(&model.name, &field.name, &naming::full_text(field));
        self.settle(Some(Statement::Sql(sql)), apply).await
    }

    fn create_foreign_key_query(
        &self,
        model: &Model,
        field: &Field,
    ) -> Result<Option<Statement>, ExecutorError> {
        if !model.is_top_level() || field.kind()? != FieldKind::Reference {
            return Ok(None);
        }
        let (target, target_column) = self.reference_target(field)?;
        let table = model.name.as_str();
        let definition = column(&self.dialect, model, field)?.render(&self.dialect);
        let add_column = self.dialect.guard(
            &self.column_missing(table, &field.name),
            &self.dialect.add_column(table, &definition),
        );

        let name = naming::foreign_key(field);
        let action = field.reference_action().unwrap_or_default().as_sql();
        let add_constraint = self.dialect.guard(
            &self.dialect.missing(Object::Constraint { table, name: &name }),
            &format!(
                "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {action}",
                self.dialect.quote(table),
                self.dialect.quote(&name),
                self.dialect.quote(&field.name),
                self.dialect.quote(&target.name),
                self.dialect.quote(&target_column)
            ),
        );
        Ok(Some(Statement::Sql(format!("{add_column}\n{add_constraint}"))))
    }

    async fn drop_foreign_key(
        &mut self,
        model: &Model,
        field: &Field,
        apply: Apply,
    ) -> Result<Option<Statement>, ExecutorError> {
        if !model.is_top_level() {
            return Ok(None);
        }
        let table = model.name.as_str();
        let name = naming::foreign_key(field);
        let statement = self.guarded(
            &self.dialect.exists(Object::Constraint { table, name: &name }),
            &self.dialect.drop_foreign_key(table, &name),
        );
        self.settle(Some(statement), apply).await
    }

    async fn execute(&mut self, batch: Vec<Statement>) -> Result<(), ExecutorError> {
        let mut script = Vec::with_capacity(batch.len());
        for statement in batch {
            match statement {
                Statement::Sql(sql) => script.push(sql),
                Statement::Document(op) => {
                    return Err(ExecutorError::unexpected(format!(
                        "relational backend cannot run document operation {op}"
                    )))
                }
            }
        }
        if script.is_empty() {
            return Ok(());
        }
        self.run(&script.join("\n")).await
    }

    async fn finalize(&mut self, _progress: &mut dyn Progress) -> Result<(), ExecutorError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relational::dialect::{MsSql, MySql, Postgres};
    use common::types::{ModelType, ReferenceAction};
    use pretty_assertions::assert_eq;
    use shared_clients::connector::DryRunConnector;
    use test_utils::fixtures::{database, field, model};

    fn shop(db_type: DatabaseType) -> DatabaseConfig {
        database(
            "Shop",
            db_type,
            vec![
                model("m1", "customers")
                    .field(field("f1", "id", "id").system())
                    .field(field("f2", "email", "email").required().unique().order(1))
                    .build(),
                model("m2", "orders")
                    .field(field("f3", "id", "id").system())
                    .field(field("f4", "customer", "reference").reference("m1", ReferenceAction::Cascade).order(1))
                    .field(field("f5", "lines", "object-list").sub_model("m3").order(2))
                    .build(),
                model("m3", "lines")
                    .nested("m2", ModelType::SubModelList)
                    .field(field("f6", "sku", "text"))
                    .build(),
            ],
        )
    }

    fn backend<D: Dialect>(dialect: D, connector: &DryRunConnector) -> RelationalBackend<D> {
        let config = shop(dialect.db_type());
        RelationalBackend::new(
            dialect,
            "env1",
            config,
            "Shop".into(),
            ResourceAccess::default(),
            Arc::new(ConnectionManager::new(Arc::new(connector.clone()))),
        )
    }

    fn sql(statement: Option<Statement>) -> String {
        match statement {
            Some(Statement::Sql(sql)) => sql,
            other => panic!("expected sql, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn create_database_switches_to_the_lowercased_name() {
        let connector = DryRunConnector::new();
        let mut backend = backend(Postgres, &connector);
        backend.create_database().await.unwrap();
        assert_eq!(backend.database_name(), "shop_db");
        assert_eq!(
            connector.statements().statements(),
            vec!["CREATE DATABASE \"shop_db\";"]
        );
    }

    #[tokio::test]
    async fn tables_skip_reference_columns_and_nested_models() {
        let connector = DryRunConnector::new();
        let mut backend = backend(Postgres, &connector);
        let config = shop(DatabaseType::PostgreSQL);

        let orders = sql(backend.create_model(&config.models[1], Apply::Deferred).await.unwrap());
        assert_eq!(
            orders,
            "CREATE TABLE IF NOT EXISTS \"orders\" (\n  \
             \"id\" BIGSERIAL CONSTRAINT \"pk_m2\" PRIMARY KEY,\n  \
             \"lines\" JSONB\n);"
        );
        let nested = backend
            .create_model(&config.models[2], Apply::Deferred)
            .await
            .unwrap();
        assert!(nested.is_none());
        let sku = &config.models[2].fields[0];
        assert!(backend
            .add_index(&config.models[2], sku, Apply::Deferred)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn foreign_keys_add_column_then_constraint() {
        let connector = DryRunConnector::new();
        let backend = backend(MySql, &connector);
        let config = shop(DatabaseType::MySQL);
        let fk = sql(backend
            .create_foreign_key_query(&config.models[1], &config.models[1].fields[1])
            .unwrap());
        assert!(fk.contains("ALTER TABLE `orders` ADD COLUMN `customer` BIGINT"));
        assert!(fk.contains(
            "ALTER TABLE `orders` ADD CONSTRAINT `fk_f4` FOREIGN KEY (`customer`) \
             REFERENCES `customers` (`id`) ON DELETE CASCADE"
        ));
        assert!(fk.find("ADD COLUMN").unwrap() < fk.find("ADD CONSTRAINT").unwrap());

        let plain = backend
            .create_foreign_key_query(&config.models[0], &config.models[0].fields[1])
            .unwrap();
        assert!(plain.is_none());
    }

    #[tokio::test]
    async fn dangling_reference_is_a_configuration_error() {
        let connector = DryRunConnector::new();
        let backend = backend(Postgres, &connector);
        let orders = model("m9", "returns")
            .field(field("f9", "order", "reference").reference("missing", ReferenceAction::NoAction))
            .build();
        let err = backend
            .create_foreign_key_query(&orders, &orders.fields[0])
            .unwrap_err();
        assert!(matches!(err, ExecutorError::ConfigError { .. }));
    }

    #[tokio::test]
    async fn sql_server_drops_dependants_before_the_column() {
        let connector = DryRunConnector::new();
        let mut backend = backend(MsSql, &connector);
        let config = shop(DatabaseType::SQLServer);
        let script = sql(backend
            .drop_field(&config.models[1], &config.models[1].fields[1], Apply::Deferred)
            .await
            .unwrap());
        let fk = script.find("DROP CONSTRAINT [fk_f4]").unwrap();
        let default = script.find("DROP CONSTRAINT [df_f4]").unwrap();
        let column = script.find("DROP COLUMN [customer]").unwrap();
        assert!(fk < column && default < column);
    }

    #[tokio::test]
    async fn batches_run_as_one_script() {
        let connector = DryRunConnector::new();
        let mut backend = backend(Postgres, &connector);
        let config = shop(DatabaseType::PostgreSQL);
        let customers = &config.models[0];
        let email = &customers.fields[1];

        let batch = vec![
            backend.add_index(customers, email, Apply::Deferred).await.unwrap(),
            backend.add_unique_constraint(customers, email, Apply::Deferred).await.unwrap(),
            backend.add_full_text_index(customers, email, Apply::Deferred).await.unwrap(),
        ];
        backend
            .execute(batch.into_iter().flatten().collect())
            .await
            .unwrap();

        let log = connector.statements().statements();
        assert_eq!(log.len(), 1);
        assert!(log[0].contains("CREATE INDEX \"index_f2\" ON \"customers\" (\"email\")"));
        assert!(log[0].contains("ADD CONSTRAINT \"unique_f2\" UNIQUE (\"email\")"));
        assert!(log[0].contains("USING GIN (to_tsvector('simple', coalesce(\"email\", '')))"));

        backend
            .rename_field(customers, email, email, Apply::Now)
            .await
            .unwrap();
        assert_eq!(connector.statements().statements().len(), 1);
    }
}
