use async_trait::async_trait;
use catalog::{diff, process_database};
use common::types::{DatabaseConfig, DatabaseType, Field, FieldKind, Model, ModelType, ReferenceAction};
use executor::reconcile::{apply_changes, deploy_models};
use executor::{
    create_backend, Apply, BackendSettings, ConnectionManager, ExecutorError, Progress,
    SchemaBackend, Statement,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use shared_clients::connector::{DryRunConnector, NativeConnector};
use shared_clients::document::DocumentStore;
use std::sync::Arc;
use test_utils::fixtures::{database, field, model, resource};

/// Records the order in which operations reach the database.
#[derive(Default)]
struct OpRecorder {
    ops: Vec<String>,
}

impl OpRecorder {
    fn op(&self, name: &str, model: &Model, field: Option<&Field>) -> Option<Statement> {
        let target = match field {
            Some(field) => format!("{}.{}", model.name, field.name),
            None => model.name.clone(),
        };
        Some(Statement::Sql(format!("{name} {target}")))
    }
}

#[async_trait]
impl SchemaBackend for OpRecorder {
    fn db_type(&self) -> DatabaseType {
        DatabaseType::PostgreSQL
    }

    fn database_name(&self) -> &str {
        "recorder"
    }

    async fn create_database(&mut self) -> Result<(), ExecutorError> {
        Ok(())
    }

    async fn drop_database(&mut self) -> Result<(), ExecutorError> {
        Ok(())
    }

    async fn use_database(&mut self, _name: &str) -> Result<(), ExecutorError> {
        Ok(())
    }

    async fn existing_databases(&mut self) -> Result<Vec<String>, ExecutorError> {
        Ok(Vec::new())
    }

    async fn existing_models(&mut self) -> Result<Vec<String>, ExecutorError> {
        Ok(Vec::new())
    }

    async fn create_model(&mut self, model: &Model, apply: Apply) -> Result<Option<Statement>, ExecutorError> {
        let s = self.op("create_model", model, None);
        self.settle(s, apply).await
    }

    async fn drop_model(&mut self, model: &Model, apply: Apply) -> Result<Option<Statement>, ExecutorError> {
        let s = self.op("drop_model", model, None);
        self.settle(s, apply).await
    }

    async fn rename_model(&mut self, _old: &str, model: &Model, apply: Apply) -> Result<Option<Statement>, ExecutorError> {
        let s = self.op("rename_model", model, None);
        self.settle(s, apply).await
    }

    async fn create_field(&mut self, model: &Model, field: &Field, apply: Apply) -> Result<Option<Statement>, ExecutorError> {
        let s = self.op("create_field", model, Some(field));
        self.settle(s, apply).await
    }

    async fn drop_field(&mut self, model: &Model, field: &Field, apply: Apply) -> Result<Option<Statement>, ExecutorError> {
        let s = self.op("drop_field", model, Some(field));
        self.settle(s, apply).await
    }

    async fn rename_field(&mut self, model: &Model, field: &Field, _previous: &Field, apply: Apply) -> Result<Option<Statement>, ExecutorError> {
        let s = self.op("rename_field", model, Some(field));
        self.settle(s, apply).await
    }

    async fn set_nullability(&mut self, model: &Model, field: &Field, apply: Apply) -> Result<Option<Statement>, ExecutorError> {
        let s = self.op("set_nullability", model, Some(field));
        self.settle(s, apply).await
    }

    async fn add_index(&mut self, model: &Model, field: &Field, apply: Apply) -> Result<Option<Statement>, ExecutorError> {
        let s = self.op("add_index", model, Some(field));
        self.settle(s, apply).await
    }

    async fn drop_index(&mut self, model: &Model, field: &Field, apply: Apply) -> Result<Option<Statement>, ExecutorError> {
        let s = self.op("drop_index", model, Some(field));
        self.settle(s, apply).await
    }

    async fn add_unique_constraint(&mut self, model: &Model, field: &Field, apply: Apply) -> Result<Option<Statement>, ExecutorError> {
        let s = self.op("add_unique", model, Some(field));
        self.settle(s, apply).await
    }

    async fn drop_unique_constraint(&mut self, model: &Model, field: &Field, apply: Apply) -> Result<Option<Statement>, ExecutorError> {
        let s = self.op("drop_unique", model, Some(field));
        self.settle(s, apply).await
    }

    async fn add_full_text_index(&mut self, model: &Model, field: &Field, apply: Apply) -> Result<Option<Statement>, ExecutorError> {
        let s = self.op("add_full_text", model, Some(field));
        self.settle(s, apply).await
    }

    async fn drop_full_text_index(&mut self, model: &Model, field: &Field, apply: Apply) -> Result<Option<Statement>, ExecutorError> {
        let s = self.op("drop_full_text", model, Some(field));
        self.settle(s, apply).await
    }

    fn create_foreign_key_query(&self, model: &Model, field: &Field) -> Result<Option<Statement>, ExecutorError> {
        if field.kind()? != FieldKind::Reference {
            return Ok(None);
        }
        Ok(self.op("create_fk", model, Some(field)))
    }

    async fn drop_foreign_key(&mut self, model: &Model, field: &Field, apply: Apply) -> Result<Option<Statement>, ExecutorError> {
        let s = self.op("drop_fk", model, Some(field));
        self.settle(s, apply).await
    }

    async fn execute(&mut self, batch: Vec<Statement>) -> Result<(), ExecutorError> {
        self.ops.extend(batch.iter().map(Statement::to_string));
        Ok(())
    }

    async fn finalize(&mut self, _progress: &mut dyn Progress) -> Result<(), ExecutorError> {
        self.ops.push("finalize".to_string());
        Ok(())
    }
}

fn previous_models() -> Vec<Model> {
    vec![
        model("u1", "users")
            .field(field("f1", "name", "text").order(1))
            .field(field("f2", "age", "integer").order(2))
            .field(field("f3", "legacy", "text").order(3))
            .field(field("f5", "team", "reference").reference("t1", ReferenceAction::NoAction).order(4))
            .build(),
        model("t1", "teams").field(field("t1f", "id", "id").system()).build(),
        model("o1", "old").field(field("o1f", "id", "id").system()).build(),
    ]
}

fn current_models() -> Vec<Model> {
    vec![
        model("u1", "members")
            .updated(10)
            .field(field("f1", "fullName", "text").order(1).updated(10))
            .field(field("f2", "age", "integer").indexed().order(2).updated(10))
            .field(field("f4", "email", "email").unique().order(5))
            .field(field("f5", "team", "reference").reference("t1", ReferenceAction::Cascade).order(4).updated(10))
            .build(),
        model("t1", "teams").field(field("t1f", "id", "id").system()).build(),
        model("n1", "notes")
            .field(field("n1f", "id", "id").system())
            .field(field("n2f", "author", "reference").reference("u1", ReferenceAction::SetNull).order(1))
            .build(),
    ]
}

#[tokio::test]
async fn redeploy_drops_only_after_surviving_models_settle() {
    let prev = previous_models();
    let curr = current_models();
    let changes = diff(Some(&prev[..]), &curr).expect("models changed");

    let mut backend = OpRecorder::default();
    let mut steps = Vec::new();
    apply_changes(&mut backend, &changes, &mut steps).await.unwrap();

    assert_eq!(
        backend.ops,
        vec![
            "create_model notes",
            "create_fk notes.author",
            "rename_model members",
            "create_field members.email",
            "rename_field members.fullName",
            "add_index members.age",
            "add_unique members.email",
            "drop_fk members.team",
            "create_fk members.team",
            "drop_model old",
            "drop_field members.legacy",
            "finalize",
        ]
    );
    assert_eq!(steps.first().map(String::as_str), Some("Created model 'notes'"));
    assert_eq!(
        steps.last().map(String::as_str),
        Some("Deleted field 'legacy' in model 'members'")
    );
}

#[tokio::test]
async fn initial_deploy_creates_tables_before_keys_and_indexes() {
    let mut backend = OpRecorder::default();
    let models = current_models();
    let mut steps = Vec::new();
    deploy_models(&mut backend, &models, &mut steps).await.unwrap();

    assert_eq!(
        backend.ops,
        vec![
            "create_model members",
            "create_model teams",
            "create_model notes",
            "create_fk members.team",
            "create_fk notes.author",
            "add_index members.age",
            "add_unique members.email",
            "finalize",
        ]
    );
    assert_eq!(steps.len(), 5);
}

fn with_resource(mut db: DatabaseConfig) -> DatabaseConfig {
    db.resource = Some(resource("res1"));
    db
}

#[tokio::test]
async fn postgres_redeploy_script_keeps_drops_last() {
    let connector = DryRunConnector::new();
    let connections = Arc::new(ConnectionManager::new(Arc::new(connector.clone())));
    let db = with_resource(database("db1", DatabaseType::PostgreSQL, current_models()));
    let prev = previous_models();
    let changes = diff(Some(&prev[..]), &db.models).expect("models changed");

    let mut backend = create_backend("env1", &db, connections, BackendSettings::default()).unwrap();
    let mut steps = Vec::new();
    apply_changes(backend.as_mut(), &changes, &mut steps).await.unwrap();

    let script = connector.statements().joined();
    let rename = script.find("ALTER TABLE \"users\" RENAME TO \"members\"").unwrap();
    let drop_table = script.find("DROP TABLE IF EXISTS \"old\" CASCADE;").unwrap();
    let drop_column = script.find("DROP COLUMN \"legacy\"").unwrap();
    let unique = script.find("ADD CONSTRAINT \"unique_f4\" UNIQUE (\"email\")").unwrap();
    assert!(rename < unique && unique < drop_table && drop_table < drop_column);
    assert!(script.contains("REFERENCES \"members\" (\"id\") ON DELETE SET NULL"));
    assert!(script.contains("REFERENCES \"teams\" (\"id\") ON DELETE CASCADE"));
}

#[tokio::test]
async fn renamed_column_still_gets_its_required_change() {
    let connector = DryRunConnector::new();
    let connections = Arc::new(ConnectionManager::new(Arc::new(connector.clone())));
    let prev = vec![model("u1", "users").field(field("f1", "name", "text")).build()];
    let db = with_resource(database(
        "db1",
        DatabaseType::PostgreSQL,
        vec![model("u1", "users")
            .updated(10)
            .field(field("f1", "fullName", "text").required().updated(10))
            .build()],
    ));
    let changes = diff(Some(&prev[..]), &db.models).expect("models changed");

    let mut backend = create_backend("env1", &db, connections, BackendSettings::default()).unwrap();
    let mut steps = Vec::new();
    apply_changes(backend.as_mut(), &changes, &mut steps).await.unwrap();

    let script = connector.statements().joined();
    let rename = script
        .find("ALTER TABLE \"users\" RENAME COLUMN \"name\" TO \"fullName\"")
        .unwrap();
    let not_null = script
        .find("ALTER TABLE \"users\" ALTER COLUMN \"fullName\" SET NOT NULL")
        .unwrap();
    assert!(rename < not_null, "rename at {rename}, not null at {not_null}");
}

#[tokio::test]
async fn document_renames_walk_nested_arrays_parents_first() {
    let connector = DryRunConnector::new();
    let connections = Arc::new(ConnectionManager::new(Arc::new(connector.clone())));
    let store = connector.documents().clone();

    let mut prev = database(
        "db1",
        DatabaseType::MongoDB,
        vec![
            model("m1", "orders")
                .field(field("f1", "lines", "object-list").sub_model("m2"))
                .build(),
            model("m2", "lines")
                .nested("m1", ModelType::SubModelList)
                .field(field("f2", "sku", "text"))
                .field(field("f3", "memo", "text").order(1))
                .build(),
        ],
    );
    process_database(&mut prev).unwrap();
    let mut curr = database(
        "db1",
        DatabaseType::MongoDB,
        vec![
            model("m1", "orders")
                .updated(5)
                .field(field("f1", "items", "object-list").sub_model("m2").updated(5))
                .build(),
            model("m2", "items")
                .nested("m1", ModelType::SubModelList)
                .updated(5)
                .field(field("f2", "code", "text").indexed().updated(5))
                .build(),
        ],
    );
    process_database(&mut curr).unwrap();
    let curr = with_resource(curr);

    store
        .insert_many(
            "db1_db",
            "orders",
            vec![json!({"lines": [{"sku": "a", "memo": "x"}, {"sku": "b"}]})],
        )
        .await
        .unwrap();

    let changes = diff(Some(&prev.models[..]), &curr.models).expect("models changed");
    let mut backend = create_backend("env1", &curr, connections, BackendSettings::default()).unwrap();
    let mut steps = Vec::new();
    apply_changes(backend.as_mut(), &changes, &mut steps).await.unwrap();

    assert_eq!(
        store.documents("db1_db", "orders"),
        vec![json!({"items": [{"code": "a"}, {"code": "b"}]})]
    );
    let indexes = store.list_indexes("db1_db", "orders").await.unwrap();
    assert_eq!(indexes.len(), 1);
    assert_eq!(indexes[0].keys[0].0, "items.code");
}

#[tokio::test]
#[ignore = "needs a docker daemon"]
async fn postgres_deploy_is_idempotent() {
    let pg = test_utils::setup_postgres().await.expect("postgres container");
    let mut db = database("db1", DatabaseType::PostgreSQL, current_models());
    let mut res = resource("res1");
    res.access = pg.access();
    db.resource = Some(res);

    let connections = Arc::new(ConnectionManager::new(Arc::new(NativeConnector)));
    for _ in 0..2 {
        let mut backend =
            create_backend("env1", &db, connections.clone(), BackendSettings::default()).unwrap();
        backend.create_database().await.unwrap();
        let mut steps = Vec::new();
        deploy_models(backend.as_mut(), &db.models, &mut steps).await.unwrap();
        let mut tables = backend.existing_models().await.unwrap();
        tables.sort();
        assert_eq!(tables, vec!["members", "notes", "teams"]);
    }

    let mut backend = create_backend("env1", &db, connections.clone(), BackendSettings::default()).unwrap();
    backend.drop_database().await.unwrap();
    assert!(!backend
        .existing_databases()
        .await
        .unwrap()
        .contains(&"db1_db".to_string()));
    connections.remove_all_connections().await;
}
