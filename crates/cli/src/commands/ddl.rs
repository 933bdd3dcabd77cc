use crate::commands::{read_document, runtime};
use catalog::process_database;
use clap::{Args, ValueEnum};
use common::error::WorkerError;
use common::types::{DatabaseConfig, DatabaseType, Model, Resource};
use executor::{create_backend, reconcile, BackendSettings, ConnectionManager};
use serde_json::Map;
use shared_clients::connector::DryRunConnector;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Dialect {
    Postgres,
    Mysql,
    Mssql,
}

impl Dialect {
    pub fn db_type(self) -> DatabaseType {
        match self {
            Dialect::Postgres => DatabaseType::PostgreSQL,
            Dialect::Mysql => DatabaseType::MySQL,
            Dialect::Mssql => DatabaseType::SQLServer,
        }
    }
}

#[derive(Debug, Args)]
pub struct DdlArgs {
    #[arg(long, value_enum)]
    pub dialect: Dialect,
    /// List of models (JSON or YAML)
    #[arg(long, value_name = "FILE")]
    pub models: PathBuf,
}

pub fn handle_ddl(args: &DdlArgs) -> Result<(), WorkerError> {
    let models: Vec<Model> = read_document(&args.models)?;
    for statement in render_ddl(args.dialect, models)? {
        println!("{statement}");
    }
    Ok(())
}

/// Scripts a fresh deployment of `models` would run, in execution order.
pub fn render_ddl(dialect: Dialect, models: Vec<Model>) -> Result<Vec<String>, WorkerError> {
    let mut db = DatabaseConfig {
        iid: "ddl".to_string(),
        id: None,
        name: "ddl".to_string(),
        db_type: dialect.db_type(),
        managed: true,
        assign_unique_name: false,
        schemas: Vec::new(),
        models,
        resource: Some(Resource::default()),
        extra: Map::new(),
    };
    process_database(&mut db).map_err(WorkerError::input)?;

    let connector = DryRunConnector::new();
    let connections = Arc::new(ConnectionManager::new(Arc::new(connector.clone())));
    let mut backend = create_backend("ddl", &db, connections, BackendSettings::default())
        .map_err(WorkerError::input)?;

    let mut steps: Vec<String> = Vec::new();
    runtime()?
        .block_on(reconcile::deploy_models(backend.as_mut(), &db.models, &mut steps))
        .map_err(WorkerError::run)?;
    for step in &steps {
        tracing::debug!("{step}");
    }
    Ok(connector.statements().statements())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::types::ReferenceAction;
    use std::fs;
    use test_utils::fixtures::{field, model};

    fn shop() -> Vec<Model> {
        vec![
            model("m1", "customers")
                .field(field("f1", "name", "text").required())
                .build(),
            model("m2", "orders")
                .field(field("f2", "total", "decimal"))
                .field(field("f3", "customer", "reference").reference("m1", ReferenceAction::Cascade))
                .build(),
        ]
    }

    #[test]
    fn tables_come_before_foreign_keys() {
        let statements = render_ddl(Dialect::Postgres, shop()).unwrap();
        let script = statements.join("\n");
        let create = script.find("CREATE TABLE").unwrap();
        let fk = script.find("FOREIGN KEY").unwrap();
        assert!(create < fk);
        assert!(script.contains("customers"));
        assert!(script.contains("orders"));
    }

    #[test]
    fn every_dialect_renders_the_tables() {
        for dialect in [Dialect::Postgres, Dialect::Mysql, Dialect::Mssql] {
            let script = render_ddl(dialect, shop()).unwrap().join("\n");
            assert!(script.contains("customers"), "{dialect:?}");
        }
    }

    #[test]
    fn unknown_field_type_is_reported() {
        let models = vec![model("m1", "users").field(field("f1", "x", "hologram")).build()];
        assert!(render_ddl(Dialect::Postgres, models).is_err());
    }

    #[test]
    fn reads_models_from_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models.json");
        fs::write(&path, serde_json::to_string(&shop()).unwrap()).unwrap();
        let args = DdlArgs {
            dialect: Dialect::Mysql,
            models: path,
        };
        handle_ddl(&args).unwrap();
    }
}
