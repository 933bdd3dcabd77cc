use crate::backend::{BackendSettings, SchemaBackend};
use crate::connection::{connection_id, ConnectionManager};
use crate::document::DocumentBackend;
use crate::relational::dialect::{MsSql, MySql, Postgres};
use crate::relational::RelationalBackend;
use crate::ExecutorError;
use common::types::{DatabaseConfig, DatabaseType};
use std::sync::Arc;

/// Backend for one tenant database, chosen by its declared type.
///
/// The database's resource must already be resolved. Connections are pooled
/// under [`connection_id`] of the resource and the database design.
pub fn create_backend(
    env_iid: &str,
    config: &DatabaseConfig,
    connections: Arc<ConnectionManager>,
    settings: BackendSettings,
) -> Result<Box<dyn SchemaBackend>, ExecutorError> {
    let resource = config.resource.as_ref().ok_or_else(|| {
        ExecutorError::config(format!(
            "database '{}' has no resource to deploy to",
            config.name
        ))
    })?;
    let access = resource.access.clone();
    let conn_id = connection_id(&resource.iid, &config.iid);
    let config = config.clone();

    let backend: Box<dyn SchemaBackend> = match config.db_type {
        DatabaseType::MongoDB => Box::new(DocumentBackend::new(
            env_iid,
            config,
            conn_id,
            access,
            connections,
            settings,
        )),
        DatabaseType::PostgreSQL => Box::new(RelationalBackend::new(
            Postgres,
            env_iid,
            config,
            conn_id,
            access,
            connections,
        )),
        DatabaseType::MySQL => Box::new(RelationalBackend::new(
            MySql,
            env_iid,
            config,
            conn_id,
            access,
            connections,
        )),
        DatabaseType::SQLServer => Box::new(RelationalBackend::new(
            MsSql,
            env_iid,
            config,
            conn_id,
            access,
            connections,
        )),
        DatabaseType::Oracle => {
            return Err(ExecutorError::unsupported_database(format!(
                "{} databases are not supported",
                config.db_type
            )))
        }
    };
    Ok(backend)
}
