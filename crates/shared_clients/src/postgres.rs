use crate::{AsyncDatabaseAdapter, DatabaseAdapterError};
use async_trait::async_trait;
use common::types::ResourceAccess;
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, Error, NoTls};

const DEFAULT_PORT: u16 = 5432;
const DEFAULT_DATABASE: &str = "postgres";

impl From<Error> for DatabaseAdapterError {
    #[track_caller]
    fn from(err: Error) -> Self {
        if let Some(e) = err.as_db_error() {
            match e.code() {
                &SqlState::CONNECTION_DOES_NOT_EXIST
                | &SqlState::CONNECTION_FAILURE
                | &SqlState::INVALID_PASSWORD
                | &SqlState::INVALID_AUTHORIZATION_SPECIFICATION => {
                    DatabaseAdapterError::invalid_connection(e.to_string())
                }
                &SqlState::SYNTAX_ERROR => DatabaseAdapterError::syntax(e.to_string()),
                &SqlState::UNDEFINED_TABLE
                | &SqlState::UNDEFINED_COLUMN
                | &SqlState::UNDEFINED_OBJECT
                | &SqlState::INVALID_CATALOG_NAME => DatabaseAdapterError::not_found(e.to_string()),
                &SqlState::DUPLICATE_TABLE
                | &SqlState::DUPLICATE_COLUMN
                | &SqlState::DUPLICATE_OBJECT
                | &SqlState::DUPLICATE_DATABASE => {
                    DatabaseAdapterError::already_exists(e.to_string())
                }
                &SqlState::IO_ERROR => {
                    DatabaseAdapterError::from(std::io::Error::other(e.to_string()))
                }
                _ => DatabaseAdapterError::unexpected(e.to_string()),
            }
        } else if err.is_closed() {
            DatabaseAdapterError::invalid_connection(err.to_string())
        } else {
            DatabaseAdapterError::unexpected(err.to_string())
        }
    }
}

pub struct PostgresAdapter {
    pub client: Client,
    driver: tokio::task::JoinHandle<()>,
}

impl PostgresAdapter {
    /// Connects and spawns the connection driver in the background.
    pub async fn new(
        host: &str,
        port: u16,
        db: &str,
        user: &str,
        password: &str,
    ) -> Result<Self, DatabaseAdapterError> {
        let conn_str = format!(
            "host={} port={} user={} password={} dbname={}",
            host, port, user, password, db
        );
        let (client, connection) = tokio_postgres::connect(&conn_str, NoTls).await?;
        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::warn!("postgres driver task exited: {e}");
            }
        });

        Ok(Self { client, driver })
    }

    pub async fn from_access(access: &ResourceAccess) -> Result<Self, DatabaseAdapterError> {
        if access.host.is_empty() {
            return Err(DatabaseAdapterError::invalid_connection(
                "PostgreSQL resource has no host",
            ));
        }
        Self::new(
            &access.host,
            access.port.unwrap_or(DEFAULT_PORT),
            access.database.as_deref().unwrap_or(DEFAULT_DATABASE),
            &access.username,
            &access.password,
        )
        .await
    }
}

#[async_trait]
impl AsyncDatabaseAdapter for PostgresAdapter {
    async fn execute(&mut self, sql: &str) -> Result<(), DatabaseAdapterError> {
        // simple query protocol: DO blocks and several statements per call
        self.client.batch_execute(sql).await?;
        Ok(())
    }

    async fn query_column(&self, sql: &str) -> Result<Vec<String>, DatabaseAdapterError> {
        let rows = self.client.query(sql, &[]).await?;
        rows.iter()
            .map(|row| row.try_get::<usize, String>(0).map_err(DatabaseAdapterError::from))
            .collect()
    }

    async fn close(&mut self) -> Result<(), DatabaseAdapterError> {
        self.driver.abort();
        Ok(())
    }
}
