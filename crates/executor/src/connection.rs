use crate::ExecutorError;
use common::types::{DatabaseType, ResourceAccess};
use parking_lot::RwLock;
use shared_clients::connector::Connector;
use shared_clients::document::DocumentStore;
use shared_clients::AsyncDbAdapter;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Live handle to a database server, shared by every job touching it.
#[derive(Clone)]
pub enum Connection {
    Sql(Arc<Mutex<AsyncDbAdapter>>),
    Document(Arc<dyn DocumentStore>),
}

impl Connection {
    async fn close(self) {
        let result = match self {
            Connection::Sql(adapter) => adapter.lock().await.close().await,
            Connection::Document(store) => store.close().await,
        };
        if let Err(e) = result {
            warn!("ignoring failure while closing connection: {e}");
        }
    }
}

type PoolKey = (String, DatabaseType);

/// Pool id of a database design deployed on a resource.
///
/// The same design iid can be mapped to different servers by different
/// environments, and designs sharing a server must not switch each other's
/// active database, so both parts are needed.
pub fn connection_id(resource_iid: &str, database_iid: &str) -> String {
    format!("{resource_iid}/{database_iid}")
}

/// Keeps one connection per pool id and backend type.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    pool: RwLock<HashMap<PoolKey, Connection>>,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            pool: RwLock::new(HashMap::new()),
        }
    }

    /// Cached connection for `conn_id`, or a fresh one replacing it when
    /// `force_new` is set.
    pub async fn get_conn(
        &self,
        conn_id: &str,
        db_type: DatabaseType,
        access: &ResourceAccess,
        force_new: bool,
    ) -> Result<Connection, ExecutorError> {
        let key = (conn_id.to_string(), db_type);
        if !force_new {
            if let Some(conn) = self.pool.read().get(&key) {
                return Ok(conn.clone());
            }
        }

        debug!(conn_id, %db_type, force_new, "opening connection");
        let conn = if db_type.is_relational() {
            let adapter = self.connector.connect_sql(db_type, access).await?;
            Connection::Sql(Arc::new(Mutex::new(adapter)))
        } else {
            Connection::Document(self.connector.connect_document(access).await?)
        };

        let replaced = self.pool.write().insert(key, conn.clone());
        if let Some(old) = replaced {
            old.close().await;
        }
        Ok(conn)
    }

    /// Closes and forgets every connection of `conn_id`; teardown errors are ignored.
    pub async fn remove_connection(&self, conn_id: &str) {
        let removed: Vec<Connection> = {
            let mut pool = self.pool.write();
            let keys: Vec<PoolKey> = pool
                .keys()
                .filter(|(id, _)| id == conn_id)
                .cloned()
                .collect();
            keys.iter().filter_map(|k| pool.remove(k)).collect()
        };
        for conn in removed {
            conn.close().await;
        }
    }

    pub async fn remove_all_connections(&self) {
        let drained: Vec<Connection> = self.pool.write().drain().map(|(_, c)| c).collect();
        for conn in drained {
            conn.close().await;
        }
    }

    pub fn contains(&self, conn_id: &str, db_type: DatabaseType) -> bool {
        self.pool
            .read()
            .contains_key(&(conn_id.to_string(), db_type))
    }

    pub fn len(&self) -> usize {
        self.pool.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.read().is_empty()
    }
}
