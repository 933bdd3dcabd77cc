//! Per-environment configuration database on the platform's document server.
//!
//! Holds the last successfully deployed configuration (the "previous" side of
//! every redeploy diff) next to the environment's bookkeeping collections.

use super::internal;
use crate::error::EngineError;
use common::types::{DatabaseConfig, Environment, Job};
use executor::Progress;
use serde::Serialize;
use serde_json::Value;
use shared_clients::document::{DocFilter, DocumentStore};
use std::sync::Arc;
use tracing::debug;

pub const DATABASES: &str = "databases";
pub const ENDPOINTS: &str = "endpoints";
pub const FUNCTIONS: &str = "functions";
pub const MIDDLEWARES: &str = "middlewares";
pub const QUEUES: &str = "queues";
pub const TASKS: &str = "tasks";
pub const STORAGES: &str = "storages";
pub const CACHES: &str = "caches";
pub const ENVIRONMENT: &str = "environment";
pub const ENDPOINT_LOGS: &str = "endpoint_logs";
pub const QUEUE_LOGS: &str = "queue_logs";
pub const MESSAGES: &str = "messages";
pub const CRONJOB_LOGS: &str = "cronjob_logs";
pub const CRONJOBS: &str = "cronjobs";

/// Application metadata lists of a job, keyed by the collection (and cache
/// suffix) they are stored under.
pub fn metadata(job: &Job) -> [(&'static str, &[Value]); 7] {
    [
        (ENDPOINTS, &job.endpoints),
        (MIDDLEWARES, &job.middlewares),
        (QUEUES, &job.queues),
        (TASKS, &job.tasks),
        (STORAGES, &job.storages),
        (FUNCTIONS, &job.functions),
        (CACHES, &job.caches),
    ]
}

/// Objects whose runtime logs and tracking entries outlive their definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tracked {
    Endpoint,
    Queue,
    Task,
}

impl Tracked {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tracked::Endpoint => "endpoint",
            Tracked::Queue => "queue",
            Tracked::Task => "task",
        }
    }

    /// Collection the definitions themselves are stored in.
    pub fn collection(&self) -> &'static str {
        match self {
            Tracked::Endpoint => ENDPOINTS,
            Tracked::Queue => QUEUES,
            Tracked::Task => TASKS,
        }
    }

    /// (collection, key field, object attribute) triples to purge.
    fn targets(&self) -> &'static [(&'static str, &'static str, &'static str)] {
        match self {
            Tracked::Endpoint => &[(ENDPOINT_LOGS, "endpointId", "_id")],
            Tracked::Queue => &[(QUEUE_LOGS, "queueId", "_id"), (MESSAGES, "queueId", "iid")],
            Tracked::Task => &[(CRONJOB_LOGS, "taskId", "_id"), (CRONJOBS, "taskId", "iid")],
        }
    }
}

pub struct EnvironmentStore {
    store: Arc<dyn DocumentStore>,
    db: String,
}

impl EnvironmentStore {
    pub fn new(store: Arc<dyn DocumentStore>, env_iid: &str) -> Self {
        Self {
            store,
            db: env_iid.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.db
    }

    /// Database configurations of the last successful deployment.
    pub async fn databases(&self) -> Result<Vec<DatabaseConfig>, EngineError> {
        let docs = self.store.find(&self.db, DATABASES, &DocFilter::All).await?;
        docs.into_iter()
            .map(|doc| serde_json::from_value(doc).map_err(EngineError::from))
            .collect()
    }

    pub async fn list(&self, collection: &str) -> Result<Vec<Value>, EngineError> {
        Ok(self.store.find(&self.db, collection, &DocFilter::All).await?)
    }

    /// Replaces every document of `collection`.
    pub async fn save_list<T: Serialize>(
        &self,
        collection: &str,
        items: &[T],
    ) -> Result<(), EngineError> {
        let docs = items
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        let removed = self
            .store
            .delete_many(&self.db, collection, &DocFilter::All)
            .await?;
        debug!(db = %self.db, collection, removed, saved = docs.len(), "replacing configuration");
        if !docs.is_empty() {
            self.store.insert_many(&self.db, collection, docs).await?;
        }
        Ok(())
    }

    pub async fn save_databases(&self, databases: &[DatabaseConfig]) -> Result<(), EngineError> {
        self.save_list(DATABASES, databases).await
    }

    pub async fn save_environment(&self, env: &Environment) -> Result<(), EngineError> {
        self.save_list(ENVIRONMENT, std::slice::from_ref(env)).await
    }

    /// Stores the job's whole configuration, replacing the previous one.
    pub async fn save_deployment(
        &self,
        job: &Job,
        databases: &[DatabaseConfig],
    ) -> Result<(), EngineError> {
        self.save_environment(&job.env).await?;
        self.save_databases(databases).await?;
        for (collection, items) in metadata(job) {
            self.save_list(collection, items).await?;
        }
        Ok(())
    }

    /// Drops the logs and tracking entries of the given objects.
    pub async fn purge_tracking(&self, kind: Tracked, objects: &[Value]) -> Result<u64, EngineError> {
        let mut purged = 0;
        for (collection, key, attribute) in kind.targets() {
            let ids: Vec<Value> = objects
                .iter()
                .filter_map(|object| object.get(*attribute).cloned())
                .collect();
            if ids.is_empty() {
                continue;
            }
            let filter = DocFilter::In(key.to_string(), ids);
            purged += self.store.delete_many(&self.db, collection, &filter).await?;
        }
        Ok(purged)
    }

    /// Creates the bookkeeping collections that do not exist yet.
    pub async fn ensure_internal_collections(
        &self,
        progress: &mut dyn Progress,
    ) -> Result<(), EngineError> {
        let existing = self.store.list_collections(&self.db).await?;
        for collection in internal::collections() {
            if existing.iter().any(|name| name == collection.name) {
                continue;
            }
            self.store.create_collection(&self.db, collection.name).await?;
            self.store
                .create_indexes(&self.db, collection.name, &collection.indexes)
                .await?;
            progress.step(collection.created.to_string());
        }
        Ok(())
    }

    pub async fn drop(&self) -> Result<(), EngineError> {
        Ok(self.store.drop_database(&self.db).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared_clients::document::MemoryDocumentStore;

    #[tokio::test]
    async fn internal_collections_are_created_once() {
        let memory = MemoryDocumentStore::new();
        let store = EnvironmentStore::new(Arc::new(memory.clone()), "env1");

        let mut first = Vec::new();
        store.ensure_internal_collections(&mut first).await.unwrap();
        assert_eq!(first.len(), 7);

        let mut second = Vec::new();
        store.ensure_internal_collections(&mut second).await.unwrap();
        assert!(second.is_empty());

        let indexes = memory.list_indexes("env1", "messages").await.unwrap();
        let ttl = indexes.iter().find(|i| i.keys[0].0 == "submittedAt").unwrap();
        assert_eq!(ttl.expire_after_seconds, Some(604_800));
    }

    #[tokio::test]
    async fn saving_replaces_the_previous_list() {
        let memory = MemoryDocumentStore::new();
        let store = EnvironmentStore::new(Arc::new(memory.clone()), "env1");

        store
            .save_list(ENDPOINTS, &[json!({"iid": "a"}), json!({"iid": "b"})])
            .await
            .unwrap();
        store.save_list(ENDPOINTS, &[json!({"iid": "c"})]).await.unwrap();
        assert_eq!(store.list(ENDPOINTS).await.unwrap(), vec![json!({"iid": "c"})]);

        memory
            .insert_many(
                "env1",
                ENDPOINT_LOGS,
                vec![
                    json!({"endpointId": "a", "status": 200}),
                    json!({"endpointId": "c", "status": 500}),
                ],
            )
            .await
            .unwrap();
        let purged = store
            .purge_tracking(Tracked::Endpoint, &[json!({"iid": "e1", "_id": "a"})])
            .await
            .unwrap();
        assert_eq!(purged, 1);
        assert_eq!(memory.documents("env1", ENDPOINT_LOGS).len(), 1);

        store.drop().await.unwrap();
        assert!(!memory.has_database("env1"));
    }

    #[tokio::test]
    async fn queue_and_task_tracking_is_purged_by_id_and_iid() {
        let memory = MemoryDocumentStore::new();
        let store = EnvironmentStore::new(Arc::new(memory.clone()), "env1");
        memory
            .insert_many("env1", QUEUE_LOGS, vec![json!({"queueId": "q-id"}), json!({"queueId": "other"})])
            .await
            .unwrap();
        memory
            .insert_many("env1", MESSAGES, vec![json!({"queueId": "q1"})])
            .await
            .unwrap();
        memory
            .insert_many("env1", CRONJOB_LOGS, vec![json!({"taskId": "t-id"})])
            .await
            .unwrap();
        memory
            .insert_many("env1", CRONJOBS, vec![json!({"taskId": "t1"}), json!({"taskId": "t2"})])
            .await
            .unwrap();

        let queues = store
            .purge_tracking(Tracked::Queue, &[json!({"iid": "q1", "_id": "q-id"})])
            .await
            .unwrap();
        assert_eq!(queues, 2);
        assert_eq!(memory.documents("env1", QUEUE_LOGS), vec![json!({"queueId": "other"})]);
        assert!(memory.documents("env1", MESSAGES).is_empty());

        let tasks = store
            .purge_tracking(Tracked::Task, &[json!({"iid": "t1", "_id": "t-id"})])
            .await
            .unwrap();
        assert_eq!(tasks, 2);
        assert_eq!(memory.documents("env1", CRONJOBS), vec![json!({"taskId": "t2"})]);
    }

    #[tokio::test]
    async fn deployment_keeps_every_metadata_list() {
        let memory = MemoryDocumentStore::new();
        let store = EnvironmentStore::new(Arc::new(memory.clone()), "env1");
        let mut job = test_utils::fixtures::job(
            test_utils::fixtures::environment("env1", &[]),
            test_utils::fixtures::ts(0),
            Vec::new(),
        );
        job.middlewares = vec![json!({"iid": "mw1"})];
        job.queues = vec![json!({"iid": "q1"})];
        job.tasks = vec![json!({"iid": "t1"})];
        job.storages = vec![json!({"iid": "s1"})];
        job.caches = vec![json!({"iid": "c1"})];

        store.save_deployment(&job, &[]).await.unwrap();
        for (collection, iid) in [
            (MIDDLEWARES, "mw1"),
            (QUEUES, "q1"),
            (TASKS, "t1"),
            (STORAGES, "s1"),
            (CACHES, "c1"),
        ] {
            assert_eq!(memory.documents("env1", collection), vec![json!({"iid": iid})]);
        }
        assert!(memory.documents("env1", ENDPOINTS).is_empty());
    }
}
