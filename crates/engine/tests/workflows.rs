use async_trait::async_trait;
use common::config::EngineConfig;
use common::types::{DatabaseConfig, DatabaseType, Job, JobKind, SubAction};
use engine::{EngineContext, JobConsumer, Settlement};
use executor::{connection_id, ConnectionManager};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use shared_clients::cache::{CacheError, CacheOp, KeyValueCache, MemoryCache};
use shared_clients::callback::{CallbackClient, LogStatus, RecordingCallbacks};
use shared_clients::connector::DryRunConnector;
use shared_clients::document::{DocFilter, DocumentStore, MemoryDocumentStore};
use shared_clients::notifier::{Notification, RecordingNotifier};
use shared_clients::queue::{Delivery, JobSource, MemoryBroker, QueueTopology};
use std::sync::Arc;
use std::time::Duration;
use test_utils::fixtures::{database, environment, field, job, model, resource, ts};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    cache: MemoryCache,
    platform: MemoryDocumentStore,
    connector: DryRunConnector,
    callbacks: RecordingCallbacks,
    notifier: RecordingNotifier,
    ctx: EngineContext,
}

impl Harness {
    fn new() -> Self {
        Self::with_connector(DryRunConnector::new())
    }

    fn with_connector(connector: DryRunConnector) -> Self {
        let cache = MemoryCache::new();
        Self::with_cache(connector, cache.clone(), Arc::new(cache))
    }

    fn with_cache(
        connector: DryRunConnector,
        cache: MemoryCache,
        shared: Arc<dyn KeyValueCache>,
    ) -> Self {
        let platform = MemoryDocumentStore::new();
        let callbacks = RecordingCallbacks::new();
        let notifier = RecordingNotifier::new();
        let ctx = EngineContext::new(
            EngineConfig::default(),
            shared,
            Arc::new(platform.clone()),
            Arc::new(ConnectionManager::new(Arc::new(connector.clone()))),
            Arc::new(callbacks.clone()),
            Arc::new(notifier.clone()),
        );
        Self {
            cache,
            platform,
            connector,
            callbacks,
            notifier,
            ctx,
        }
    }

    fn consumer(&self) -> JobConsumer {
        JobConsumer::new(self.ctx.clone())
    }

    async fn handle(&self, kind: JobKind, job: &Job, now_secs: i64) -> Settlement {
        let payload = serde_json::to_vec(job).unwrap();
        self.consumer().handle_at(kind, &payload, ts(now_secs)).await
    }

    async fn status(&self) -> Option<String> {
        self.cache.get("env1.status").await.unwrap()
    }

    async fn set_status(&self, status: &str) {
        self.cache
            .set("env1.status", status.to_string())
            .await
            .unwrap();
    }

    fn cached(&self, key: &str) -> Option<Value> {
        self.cache
            .snapshot()
            .get(key)
            .map(|raw| serde_json::from_str(raw).unwrap())
    }
}

fn users(name_field: &str, updated: i64) -> DatabaseConfig {
    database(
        "db1",
        DatabaseType::MongoDB,
        vec![model("m1", "users")
            .updated(updated)
            .field(field("f1", name_field, "text").updated(updated))
            .field(field("f2", "legacy", "integer"))
            .build()],
    )
}

fn pooled_db1() -> String {
    connection_id("res-db1", "db1")
}

fn deploy_job() -> Job {
    job(environment("env1", &["db1"]), ts(0), vec![users("name", 0)])
}

#[tokio::test]
async fn deploy_caches_persists_and_reports_ok() {
    let h = Harness::new();
    let mut job = deploy_job();
    job.endpoints = vec![json!({"iid": "ep1", "path": "/users"})];

    assert_eq!(h.handle(JobKind::DeployVersion, &job, 5).await, Settlement::Ack);

    assert_eq!(h.status().await.as_deref(), Some("OK"));
    assert_eq!(h.cached("env1.object").unwrap()["iid"], "env1");
    assert_eq!(h.cached("env1.db.db1").unwrap()["resource"]["iid"], "res-db1");
    assert_eq!(h.cached("env1.endpoints").unwrap(), json!([{"iid": "ep1", "path": "/users"}]));
    assert_eq!(
        h.cache.snapshot().get("env1.timestamp").map(String::as_str),
        Some("2024-01-01T00:00:00.000Z")
    );

    let saved = h.platform.documents("env1", "databases");
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0]["iid"], "db1");
    assert_eq!(h.platform.documents("env1", "environment").len(), 1);
    let collections = h.platform.list_collections("env1").await.unwrap();
    assert!(collections.contains(&"endpoint_logs".to_string()));

    let tenant = h.connector.documents();
    assert!(tenant
        .list_collections("db1_db")
        .await
        .unwrap()
        .contains(&"users".to_string()));
    assert!(h.ctx.connections.contains(&pooled_db1(), DatabaseType::MongoDB));

    let sent = h.callbacks.sent();
    assert_eq!(sent.len(), 1);
    let (url, payload) = &sent[0];
    assert_eq!(url, "http://platform.local/env/log");
    assert_eq!(payload.status, LogStatus::Ok);
    let messages: Vec<&str> = payload.logs.iter().map(|e| e.message.as_str()).collect();
    assert_eq!(messages.first(), Some(&"Started deployment"));
    assert_eq!(messages.last(), Some(&"Completed deployment successfully"));
    assert!(messages.contains(&"Created message info collection"));
    assert!(messages.contains(&"Saved deployment configuration to database"));

    let notified = h.notifier.notifications();
    assert!(matches!(
        notified.as_slice(),
        [Notification::ApiServers { env_iid, .. }] if env_iid == "env1"
    ));
}

#[tokio::test]
async fn failing_deploy_reports_error_once() {
    let h = Harness::with_connector(DryRunConnector::new().failing_on("CREATE TABLE"));
    let job = job(
        environment("env1", &["db1"]),
        ts(0),
        vec![database(
            "db1",
            DatabaseType::PostgreSQL,
            vec![model("m1", "users").field(field("f1", "name", "text")).build()],
        )],
    );

    assert_eq!(h.handle(JobKind::DeployVersion, &job, 1).await, Settlement::Ack);

    assert_eq!(h.status().await.as_deref(), Some("Error"));
    assert!(h.cached("env1.object").is_none());
    assert!(h.platform.documents("env1", "databases").is_empty());

    let sent = h.callbacks.sent();
    assert_eq!(sent.len(), 1);
    let payload = &sent[0].1;
    assert_eq!(payload.status, LogStatus::Error);
    let last = payload.logs.last().unwrap();
    assert_eq!(last.status, LogStatus::Error);
    let mut lines = last.message.lines();
    assert_eq!(lines.next(), Some("Deployment failed"));
    assert_eq!(lines.next(), Some("UnexpectedError"));
    assert_eq!(lines.next(), Some("statement rejected: CREATE TABLE"));
    assert!(lines.next().unwrap().starts_with("at "));
}

#[tokio::test]
async fn unsupported_database_fails_the_deployment() {
    let h = Harness::new();
    let job = job(
        environment("env1", &["db1"]),
        ts(0),
        vec![database("db1", DatabaseType::Oracle, vec![model("m1", "users").build()])],
    );

    assert_eq!(h.handle(JobKind::DeployVersion, &job, 1).await, Settlement::Ack);
    assert_eq!(h.status().await.as_deref(), Some("Error"));
    let sent = h.callbacks.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].1.logs.last().unwrap().message.contains("UnsupportedDatabase"));
}

#[tokio::test]
async fn busy_environment_defers_then_times_out() {
    let h = Harness::new();
    h.set_status("Deploying").await;

    let broker = MemoryBroker::new();
    let queue = QueueTopology::new(1, "").queue_name(JobKind::DeployVersion, 1);
    broker
        .publish(&queue, serde_json::to_vec(&deploy_job()).unwrap())
        .unwrap();
    let consumer = h.consumer();

    // default staleness window is ten minutes
    let delivery = broker.next(&queue).await.unwrap().unwrap();
    let settled = consumer
        .consume(JobKind::DeployVersion, delivery, ts(599))
        .await
        .unwrap();
    assert_eq!(settled, Settlement::Nack);
    assert_eq!(broker.nack_count(), 1);
    assert_eq!(broker.pending(&queue), 1);
    assert_eq!(h.status().await.as_deref(), Some("Deploying"));
    assert!(h.callbacks.sent().is_empty());
    assert!(!h.platform.has_database("env1"));

    let delivery = broker.next(&queue).await.unwrap().unwrap();
    assert!(delivery.redelivered());
    let settled = consumer
        .consume(JobKind::DeployVersion, delivery, ts(601))
        .await
        .unwrap();
    assert_eq!(settled, Settlement::Ack);
    assert_eq!(broker.ack_count(), 1);
    assert_eq!(broker.pending(&queue), 0);
    assert_eq!(h.status().await.as_deref(), Some("Error"));
    assert!(!h.platform.has_database("env1"));

    let sent = h.callbacks.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1.status, LogStatus::Error);
    assert_eq!(
        sent[0].1.logs[0].message,
        "App version deployment timed out due to waiting too long for the deployment to complete"
    );
    assert!(h.notifier.notifications().is_empty());
}

#[tokio::test]
async fn redeploy_timeout_sends_telemetry() {
    let h = Harness::new();
    h.set_status("Auto-deploying").await;

    let settled = h.handle(JobKind::RedeployVersion, &deploy_job(), 3600).await;
    assert_eq!(settled, Settlement::Ack);
    assert_eq!(h.status().await.as_deref(), Some("Error"));

    let notified = h.notifier.notifications();
    let [Notification::Realtime { channel, event }] = notified.as_slice() else {
        panic!("expected one realtime event, got {notified:?}");
    };
    assert_eq!(channel, "env1-id");
    assert_eq!(event.action, "telemetry");
    assert_eq!(event.object, "org.app.version.environment");
    assert_eq!(event.identifiers.env_id, "env1-id");
    assert_eq!(event.description, "App version redeployment timed out due to errors");
}

#[tokio::test]
async fn deleting_environment_skips_deployments() {
    let h = Harness::new();
    h.set_status("Deleting").await;

    assert_eq!(h.handle(JobKind::DeployVersion, &deploy_job(), 1).await, Settlement::Ack);
    assert_eq!(h.status().await.as_deref(), Some("Deleting"));
    assert!(h.callbacks.sent().is_empty());
    assert!(h.cached("env1.object").is_none());
}

#[tokio::test]
async fn malformed_payload_is_dropped() {
    let h = Harness::new();
    let settled = h
        .consumer()
        .handle_at(JobKind::DeployVersion, b"{not json", ts(0))
        .await;
    assert_eq!(settled, Settlement::Ack);
    assert!(h.callbacks.sent().is_empty());
}

/// Cache where another worker claims the environment right after every status read.
struct RacingCache {
    inner: MemoryCache,
}

#[async_trait]
impl KeyValueCache for RacingCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let value = self.inner.get(key).await?;
        if key.ends_with(".status") {
            self.inner.set(key, "Redeploying".to_string()).await?;
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: String) -> Result<(), CacheError> {
        self.inner.set(key, value).await
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&str>,
        value: &str,
    ) -> Result<bool, CacheError> {
        self.inner.compare_and_set(key, expected, value).await
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        self.inner.scan(pattern).await
    }

    async fn exec(&self, ops: Vec<CacheOp>) -> Result<(), CacheError> {
        self.inner.exec(ops).await
    }
}

#[tokio::test]
async fn lost_status_claim_is_requeued_untouched() {
    let cache = MemoryCache::new();
    let racing = Arc::new(RacingCache {
        inner: cache.clone(),
    });
    let h = Harness::with_cache(DryRunConnector::new(), cache, racing);
    h.set_status("OK").await;

    assert_eq!(h.handle(JobKind::DeployVersion, &deploy_job(), 1).await, Settlement::Nack);
    assert_eq!(h.status().await.as_deref(), Some("Redeploying"));
    assert!(h.callbacks.sent().is_empty());
    assert!(!h.platform.has_database("env1"));
}

/// Cache that refuses to mark an environment as OK.
struct StuckStatusCache {
    inner: MemoryCache,
}

#[async_trait]
impl KeyValueCache for StuckStatusCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: String) -> Result<(), CacheError> {
        if key.ends_with(".status") && value == "OK" {
            return Err(CacheError::unavailable("connection reset"));
        }
        self.inner.set(key, value).await
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&str>,
        value: &str,
    ) -> Result<bool, CacheError> {
        self.inner.compare_and_set(key, expected, value).await
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        self.inner.scan(pattern).await
    }

    async fn exec(&self, ops: Vec<CacheOp>) -> Result<(), CacheError> {
        self.inner.exec(ops).await
    }
}

#[tokio::test]
async fn ok_is_only_reported_once_the_status_is_ok() {
    let cache = MemoryCache::new();
    let stuck = Arc::new(StuckStatusCache {
        inner: cache.clone(),
    });
    let h = Harness::with_cache(DryRunConnector::new(), cache, stuck);

    assert_eq!(h.handle(JobKind::DeployVersion, &deploy_job(), 1).await, Settlement::Ack);

    assert_eq!(h.status().await.as_deref(), Some("Error"));
    let sent = h.callbacks.sent();
    assert_eq!(sent.len(), 1);
    let payload = &sent[0].1;
    assert_eq!(payload.status, LogStatus::Error);
    let messages: Vec<&str> = payload.logs.iter().map(|e| e.message.as_str()).collect();
    assert!(!messages.contains(&"Completed deployment successfully"));
    assert!(messages.last().unwrap().starts_with("Deployment failed"));
}

#[tokio::test]
async fn redeploy_applies_the_model_diff_and_drops_removed_databases() {
    let h = Harness::new();
    let mut first = job(
        environment("env1", &["db1", "db2"]),
        ts(0),
        vec![
            users("name", 0),
            database(
                "db2",
                DatabaseType::MongoDB,
                vec![model("m9", "audit").build()],
            ),
        ],
    );
    first.functions = vec![json!({"iid": "fn1"})];
    assert_eq!(h.handle(JobKind::DeployVersion, &first, 1).await, Settlement::Ack);

    let tenant = h.connector.documents();
    tenant
        .insert_many("db1_db", "users", vec![json!({"name": "ada", "legacy": 1})])
        .await
        .unwrap();
    assert!(tenant.has_database("db2_db"));
    h.cache
        .set("env1.stale", "leftover".to_string())
        .await
        .unwrap();

    let mut renamed = users("fullName", 10);
    renamed.models[0].fields.retain(|f| f.iid != "f2");
    let second = job(environment("env1", &["db1"]), ts(20), vec![renamed]);
    assert_eq!(h.handle(JobKind::RedeployVersion, &second, 21).await, Settlement::Ack);

    assert_eq!(h.status().await.as_deref(), Some("OK"));
    assert_eq!(tenant.documents("db1_db", "users"), vec![json!({"fullName": "ada"})]);
    assert!(!tenant.has_database("db2_db"));
    assert!(h.cached("env1.stale").is_none());
    assert!(h.cached("env1.db.db2").is_none());
    assert_eq!(h.cached("env1.functions").unwrap(), json!([]));

    let saved = h.platform.documents("env1", "databases");
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0]["models"][0]["fields"][0]["name"], "fullName");

    let redeploy = &h.callbacks.sent()[1].1;
    assert_eq!(redeploy.status, LogStatus::Ok);
    let messages: Vec<&str> = redeploy.logs.iter().map(|e| e.message.as_str()).collect();
    assert!(messages.contains(&"Started deleting MongoDB database db2_db"));
    assert_eq!(messages.last(), Some(&"Completed redeployment successfully"));
}

#[tokio::test]
async fn stale_delete_goes_ahead_and_clears_everything() {
    let h = Harness::new();
    assert_eq!(h.handle(JobKind::DeployVersion, &deploy_job(), 1).await, Settlement::Ack);
    h.cache
        .set("sessions.env1.u1", "token".to_string())
        .await
        .unwrap();
    h.set_status("Deploying").await;

    let mut delete = deploy_job();
    delete.databases.clear();
    assert_eq!(h.handle(JobKind::DeleteEnvironment, &delete, 60).await, Settlement::Nack);
    assert_eq!(h.handle(JobKind::DeleteEnvironment, &delete, 700).await, Settlement::Ack);

    assert_eq!(h.status().await.as_deref(), Some("OK"));
    assert!(h.cached("env1.object").is_none());
    assert!(h.cache.snapshot().get("sessions.env1.u1").is_none());
    assert!(!h.platform.has_database("env1"));
    assert!(!h.connector.documents().has_database("db1_db"));
    assert!(!h.ctx.connections.contains(&pooled_db1(), DatabaseType::MongoDB));

    let last = &h.callbacks.sent()[1].1;
    assert_eq!(
        last.logs.last().unwrap().message,
        "Completed environment deletion successfully"
    );
}

#[tokio::test]
async fn delete_survives_a_database_that_cannot_be_dropped() {
    let h = Harness::with_connector(DryRunConnector::new().failing_on("DROP DATABASE"));
    let deploy = job(
        environment("env1", &["db1", "db2"]),
        ts(0),
        vec![
            database(
                "db1",
                DatabaseType::PostgreSQL,
                vec![model("m1", "users").field(field("f1", "name", "text")).build()],
            ),
            database("db2", DatabaseType::MongoDB, vec![model("m2", "audit").build()]),
        ],
    );
    assert_eq!(h.handle(JobKind::DeployVersion, &deploy, 1).await, Settlement::Ack);
    assert!(h.connector.documents().has_database("db2_db"));

    assert_eq!(h.handle(JobKind::DeleteEnvironment, &deploy, 2).await, Settlement::Ack);

    assert_eq!(h.status().await.as_deref(), Some("OK"));
    assert!(!h.connector.documents().has_database("db2_db"));
    assert!(!h.platform.has_database("env1"));
    assert!(!h
        .ctx
        .connections
        .contains(&connection_id("res-db1", "db1"), DatabaseType::PostgreSQL));

    let delete = &h.callbacks.sent()[1].1;
    assert_eq!(delete.status, LogStatus::Ok);
    let messages: Vec<&str> = delete.logs.iter().map(|e| e.message.as_str()).collect();
    assert!(messages.contains(&"Completed deleting 'MongoDB' database 'db2_db'"));
    assert!(!messages
        .iter()
        .any(|m| m.starts_with("Completed deleting 'PostgreSQL'")));
    assert_eq!(
        messages.last(),
        Some(&"Completed environment deletion successfully")
    );
}

#[tokio::test]
async fn undeploy_can_keep_tenant_data() {
    let h = Harness::new();
    assert_eq!(h.handle(JobKind::DeployVersion, &deploy_job(), 1).await, Settlement::Ack);

    let mut undeploy = deploy_job();
    undeploy.drop_data = Some(false);
    assert_eq!(h.handle(JobKind::UndeployVersion, &undeploy, 2).await, Settlement::Ack);

    assert_eq!(h.status().await.as_deref(), Some("OK"));
    assert!(h.cached("env1.object").is_none());
    assert!(!h.platform.has_database("env1"));
    assert!(h.connector.documents().has_database("db1_db"));
}

#[tokio::test]
async fn endpoint_deletion_purges_their_logs() {
    let h = Harness::new();
    let mut deploy = deploy_job();
    deploy.endpoints = vec![
        json!({"iid": "e1", "_id": "id1"}),
        json!({"iid": "e2", "_id": "id2"}),
    ];
    assert_eq!(h.handle(JobKind::DeployVersion, &deploy, 1).await, Settlement::Ack);
    h.platform
        .insert_many(
            "env1",
            "endpoint_logs",
            vec![json!({"endpointId": "id1"}), json!({"endpointId": "id2"})],
        )
        .await
        .unwrap();

    let mut update = deploy_job();
    update.databases.clear();
    update.sub_action = SubAction::Delete;
    update.endpoints = vec![json!({"iid": "e1", "_id": "id1"})];
    assert_eq!(h.handle(JobKind::UpdateEndpoints, &update, 2).await, Settlement::Ack);

    let remaining = json!([{"iid": "e2", "_id": "id2"}]);
    assert_eq!(h.cached("env1.endpoints").unwrap(), remaining);
    assert_eq!(Value::Array(h.platform.documents("env1", "endpoints")), remaining);
    let logs = h
        .platform
        .find("env1", "endpoint_logs", &DocFilter::All)
        .await
        .unwrap();
    assert_eq!(logs, vec![json!({"endpointId": "id2"})]);
    assert_eq!(h.status().await.as_deref(), Some("OK"));
}

#[tokio::test]
async fn every_metadata_kind_is_cached_and_saved() {
    let h = Harness::new();
    let mut deploy = deploy_job();
    deploy.middlewares = vec![json!({"iid": "mw1"})];
    deploy.queues = vec![json!({"iid": "q1", "_id": "qid1"})];
    deploy.tasks = vec![json!({"iid": "t1", "_id": "tid1"})];
    deploy.storages = vec![json!({"iid": "s1"})];
    deploy.caches = vec![json!({"iid": "c1"})];
    assert_eq!(h.handle(JobKind::DeployVersion, &deploy, 1).await, Settlement::Ack);

    for (kind, iid) in [
        ("middlewares", "mw1"),
        ("queues", "q1"),
        ("tasks", "t1"),
        ("storages", "s1"),
        ("caches", "c1"),
    ] {
        assert_eq!(h.cached(&format!("env1.{kind}")).unwrap()[0]["iid"], iid);
        assert_eq!(h.platform.documents("env1", kind)[0]["iid"], iid);
    }
}

#[tokio::test]
async fn redeploy_clears_tracking_of_removed_queues_and_tasks() {
    let h = Harness::new();
    let mut first = deploy_job();
    first.queues = vec![
        json!({"iid": "q1", "_id": "qid1"}),
        json!({"iid": "q2", "_id": "qid2"}),
    ];
    first.tasks = vec![json!({"iid": "t1", "_id": "tid1"})];
    assert_eq!(h.handle(JobKind::DeployVersion, &first, 1).await, Settlement::Ack);

    for (collection, docs) in [
        ("queue_logs", vec![json!({"queueId": "qid1"}), json!({"queueId": "qid2"})]),
        ("messages", vec![json!({"queueId": "q1"}), json!({"queueId": "q2"})]),
        ("cronjob_logs", vec![json!({"taskId": "tid1"})]),
        ("cronjobs", vec![json!({"taskId": "t1"})]),
    ] {
        h.platform.insert_many("env1", collection, docs).await.unwrap();
    }

    let mut second = deploy_job();
    second.timestamp = ts(10);
    second.queues = vec![json!({"iid": "q2", "_id": "qid2"})];
    assert_eq!(h.handle(JobKind::RedeployVersion, &second, 11).await, Settlement::Ack);

    assert_eq!(h.platform.documents("env1", "queue_logs"), vec![json!({"queueId": "qid2"})]);
    assert_eq!(h.platform.documents("env1", "messages"), vec![json!({"queueId": "q2"})]);
    assert!(h.platform.documents("env1", "cronjob_logs").is_empty());
    assert!(h.platform.documents("env1", "cronjobs").is_empty());
    assert_eq!(h.cached("env1.tasks").unwrap(), json!([]));

    let messages: Vec<String> = h.callbacks.sent()[1]
        .1
        .logs
        .iter()
        .map(|e| e.message.clone())
        .collect();
    assert!(messages.contains(&"Cleared queue logs and tracking entries".to_string()));
    assert!(messages.contains(&"Cleared task logs and tracking entries".to_string()));
}

#[tokio::test]
async fn function_updates_merge_into_the_cached_list() {
    let h = Harness::new();
    let mut deploy = deploy_job();
    deploy.functions = vec![json!({"iid": "f1", "v": 1})];
    assert_eq!(h.handle(JobKind::DeployVersion, &deploy, 1).await, Settlement::Ack);
    // functions are not blocked by a running deployment
    h.set_status("Deploying").await;

    let mut update = deploy_job();
    update.databases.clear();
    update.sub_action = SubAction::Add;
    update.functions = vec![json!({"iid": "f2", "v": 1})];
    assert_eq!(h.handle(JobKind::UpdateFunctions, &update, 2).await, Settlement::Ack);

    assert_eq!(
        h.cached("env1.functions").unwrap(),
        json!([{"iid": "f1", "v": 1}, {"iid": "f2", "v": 1}])
    );
    assert_eq!(h.platform.documents("env1", "functions").len(), 2);
}

#[tokio::test]
async fn resource_access_update_rewires_the_database() {
    let h = Harness::new();
    assert_eq!(h.handle(JobKind::DeployVersion, &deploy_job(), 1).await, Settlement::Ack);
    assert!(h.ctx.connections.contains(&pooled_db1(), DatabaseType::MongoDB));

    let mut changed = resource("res-db1");
    changed.resource_type = "database".to_string();
    changed.access.host = "replica.internal".to_string();
    let mut update = deploy_job();
    update.databases.clear();
    update.updated_resource = Some(changed);
    assert_eq!(
        h.handle(JobKind::UpdateResourceAccess, &update, 2).await,
        Settlement::Ack
    );

    assert_eq!(
        h.cached("env1.db.db1").unwrap()["resource"]["access"]["host"],
        "replica.internal"
    );
    assert_eq!(
        h.cached("env1.databases").unwrap()[0]["resource"]["access"]["host"],
        "replica.internal"
    );
    let saved = h.platform.documents("env1", "databases");
    assert_eq!(saved[0]["resource"]["access"]["host"], "replica.internal");
    assert!(!h.ctx.connections.contains(&pooled_db1(), DatabaseType::MongoDB));
}

#[tokio::test]
async fn resource_access_update_requires_a_resource() {
    let h = Harness::new();
    let mut update = deploy_job();
    update.databases.clear();

    assert_eq!(
        h.handle(JobKind::UpdateResourceAccess, &update, 1).await,
        Settlement::Ack
    );
    assert_eq!(h.status().await.as_deref(), Some("Error"));
    let sent = h.callbacks.sent();
    assert!(sent[0].1.logs.last().unwrap().message.contains("InvalidJobError"));
}

#[tokio::test]
async fn callbacks_reach_the_platform_with_the_master_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/env/log"))
        .and(header("authorization", "Bearer master"))
        .and(body_partial_json(json!({"status": "OK", "type": "db"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let cache = Arc::new(MemoryCache::new());
    let ctx = EngineContext::new(
        EngineConfig::default(),
        cache.clone(),
        Arc::new(MemoryDocumentStore::new()),
        Arc::new(ConnectionManager::new(Arc::new(DryRunConnector::new()))),
        Arc::new(CallbackClient::new("master", Duration::from_secs(5)).unwrap()),
        Arc::new(RecordingNotifier::new()),
    );
    let mut job = deploy_job();
    job.callback = Some(format!("{}/env/log", server.uri()));

    let settled = JobConsumer::new(ctx)
        .handle_at(JobKind::DeployVersion, &serde_json::to_vec(&job).unwrap(), ts(1))
        .await;
    assert_eq!(settled, Settlement::Ack);
    assert_eq!(cache.get("env1.status").await.unwrap().as_deref(), Some("OK"));
}

#[tokio::test]
async fn sharded_consumers_drain_every_queue() {
    let h = Harness::new();
    let broker = Arc::new(MemoryBroker::new());
    let topology = QueueTopology::new(2, "-test");

    broker
        .publish(
            &topology.pick(JobKind::DeployVersion),
            serde_json::to_vec(&deploy_job()).unwrap(),
        )
        .unwrap();

    let consumer = h.consumer();
    let source: Arc<dyn JobSource> = broker.clone();
    let running = tokio::spawn(async move { consumer.run(source, &topology).await });

    for _ in 0..100 {
        if broker.ack_count() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    broker.close();
    running.await.unwrap().unwrap();

    assert_eq!(broker.ack_count(), 1);
    assert_eq!(h.status().await.as_deref(), Some("OK"));
}
