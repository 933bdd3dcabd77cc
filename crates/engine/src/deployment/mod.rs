//! Deployment orchestrator.
//!
//! One [`DeploymentManager`] runs one admitted job: it claims the environment
//! status, walks the workflow's phases while recording an operation log, and
//! reports the log to the job's callback whatever the result. Cache writes
//! are queued in a pipeline and flushed once the schema work went through.

mod internal;
mod store;

pub use store::{EnvironmentStore, Tracked};

use crate::error::EngineError;
use crate::keys;
use crate::oplog::OpLog;
use crate::EngineContext;
use catalog::process_database;
use chrono::SecondsFormat;
use common::types::{DatabaseConfig, EnvStatus, Job, JobKind, SubAction};
use executor::{connection_id, create_backend, reconcile, SchemaBackend};
use serde_json::{json, Value};
use shared_clients::cache::CachePipeline;
use shared_clients::callback::{CallbackPayload, LogStatus};
use tracing::{info, warn};

#[derive(Debug)]
pub enum Outcome {
    Succeeded,
    Failed(EngineError),
    /// The status changed between admission and the claim; nothing ran.
    Preempted,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded)
    }
}

struct Labels {
    started: &'static str,
    completed: &'static str,
    failed: &'static str,
}

fn labels(kind: JobKind) -> Labels {
    let (started, completed, failed) = match kind {
        JobKind::DeployVersion => (
            "Started deployment",
            "Completed deployment successfully",
            "Deployment failed",
        ),
        JobKind::RedeployVersion => (
            "Started redeployment",
            "Completed redeployment successfully",
            "Redeployment failed",
        ),
        JobKind::UndeployVersion => (
            "Started undeployment",
            "Completed undeployment successfully",
            "Undeployment failed",
        ),
        JobKind::DeleteEnvironment => (
            "Started environment deletion",
            "Completed environment deletion successfully",
            "Environment deletion failed",
        ),
        JobKind::UpdateEndpoints => (
            "Started updating endpoints",
            "Completed endpoint updates successfully",
            "Endpoint updates failed",
        ),
        JobKind::UpdateFunctions => (
            "Started updating functions",
            "Completed function updates successfully",
            "Function updates failed",
        ),
        JobKind::UpdateResourceAccess => (
            "Started updating resource access settings",
            "Completed resource access settings update successfully",
            "Resource access settings update failed",
        ),
    };
    Labels {
        started,
        completed,
        failed,
    }
}

/// Status an environment carries while a job of `kind` runs on it.
pub fn running_status(kind: JobKind) -> EnvStatus {
    match kind {
        JobKind::DeployVersion => EnvStatus::Deploying,
        JobKind::RedeployVersion => EnvStatus::Redeploying,
        JobKind::UndeployVersion => EnvStatus::Undeploying,
        JobKind::DeleteEnvironment => EnvStatus::Deleting,
        JobKind::UpdateEndpoints | JobKind::UpdateFunctions | JobKind::UpdateResourceAccess => {
            EnvStatus::Deploying
        }
    }
}

fn iid_of(item: &Value) -> Option<&str> {
    item.get("iid").and_then(Value::as_str)
}

fn same_iid(a: &Value, b: &Value) -> bool {
    matches!((iid_of(a), iid_of(b)), (Some(x), Some(y)) if x == y)
}

/// Merges a metadata update into the previously deployed list.
pub fn merge_by_iid(previous: Vec<Value>, incoming: &[Value], sub_action: SubAction) -> Vec<Value> {
    match sub_action {
        SubAction::Set => incoming.to_vec(),
        SubAction::Add => previous.into_iter().chain(incoming.iter().cloned()).collect(),
        SubAction::Update if previous.is_empty() => incoming.to_vec(),
        SubAction::Update => previous
            .into_iter()
            .map(|item| {
                incoming
                    .iter()
                    .find(|update| same_iid(update, &item))
                    .cloned()
                    .unwrap_or(item)
            })
            .collect(),
        SubAction::Delete => previous
            .into_iter()
            .filter(|item| !incoming.iter().any(|gone| same_iid(gone, item)))
            .collect(),
    }
}

pub struct DeploymentManager {
    ctx: EngineContext,
    job: Job,
    log: OpLog,
    pipeline: CachePipeline,
    store: EnvironmentStore,
}

impl DeploymentManager {
    pub fn new(ctx: EngineContext, job: Job) -> Self {
        let store = EnvironmentStore::new(ctx.platform.clone(), job.env_iid());
        Self {
            ctx,
            job,
            log: OpLog::new(),
            pipeline: CachePipeline::new(),
            store,
        }
    }

    pub fn log(&self) -> &OpLog {
        &self.log
    }

    pub fn into_log(self) -> OpLog {
        self.log
    }

    fn env(&self) -> &str {
        self.job.env_iid()
    }

    /// Runs the workflow of `kind`. `observed` is the raw status value the
    /// job was admitted against; the claim only succeeds if it is unchanged.
    pub async fn run(&mut self, kind: JobKind, observed: Option<&str>) -> Outcome {
        let labels = labels(kind);
        self.log.add(labels.started);

        match self.claim(kind, observed).await {
            Ok(true) => {}
            Ok(false) => {
                info!(env = self.env(), %kind, "environment status changed since admission");
                return Outcome::Preempted;
            }
            Err(err) => return self.fail(labels.failed, err).await,
        }

        let result = match kind {
            JobKind::DeployVersion => self.deploy(false).await,
            JobKind::RedeployVersion => self.deploy(true).await,
            JobKind::UndeployVersion => {
                let drop_data = self.job.drops_data();
                self.undeploy(drop_data).await
            }
            JobKind::DeleteEnvironment => self.undeploy(true).await,
            JobKind::UpdateEndpoints => self.update_endpoints().await,
            JobKind::UpdateFunctions => self.update_functions().await,
            JobKind::UpdateResourceAccess => self.update_resource_access().await,
        };

        // the platform only hears OK once the status says so
        let result = match result {
            Ok(()) => self.set_status(EnvStatus::Ok).await,
            Err(err) => Err(err),
        };
        match result {
            Ok(()) => {
                self.log.add(labels.completed);
                self.send_logs(LogStatus::Ok).await;
                Outcome::Succeeded
            }
            Err(err) => self.fail(labels.failed, err).await,
        }
    }

    async fn claim(&self, kind: JobKind, observed: Option<&str>) -> Result<bool, EngineError> {
        let target = running_status(kind);
        Ok(self
            .ctx
            .cache
            .compare_and_set(&keys::status(self.env()), observed, target.as_str())
            .await?)
    }

    async fn set_status(&self, status: EnvStatus) -> Result<(), EngineError> {
        self.ctx
            .cache
            .set(&keys::status(self.env()), status.as_str().to_string())
            .await?;
        Ok(())
    }

    async fn fail(&mut self, label: &str, err: EngineError) -> Outcome {
        self.pipeline.discard();
        if let Err(status_err) = self.set_status(EnvStatus::Error).await {
            warn!(env = self.env(), "could not record failed status: {status_err}");
        }
        let stack = err.stack();
        let details = [label, err.name(), err.message(), stack.as_str()].join("\n");
        self.log.fail(details);
        self.send_logs(LogStatus::Error).await;
        Outcome::Failed(err)
    }

    async fn send_logs(&self, status: LogStatus) {
        let Some(url) = self.job.callback.as_deref() else {
            return;
        };
        let payload = CallbackPayload::db(status, self.log.entries().to_vec());
        if let Err(err) = self.ctx.callbacks.send(url, &payload).await {
            warn!(env = self.env(), url, "callback delivery failed: {err}");
        }
    }

    async fn notify_api_servers(&self) {
        let message = json!({
            "action": self.job.action,
            "subAction": self.job.sub_action,
            "callback": self.job.callback,
            "actor": self.job.actor,
            "app": self.job.app,
            "env": self.job.env,
        });
        self.ctx.notifier.api_servers(self.env(), message).await;
    }

    /// Queues the removal of every key matching `pattern`, except the status.
    async fn clear_cached(&mut self, pattern: &str) -> Result<(), EngineError> {
        let status = keys::status(self.env());
        for key in self.ctx.cache.scan(pattern).await? {
            if key != status {
                self.pipeline.delete(key);
            }
        }
        Ok(())
    }

    fn cache_environment(&mut self) -> Result<(), EngineError> {
        let env = self.env().to_string();
        self.pipeline.set_json(keys::object(&env), &self.job.env)?;
        self.pipeline.set(
            keys::timestamp(&env),
            self.job
                .timestamp
                .to_rfc3339_opts(SecondsFormat::Millis, true),
        );
        Ok(())
    }

    /// Cached list under `key`, or the persisted `collection` when the cache lost it.
    async fn previous_list(&self, key: &str, collection: &str) -> Result<Vec<Value>, EngineError> {
        match self.ctx.cache.get(key).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => self.store.list(collection).await,
        }
    }

    fn backend(&self, db: &DatabaseConfig) -> Result<Box<dyn SchemaBackend>, EngineError> {
        if db.resource.is_none() {
            return Err(EngineError::missing_resource(format!(
                "no database server is mapped to '{}' database '{}'",
                db.db_type, db.name
            )));
        }
        Ok(create_backend(
            self.env(),
            db,
            self.ctx.connections.clone(),
            self.ctx.backend_settings(),
        )?)
    }

    /// Processes the job's models, resolves each database's server and
    /// queues the per-database cache entries.
    fn load_databases(
        &mut self,
        previous: &[DatabaseConfig],
    ) -> Result<Vec<DatabaseConfig>, EngineError> {
        let env = self.env().to_string();
        let mut databases = self.job.databases.clone();
        for db in &mut databases {
            process_database(db)?;
            let prev = previous.iter().find(|p| p.iid == db.iid);
            if let Some(resource) = self.job.env.resource_for(&db.iid) {
                db.resource = Some(resource.clone());
            } else if let Some(resource) = prev.and_then(|p| p.resource.clone()) {
                db.resource = Some(resource);
            }
            self.pipeline.set_json(keys::database(&env, &db.iid), &*db)?;
            self.log.add(format!(
                "Loaded and cached '{}' database '{}' and its associated models",
                db.db_type, db.name
            ));
        }
        Ok(databases)
    }

    fn cache_metadata(&mut self, databases: &[DatabaseConfig]) -> Result<(), EngineError> {
        let env = self.env().to_string();
        self.pipeline.set_json(keys::databases(&env), databases)?;
        for (kind, items) in store::metadata(&self.job) {
            self.pipeline.set_json(keys::metadata(&env, kind), items)?;
        }
        self.log.add("Cached application metadata");
        Ok(())
    }

    async fn prepare_databases(
        &mut self,
        databases: &[DatabaseConfig],
        previous: &[DatabaseConfig],
        redeploy: bool,
    ) -> Result<(), EngineError> {
        for db in databases.iter().filter(|db| db.managed) {
            self.log.add(format!(
                "Started preparing database schema for '{}' database '{}'",
                db.db_type, db.name
            ));
            let mut backend = self.backend(db)?;
            backend.create_database().await?;

            match previous.iter().find(|p| p.iid == db.iid) {
                Some(prev) if redeploy => {
                    if let Some(changes) = catalog::diff(Some(prev.models.as_slice()), &db.models) {
                        reconcile::apply_changes(backend.as_mut(), &changes, &mut self.log)
                            .await?;
                    }
                }
                _ => reconcile::deploy_models(backend.as_mut(), &db.models, &mut self.log).await?,
            }

            self.log.add(format!(
                "Completed preparing '{}' database '{}' schema and its associated models",
                db.db_type, db.name
            ));
        }
        Ok(())
    }

    /// Drops the managed databases. A database that cannot be dropped is
    /// reported and left behind; the rest of the workflow goes on.
    async fn drop_databases(&mut self, databases: &[DatabaseConfig]) {
        for db in databases.iter().filter(|db| db.managed) {
            self.log
                .add(format!("Started deleting {} database {}", db.db_type, db.name));
            let mut target = db.clone();
            if let Some(resource) = self.job.env.resource_for(&db.iid) {
                target.resource = Some(resource.clone());
            }
            match self.drop_database(&target).await {
                Ok(()) => self.log.add(format!(
                    "Completed deleting '{}' database '{}'",
                    db.db_type, db.name
                )),
                Err(err) => warn!(
                    env = self.env(),
                    database = %db.name,
                    "could not delete database: {err}"
                ),
            }
            if let Some(resource) = &target.resource {
                let conn_id = connection_id(&resource.iid, &db.iid);
                self.ctx.connections.remove_connection(&conn_id).await;
            }
        }
    }

    async fn drop_database(&self, db: &DatabaseConfig) -> Result<(), EngineError> {
        let mut backend = self.backend(db)?;
        backend.drop_database().await?;
        Ok(())
    }

    /// Clears the logs and tracking entries of `kind` objects the job no
    /// longer carries.
    async fn purge_removed(&mut self, kind: Tracked) -> Result<(), EngineError> {
        let previous = self.store.list(kind.collection()).await?;
        let current = store::metadata(&self.job)
            .into_iter()
            .find(|(collection, _)| *collection == kind.collection())
            .map(|(_, items)| items)
            .unwrap_or_default();
        let removed: Vec<Value> = previous
            .into_iter()
            .filter(|prev| !current.iter().any(|item| same_iid(item, prev)))
            .collect();
        if removed.is_empty() {
            return Ok(());
        }
        self.store.purge_tracking(kind, &removed).await?;
        self.log
            .add(format!("Cleared {} logs and tracking entries", kind.as_str()));
        Ok(())
    }

    async fn deploy(&mut self, redeploy: bool) -> Result<(), EngineError> {
        let env = self.env().to_string();
        let previous = self.store.databases().await?;
        if redeploy {
            self.clear_cached(&keys::env_pattern(&env)).await?;
        }
        self.cache_environment()?;

        let databases = self.load_databases(&previous)?;
        self.cache_metadata(&databases)?;
        self.store.ensure_internal_collections(&mut self.log).await?;
        logging::timeit!(format!("prepared database schemas of {env}"), {
            self.prepare_databases(&databases, &previous, redeploy).await?
        });

        let removed: Vec<DatabaseConfig> = previous
            .into_iter()
            .filter(|p| !databases.iter().any(|db| db.iid == p.iid))
            .collect();
        self.drop_databases(&removed).await;
        for kind in [Tracked::Queue, Tracked::Task] {
            self.purge_removed(kind).await?;
        }

        self.store.save_deployment(&self.job, &databases).await?;
        self.log.add("Saved deployment configuration to database");

        self.pipeline.commit(self.ctx.cache.as_ref()).await?;
        self.notify_api_servers().await;
        Ok(())
    }

    async fn undeploy(&mut self, drop_data: bool) -> Result<(), EngineError> {
        let env = self.env().to_string();
        self.clear_cached(&keys::env_pattern(&env)).await?;
        if drop_data {
            for prefix in keys::DATA_NAMESPACES {
                self.clear_cached(&keys::namespace(prefix, &env)).await?;
            }
            let previous = self.store.databases().await?;
            self.drop_databases(&previous).await;
        }

        self.store.drop().await?;
        self.log.add("Deleted internal environment configuration database");
        self.pipeline.commit(self.ctx.cache.as_ref()).await?;
        Ok(())
    }

    async fn update_endpoints(&mut self) -> Result<(), EngineError> {
        let env = self.env().to_string();
        self.cache_environment()?;

        let previous = self
            .previous_list(&keys::metadata(&env, store::ENDPOINTS), store::ENDPOINTS)
            .await?;
        let endpoints = merge_by_iid(previous, &self.job.endpoints, self.job.sub_action);
        self.pipeline
            .set_json(keys::metadata(&env, store::ENDPOINTS), &endpoints)?;
        self.pipeline.commit(self.ctx.cache.as_ref()).await?;
        self.notify_api_servers().await;

        if self.job.sub_action == SubAction::Delete {
            self.store
                .purge_tracking(Tracked::Endpoint, &self.job.endpoints)
                .await?;
            self.log.add("Cleared endpoint logs and tracking entries");
        }

        self.store.save_list(store::ENDPOINTS, &endpoints).await?;
        self.store.save_environment(&self.job.env).await
    }

    async fn update_functions(&mut self) -> Result<(), EngineError> {
        let env = self.env().to_string();
        self.cache_environment()?;

        let previous = self
            .previous_list(&keys::metadata(&env, store::FUNCTIONS), store::FUNCTIONS)
            .await?;
        let functions = merge_by_iid(previous, &self.job.functions, self.job.sub_action);
        self.pipeline
            .set_json(keys::metadata(&env, store::FUNCTIONS), &functions)?;
        self.pipeline.commit(self.ctx.cache.as_ref()).await?;
        self.notify_api_servers().await;

        self.store.save_list(store::FUNCTIONS, &functions).await?;
        self.store.save_environment(&self.job.env).await
    }

    async fn update_resource_access(&mut self) -> Result<(), EngineError> {
        let env = self.env().to_string();
        let resource = self.job.updated_resource.clone().ok_or_else(|| {
            EngineError::invalid_job("resource access update without an updated resource")
        })?;
        self.cache_environment()?;

        let mut updated = None;
        if resource.resource_type == "database" {
            let mut databases = self.store.databases().await?;
            let impacted = databases.iter_mut().find(|db| {
                db.resource
                    .as_ref()
                    .is_some_and(|current| current.iid == resource.iid)
            });
            if let Some(db) = impacted {
                db.resource = Some(resource.clone());
                self.pipeline.set_json(keys::database(&env, &db.iid), &*db)?;
                let iid = db.iid.clone();
                self.pipeline.set_json(keys::databases(&env), &databases)?;
                updated = Some((iid, databases));
            }
        }

        self.pipeline.commit(self.ctx.cache.as_ref()).await?;
        self.notify_api_servers().await;

        if let Some((iid, databases)) = updated {
            self.store.save_databases(&databases).await?;
            // reconnect with the new credentials
            self.ctx
                .connections
                .remove_connection(&connection_id(&resource.iid, &iid))
                .await;
        }
        self.store.save_environment(&self.job.env).await
    }
}
