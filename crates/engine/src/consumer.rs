//! Queue consumer: admits, runs and settles job messages.
//!
//! Every received message is settled exactly once. A nack only ever means
//! "try again later" (the environment is busy or the claim was lost); failed
//! workflows are acknowledged and reported through their callback instead.

use crate::admission::{self, Decision};
use crate::deployment::{DeploymentManager, Outcome};
use crate::keys;
use crate::oplog::OpLog;
use crate::EngineContext;
use chrono::{DateTime, TimeDelta, Utc};
use common::types::{EnvStatus, Job, JobKind};
use serde_json::Value;
use shared_clients::callback::{CallbackPayload, LogStatus};
use shared_clients::notifier::{Identifiers, RealtimeEvent};
use shared_clients::queue::{Delivery, JobSource, QueueError, QueueTopology};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Ack,
    Nack,
}

#[derive(Clone)]
pub struct JobConsumer {
    ctx: EngineContext,
}

impl JobConsumer {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    fn max_wait(&self) -> TimeDelta {
        TimeDelta::from_std(self.ctx.config.general.max_message_wait()).unwrap_or(TimeDelta::MAX)
    }

    /// Handles one payload as if it was received at `now`.
    pub async fn handle_at(&self, kind: JobKind, payload: &[u8], now: DateTime<Utc>) -> Settlement {
        let job = match Job::from_slice(payload) {
            Ok(job) => job,
            Err(err) => {
                error!(%kind, "dropping malformed job message: {err}");
                return Settlement::Ack;
            }
        };

        let env = job.env_iid().to_string();
        let observed = match self.ctx.cache.get(&keys::status(&env)).await {
            Ok(observed) => observed,
            Err(err) => {
                warn!(env, %kind, "could not read environment status: {err}");
                return Settlement::Nack;
            }
        };
        let status = observed
            .as_deref()
            .and_then(|raw| raw.parse::<EnvStatus>().ok());

        match admission::decide(kind, status, now - job.timestamp, self.max_wait()) {
            Decision::Defer => {
                debug!(env, %kind, ?status, "environment busy, deferring job");
                Settlement::Nack
            }
            Decision::Skip => {
                info!(env, %kind, "environment is being deleted, skipping job");
                Settlement::Ack
            }
            Decision::TimeOut => {
                self.time_out(kind, &job, now).await;
                Settlement::Ack
            }
            Decision::Process => self.process(kind, job, observed.as_deref()).await,
        }
    }

    async fn process(&self, kind: JobKind, job: Job, observed: Option<&str>) -> Settlement {
        let env = job.env.clone();
        info!(
            env = %env.iid,
            app = %job.app.name,
            version = %env.version.name,
            "processing {kind} job"
        );

        let mut manager = DeploymentManager::new(self.ctx.clone(), job);
        match manager.run(kind, observed).await {
            Outcome::Succeeded => Settlement::Ack,
            Outcome::Preempted => Settlement::Nack,
            Outcome::Failed(err) => {
                error!(
                    org_id = %env.org_id,
                    app_id = %env.app_id,
                    version_id = %env.version_id,
                    env_id = %env.id,
                    name = err.name(),
                    message = err.message(),
                    stack = %err.stack(),
                    "{kind} job failed"
                );
                Settlement::Ack
            }
        }
    }

    async fn time_out(&self, kind: JobKind, job: &Job, now: DateTime<Utc>) {
        let env = job.env_iid();
        let message = admission::timeout_message(kind);

        if let Err(err) = self
            .ctx
            .cache
            .set(&keys::status(env), EnvStatus::Error.as_str().to_string())
            .await
        {
            warn!(env, "could not record timed out status: {err}");
        }

        if kind == JobKind::RedeployVersion {
            let event = RealtimeEvent {
                actor: job.actor.clone(),
                action: "telemetry".to_string(),
                object: "org.app.version.environment".to_string(),
                description: message.to_string(),
                timestamp: now,
                data: serde_json::to_value(job).unwrap_or(Value::Null),
                identifiers: Identifiers {
                    org_id: job.env.org_id.clone(),
                    app_id: job.env.app_id.clone(),
                    version_id: job.env.version_id.clone(),
                    env_id: job.env.id.clone(),
                },
            };
            self.ctx.notifier.realtime(&job.env.id, event).await;
        }

        if let Some(url) = job.callback.as_deref() {
            let mut log = OpLog::new();
            log.fail(message);
            let payload = CallbackPayload::db(LogStatus::Error, log.into_entries());
            if let Err(err) = self.ctx.callbacks.send(url, &payload).await {
                warn!(env, url, "callback delivery failed: {err}");
            }
        }

        info!(
            "{kind} timed out for app '{}' version '{}' to environment '{}'",
            job.app.name, job.env.version.name, job.env.name
        );
    }

    /// Handles and settles one delivery.
    pub async fn consume(
        &self,
        kind: JobKind,
        delivery: Box<dyn Delivery>,
        now: DateTime<Utc>,
    ) -> Result<Settlement, QueueError> {
        if delivery.redelivered() {
            debug!(%kind, "received redelivered message");
        }
        let payload = delivery.payload().to_vec();
        let settlement = self.handle_at(kind, &payload, now).await;
        match settlement {
            Settlement::Ack => delivery.ack().await?,
            Settlement::Nack => delivery.nack().await?,
        }
        Ok(settlement)
    }

    /// Consumes `queue` one message at a time until the source closes.
    pub async fn run_queue(
        &self,
        source: Arc<dyn JobSource>,
        kind: JobKind,
        queue: String,
    ) -> Result<(), QueueError> {
        info!("listening for messages on <{queue}>");
        while let Some(delivery) = source.next(&queue).await? {
            self.consume(kind, delivery, Utc::now()).await?;
        }
        info!("queue <{queue}> closed");
        Ok(())
    }

    /// Runs one consumer per shard of every job kind.
    pub async fn run(
        &self,
        source: Arc<dyn JobSource>,
        topology: &QueueTopology,
    ) -> Result<(), QueueError> {
        let mut channels = JoinSet::new();
        for (kind, queue) in topology.all_queues() {
            let consumer = self.clone();
            let source = source.clone();
            channels.spawn(async move { consumer.run_queue(source, kind, queue).await });
        }

        let mut first_error = None;
        while let Some(joined) = channels.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    error!("queue consumer stopped: {err}");
                    first_error.get_or_insert(err);
                }
                Err(err) => error!("queue consumer task panicked: {err}"),
            }
        }
        self.ctx.connections.remove_all_connections().await;
        first_error.map_or(Ok(()), Err)
    }
}
