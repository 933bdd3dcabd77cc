pub mod admission;
pub mod consumer;
pub mod deployment;
pub mod error;
pub mod keys;
pub mod oplog;

pub use admission::{decide, Decision};
pub use consumer::{JobConsumer, Settlement};
pub use deployment::{DeploymentManager, EnvironmentStore, Outcome, Tracked};
pub use error::EngineError;
pub use oplog::OpLog;

use common::config::EngineConfig;
use executor::{BackendSettings, ConnectionManager};
use shared_clients::cache::KeyValueCache;
use shared_clients::callback::CallbackSink;
use shared_clients::document::DocumentStore;
use shared_clients::notifier::Notifier;
use std::sync::Arc;

/// Collaborators shared by every job a worker runs.
#[derive(Clone)]
pub struct EngineContext {
    pub config: Arc<EngineConfig>,
    /// Environment status and cached configuration.
    pub cache: Arc<dyn KeyValueCache>,
    /// Platform document server holding each environment's configuration database.
    pub platform: Arc<dyn DocumentStore>,
    pub connections: Arc<ConnectionManager>,
    pub callbacks: Arc<dyn CallbackSink>,
    pub notifier: Arc<dyn Notifier>,
}

impl EngineContext {
    pub fn new(
        config: EngineConfig,
        cache: Arc<dyn KeyValueCache>,
        platform: Arc<dyn DocumentStore>,
        connections: Arc<ConnectionManager>,
        callbacks: Arc<dyn CallbackSink>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            cache,
            platform,
            connections,
            callbacks,
            notifier,
        }
    }

    pub fn backend_settings(&self) -> BackendSettings {
        BackendSettings {
            max_document_index_count: self.config.general.max_document_index_count,
        }
    }
}
