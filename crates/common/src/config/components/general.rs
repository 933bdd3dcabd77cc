use serde::{Deserialize, Serialize};
use std::time::Duration;

/// ---------------- General Config ----------------
///
/// Knobs shared by every worker channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralConfig {
    /// Age after which a job waiting on a busy environment is failed.
    #[serde(default = "default_max_message_wait_minutes")]
    pub max_message_wait_minutes: u64,
    /// Number of parallel queue shards per job kind.
    #[serde(default = "default_general_queue_count")]
    pub general_queue_count: u32,
    #[serde(default = "default_max_document_index_count")]
    pub max_document_index_count: usize,
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: u32,
}

impl GeneralConfig {
    pub fn max_message_wait(&self) -> Duration {
        Duration::from_secs(self.max_message_wait_minutes * 60)
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            max_message_wait_minutes: default_max_message_wait_minutes(),
            general_queue_count: default_general_queue_count(),
            max_document_index_count: default_max_document_index_count(),
            max_pool_size: default_max_pool_size(),
        }
    }
}

fn default_max_message_wait_minutes() -> u64 {
    10
}

fn default_general_queue_count() -> u32 {
    5
}

// hard limit of the document store
fn default_max_document_index_count() -> usize {
    64
}

fn default_max_pool_size() -> u32 {
    10
}
