use crate::config::components::callback::CallbackConfig;
use crate::config::components::general::GeneralConfig;
use crate::config::components::queue::QueueConfig;
use crate::config::error::ConfigError;
use serde::{Deserialize, Serialize};

// ---------------- engine config ----------------
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub callback: CallbackConfig,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.general.general_queue_count == 0 {
            return Err(ConfigError::invalid(
                "general.general_queue_count must be at least 1",
            ));
        }
        if self.general.max_document_index_count == 0 {
            return Err(ConfigError::invalid(
                "general.max_document_index_count must be at least 1",
            ));
        }
        Ok(())
    }
}
