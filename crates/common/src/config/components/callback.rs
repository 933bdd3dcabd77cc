use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const MASTER_TOKEN_ENV: &str = "MASTER_TOKEN";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallbackConfig {
    #[serde(default)]
    pub master_token: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl CallbackConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            master_token: String::new(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

fn default_timeout_seconds() -> u64 {
    30
}
