use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueueConfig {
    /// Appended to every queue name, e.g. `-dev`.
    #[serde(default)]
    pub development_suffix: String,
}
