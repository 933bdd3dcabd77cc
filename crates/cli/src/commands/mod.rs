pub mod check_config;
pub mod ddl;
pub mod diff;
pub mod simulate;

use common::error::WorkerError;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;
use tokio::runtime::Runtime;

/// Reads a JSON or YAML document; the extension picks the format.
pub fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T, WorkerError> {
    let raw = fs::read_to_string(path).map_err(WorkerError::input)?;
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yml") | Some("yaml") => serde_yaml::from_str(&raw).map_err(WorkerError::input),
        _ => serde_json::from_str(&raw).map_err(WorkerError::input),
    }
}

pub fn runtime() -> Result<Runtime, WorkerError> {
    Runtime::new().map_err(WorkerError::init)
}
