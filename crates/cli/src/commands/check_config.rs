use common::config::read_config;
use common::error::WorkerError;
use std::path::PathBuf;
use tracing::{info, warn};

pub fn handle_check_config(config_path: Option<PathBuf>) -> Result<(), WorkerError> {
    let config = read_config(config_path).map_err(WorkerError::input)?;
    info!(
        shards = config.general.general_queue_count,
        max_message_wait_minutes = config.general.max_message_wait_minutes,
        suffix = %config.queue.development_suffix,
        "engine config is valid"
    );
    if config.callback.master_token.is_empty() {
        warn!("callback.master_token is empty; set MASTER_TOKEN before starting the worker");
    }
    Ok(())
}
