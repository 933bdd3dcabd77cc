use crate::config::components::callback::MASTER_TOKEN_ENV;
use crate::config::components::global::EngineConfig;
use crate::config::error::ConfigError;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "engine-config.yml";

/// Loads `engine-config.yml` from `config_path` (a directory or the file
/// itself), or from the working directory when no path is given.
pub fn read_config(config_path: Option<PathBuf>) -> Result<EngineConfig, ConfigError> {
    let path = resolve_config_file(config_path);
    if !path.exists() {
        return Err(ConfigError::incorrect_path(&path));
    }

    log::info!("loading engine config from {}", path.display());
    let raw = fs::read_to_string(&path)?;
    let mut config = read_config_str(&raw)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config.validate()?;

    Ok(config)
}

pub fn read_config_str(raw: &str) -> Result<EngineConfig, ConfigError> {
    if raw.trim().is_empty() {
        return Ok(EngineConfig::default());
    }
    let config: EngineConfig = serde_yaml::from_str(raw)?;
    Ok(config)
}

/// Secrets are never expected in the file; the environment wins.
pub fn apply_env_overrides<F>(config: &mut EngineConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(token) = lookup(MASTER_TOKEN_ENV).filter(|t| !t.is_empty()) {
        config.callback.master_token = token;
    }
}

fn resolve_config_file(config_path: Option<PathBuf>) -> PathBuf {
    match config_path {
        Some(path) if is_yaml_file(&path) => path,
        Some(dir) => dir.join(CONFIG_FILE_NAME),
        None => PathBuf::from(CONFIG_FILE_NAME),
    }
}

fn is_yaml_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yml") | Some("yaml")
    )
}
