pub mod components;
pub mod error;
pub mod loader;

pub use components::global::EngineConfig;
pub use loader::{read_config, read_config_str};
