use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

use crate::websocket;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: u32,
}

/// File/env view of [`websocket::Config`]. The request filter has no
/// serialized form and is set in code.
#[derive(Debug, Deserialize, Clone)]
pub struct WebSocketSettings {
    #[serde(default)]
    pub origins: Vec<String>,
    #[serde(default)]
    pub subprotocols: Vec<String>,
    pub read_buffer_size: usize,
    pub write_buffer_size: usize,
    #[serde(default)]
    pub read_limit: Option<usize>,
    #[serde(default)]
    pub max_idle: Option<usize>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub environment: String,
    pub server: ServerConfig,
    pub websocket: WebSocketSettings,
}

impl From<&WebSocketSettings> for websocket::Config {
    fn from(settings: &WebSocketSettings) -> Self {
        let mut config = websocket::Config::default()
            .origins(settings.origins.iter().cloned())
            .subprotocols(settings.subprotocols.iter().cloned())
            .read_buffer_size(settings.read_buffer_size)
            .write_buffer_size(settings.write_buffer_size)
            .resolve();
        config.read_limit = settings.read_limit;
        config
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        Self::defaults(Config::builder(), "development")?
            // Add in settings from the config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add in settings from environment variables (with prefix "APP_")
            // E.g., `APP_SERVER__PORT=5001` would set `Settings.server.port`
            .add_source(
                Environment::with_prefix("app")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?
            .try_deserialize()
    }

    /// Defaults plus environment variables under `prefix`, no files.
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        Self::defaults(Config::builder(), "test")?
            .add_source(
                Environment::with_prefix(prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?
            .try_deserialize()
    }

    fn defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
        environment: &str,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        builder
            .set_default("environment", environment)?
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("server.workers", num_cpus::get() as i64)?
            .set_default("websocket.read_buffer_size", websocket::DEFAULT_READ_BUFFER_SIZE as i64)?
            .set_default("websocket.write_buffer_size", 0)
    }
}
