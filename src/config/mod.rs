//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables.

mod broker;
mod consumer;
mod storage;

pub use broker::{
    BrokerConfig, HOST_ENV_VAR, PASSWORD_ENV_VAR, PORT_ENV_VAR, USER_ENV_VAR, VHOST_ENV_VAR,
};
pub use consumer::{ConsumerConfig, DEFAULT_CONCURRENCY, DEFAULT_MAX_RETRIES};
pub use storage::{SqliteConfig, StorageConfig, StorageType};

use serde::Deserialize;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "courier.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "COURIER_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "COURIER";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "COURIER_LOG";
/// Environment variable selecting JSON log output.
pub const LOG_FORMAT_ENV_VAR: &str = "COURIER_LOG_FORMAT";

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Source(#[from] ::config::ConfigError),

    #[error("{key} must be an integer port, got '{value}'")]
    InvalidPort { key: String, value: String },

    #[error("Invalid setting {key}: {reason}")]
    Invalid { key: String, reason: String },
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Broker connection settings.
    pub broker: BrokerConfig,
    /// Consumer retry and concurrency settings.
    pub consumer: ConsumerConfig,
    /// Replica store settings.
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `courier.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    /// 5. Legacy `RABBIT_MQ_*` variables for the broker settings
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: Config = config.try_deserialize()?;
        config
            .broker
            .apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would stall the consumer.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.consumer.concurrency == 0 {
            return Err(ConfigError::Invalid {
                key: "consumer.concurrency".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Create config for testing.
    pub fn for_test() -> Self {
        Self {
            storage: StorageConfig {
                storage_type: StorageType::Memory,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}
