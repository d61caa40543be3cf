//! Broker connection settings.

use std::fmt;

use serde::Deserialize;

use super::ConfigError;

/// Environment variable for the broker host.
pub const HOST_ENV_VAR: &str = "RABBIT_MQ_HOST";
/// Environment variable for the broker port.
pub const PORT_ENV_VAR: &str = "RABBIT_MQ_PORT";
/// Environment variable for the broker user.
pub const USER_ENV_VAR: &str = "RABBIT_MQ_USER";
/// Environment variable for the broker password.
pub const PASSWORD_ENV_VAR: &str = "RABBIT_MQ_PASSWORD";
/// Environment variable for the broker virtual host.
pub const VHOST_ENV_VAR: &str = "RABBIT_MQ_VHOST";

/// RabbitMQ connection settings.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub vhost: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "rabbitmq".to_string(),
            port: 5672,
            user: "guest".to_string(),
            password: "guest".to_string(),
            vhost: "/".to_string(),
        }
    }
}

impl BrokerConfig {
    /// Defaults overridden by the `RABBIT_MQ_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for the `RABBIT_MQ_*` keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        config.apply_overrides(lookup)?;
        Ok(config)
    }

    /// Override fields from the `RABBIT_MQ_*` keys. Empty values count as unset.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(host) = get(HOST_ENV_VAR) {
            self.host = host;
        }
        if let Some(port) = get(PORT_ENV_VAR) {
            self.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidPort {
                    key: PORT_ENV_VAR.to_string(),
                    value: port.clone(),
                })?;
        }
        if let Some(user) = get(USER_ENV_VAR) {
            self.user = user;
        }
        if let Some(password) = get(PASSWORD_ENV_VAR) {
            self.password = password;
        }
        if let Some(vhost) = get(VHOST_ENV_VAR) {
            self.vhost = vhost;
        }
        Ok(())
    }

    /// `host:port`, safe to log.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("vhost", &self.vhost)
            .finish()
    }
}
