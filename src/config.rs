//! TOML configuration for the bridge
//!
//! Supplies the broker endpoint, client identity, credential indirection via
//! environment variables, topic namespace, and the two timing knobs: the
//! connection retry interval and the liveness sweep parameters.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeConfig {
    pub mqtt: MqttSection,
    #[serde(default)]
    pub liveness: LivenessSection,
}

/// Broker connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// Broker URL with scheme and optional port (`mqtt://` or `mqtts://`).
    pub broker_url: String,
    /// Stable MQTT client identifier for this backend instance.
    pub client_id: String,
    /// First topic segment shared by every inbound and outbound topic.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Environment variable holding the broker username.
    pub username_env: Option<String>,
    /// Environment variable holding the broker password.
    pub password_env: Option<String>,
    /// Supervisory tick driving connection retry, in seconds. This fixed
    /// interval is the sole retry mechanism; there is no backoff.
    #[serde(default = "default_retry_interval")]
    pub retry_interval_secs: u64,
    /// How long a connect attempt waits for the broker's acknowledgment.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Explicit subscription list; when empty, subscriptions covering the
    /// whole topic schema are derived from the namespace.
    #[serde(default)]
    pub subscriptions: Vec<String>,
}

/// Device liveness settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LivenessSection {
    /// Interval of the inactivity sweep, in seconds.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    /// Silence window after which an online device is marked offline.
    #[serde(default = "default_offline_threshold")]
    pub offline_threshold_secs: u64,
    /// Whether a heartbeat from an unknown hardware address registers a new
    /// device. When false (the default) such heartbeats are logged and
    /// ignored.
    #[serde(default)]
    pub auto_register: bool,
}

impl Default for LivenessSection {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
            offline_threshold_secs: default_offline_threshold(),
            auto_register: false,
        }
    }
}

fn default_namespace() -> String {
    "fleet".to_string()
}

fn default_retry_interval() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_sweep_interval() -> u64 {
    15
}

fn default_offline_threshold() -> u64 {
    30
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl BridgeConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: BridgeConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mqtt.client_id.is_empty() {
            return Err(ConfigError::Invalid("client_id must not be empty".into()));
        }
        if self.mqtt.namespace.is_empty() || self.mqtt.namespace.contains('/') {
            return Err(ConfigError::Invalid(format!(
                "namespace {:?} must be a single non-empty topic segment",
                self.mqtt.namespace
            )));
        }
        if self.mqtt.retry_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "retry_interval_secs must be greater than 0".into(),
            ));
        }
        if self.liveness.offline_threshold_secs == 0 || self.liveness.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "liveness intervals must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

impl MqttSection {
    /// Broker username, resolved from the configured environment variable.
    pub fn username(&self) -> Option<String> {
        self.username_env
            .as_ref()
            .and_then(|name| std::env::var(name).ok())
    }

    /// Broker password, resolved from the configured environment variable.
    pub fn password(&self) -> Option<String> {
        self.password_env
            .as_ref()
            .and_then(|name| std::env::var(name).ok())
    }
}
