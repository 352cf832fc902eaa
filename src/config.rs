//! Configuration for the serial-to-MQTT bridge
//!
//! Settings come from an optional TOML file and are then overridden by
//! command-line flags or their `BRIDGE_*` environment variables. Validation
//! runs once, after all overrides are applied.

use crate::backoff::BackoffPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Topic prefix that the sender id is appended to
pub const DEFAULT_TOPIC_PREFIX: &str = "home/radio/client";

/// Complete bridge configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BridgeConfig {
    #[serde(default)]
    pub serial: SerialSection,
    #[serde(default)]
    pub mqtt: MqttSection,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub retry: RetrySection,
}

/// Serial device settings. Line framing (115200-8N1) is fixed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SerialSection {
    /// Path of the serial device
    #[serde(default = "default_device")]
    pub device: PathBuf,
    /// Longest accepted frame in bytes; longer lines are discarded
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

impl Default for SerialSection {
    fn default() -> Self {
        Self {
            device: default_device(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

fn default_device() -> PathBuf {
    PathBuf::from("/dev/tty99")
}

fn default_max_frame_bytes() -> usize {
    64 * 1024
}

/// MQTT broker settings. Credentials and CA path are passed through untouched.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// Broker host name or address
    #[serde(default)]
    pub host: String,
    /// Broker port (default: 8883)
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// CA certificate file; enables TLS when present
    pub ca_certs: Option<PathBuf>,
    /// Prefix the sender id is appended to when building topics
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
    /// How long to wait for the broker's ConnAck
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// How long to wait for the PubAck of a QoS 1 publish
    #[serde(default = "default_ack_timeout")]
    pub ack_timeout_secs: u64,
}

impl Default for MqttSection {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            username: None,
            password: None,
            ca_certs: None,
            topic_prefix: default_topic_prefix(),
            connect_timeout_secs: default_connect_timeout(),
            ack_timeout_secs: default_ack_timeout(),
        }
    }
}

impl fmt::Debug for MqttSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MqttSection")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("ca_certs", &self.ca_certs)
            .field("topic_prefix", &self.topic_prefix)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("ack_timeout_secs", &self.ack_timeout_secs)
            .finish()
    }
}

impl MqttSection {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_secs(self.ack_timeout_secs)
    }

    /// True when TLS will be used for the broker connection
    pub fn uses_tls(&self) -> bool {
        self.ca_certs.is_some()
    }
}

fn default_port() -> u16 {
    8883
}

fn default_topic_prefix() -> String {
    DEFAULT_TOPIC_PREFIX.to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_ack_timeout() -> u64 {
    10
}

/// Transfer queue and shutdown settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineSection {
    /// Capacity of the queue between the ingest and publish stages
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Longest time the publish stage may spend flushing after shutdown
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_secs: u64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            drain_timeout_secs: default_drain_timeout(),
        }
    }
}

impl PipelineSection {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

fn default_queue_capacity() -> usize {
    32
}

fn default_drain_timeout() -> u64 {
    30
}

/// Backoff policies for publishing and serial reopen
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrySection {
    #[serde(default = "BackoffPolicy::publish_retry")]
    pub publish: BackoffPolicy,
    #[serde(default = "BackoffPolicy::serial_reopen")]
    pub serial: BackoffPolicy,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            publish: BackoffPolicy::publish_retry(),
            serial: BackoffPolicy::serial_reopen(),
        }
    }
}

/// Values supplied on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub device: Option<PathBuf>,
    pub mqtt_host: Option<String>,
    pub mqtt_port: Option<u16>,
    pub mqtt_user: Option<String>,
    pub mqtt_password: Option<String>,
    pub mqtt_ca_certs: Option<PathBuf>,
    pub queue_capacity: Option<usize>,
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Missing required setting: {0}")]
    MissingSetting(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl BridgeConfig {
    /// Load configuration from a TOML file; validation happens separately
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: BridgeConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Apply command-line/environment values on top of the file values
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(device) = overrides.device {
            self.serial.device = device;
        }
        if let Some(host) = overrides.mqtt_host {
            self.mqtt.host = host;
        }
        if let Some(port) = overrides.mqtt_port {
            self.mqtt.port = port;
        }
        if overrides.mqtt_user.is_some() {
            self.mqtt.username = overrides.mqtt_user;
        }
        if overrides.mqtt_password.is_some() {
            self.mqtt.password = overrides.mqtt_password;
        }
        if overrides.mqtt_ca_certs.is_some() {
            self.mqtt.ca_certs = overrides.mqtt_ca_certs;
        }
        if let Some(capacity) = overrides.queue_capacity {
            self.pipeline.queue_capacity = capacity;
        }
    }

    /// Validate the merged configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.serial.device.as_os_str().is_empty() {
            return Err(ConfigError::MissingSetting("serial.device".to_string()));
        }
        if self.serial.max_frame_bytes == 0 {
            return Err(ConfigError::InvalidConfig(
                "serial.max_frame_bytes must be greater than 0".to_string(),
            ));
        }

        if self.mqtt.host.trim().is_empty() {
            return Err(ConfigError::MissingSetting(
                "mqtt.host (--mqtt-host / BRIDGE_MQTT_HOST)".to_string(),
            ));
        }
        if self.mqtt.port == 0 {
            return Err(ConfigError::InvalidConfig(
                "mqtt.port must be greater than 0".to_string(),
            ));
        }
        if let Some(ca_certs) = &self.mqtt.ca_certs {
            if !ca_certs.is_file() {
                return Err(ConfigError::InvalidConfig(format!(
                    "mqtt.ca_certs '{}' does not exist",
                    ca_certs.display()
                )));
            }
        }
        if self.mqtt.connect_timeout_secs == 0 || self.mqtt.ack_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "mqtt timeouts must be greater than 0".to_string(),
            ));
        }

        if self.pipeline.queue_capacity == 0 {
            return Err(ConfigError::InvalidConfig(
                "pipeline.queue_capacity must be greater than 0".to_string(),
            ));
        }

        self.retry
            .publish
            .validate("retry.publish")
            .map_err(ConfigError::InvalidConfig)?;
        if self.retry.publish.max_attempts.is_none() {
            return Err(ConfigError::InvalidConfig(
                "retry.publish.max_attempts must be set".to_string(),
            ));
        }
        self.retry
            .serial
            .validate("retry.serial")
            .map_err(ConfigError::InvalidConfig)?;

        Ok(())
    }
}
