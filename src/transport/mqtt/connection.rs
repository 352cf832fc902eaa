//! Pure connection state management for the MQTT client
//!
//! Connection states, transport errors and the translation of
//! [`MqttSection`] into `rumqttc` options.

use crate::config::MqttSection;
use rumqttc::{MqttOptions, TlsConfiguration, Transport as RumqttcTransport};
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::warn;

/// Keepalive interval sent to the broker
pub const KEEP_ALIVE: Duration = Duration::from_secs(30);

/// Capacity of the request channel between `AsyncClient` and its event loop
pub const REQUEST_CHANNEL_CAPACITY: usize = 10;

/// Connection state for the MQTT client
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// Waiting for the broker's ConnAck
    Connecting,
    /// ConnAck received, ready to publish
    Connected,
    /// Not connected, with the reason
    Disconnected(String),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

/// MQTT transport errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("ConnAck not received within {timeout:?}")]
    ConnectTimeout { timeout: Duration },
    #[error("Publishing failed: {0}")]
    PublishFailed(String),
    #[error("PubAck not received within {timeout:?}")]
    AckTimeout { timeout: Duration },
    #[error("Connection lost: {0}")]
    ConnectionLost(String),
    #[error("Not connected - current state: {state:?}")]
    NotConnected { state: ConnectionState },
    #[error("Failed to read CA certificates from {path}: {source}")]
    CaCertificates {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Cannot resolve broker host '{host}': {reason}")]
    Resolve { host: String, reason: String },
}

/// Build a client id that is unique per process and connection attempt
pub fn client_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("radio-bridge-{}-{millis}", std::process::id())
}

/// Translate the broker settings into `rumqttc` options
///
/// A fresh client id is generated on every call so that a reconnect never
/// collides with a session the broker still holds for the previous one.
pub fn configure_mqtt_options(config: &MqttSection) -> Result<MqttOptions, MqttError> {
    let mut mqtt_options = MqttOptions::new(client_id(), config.host.clone(), config.port);
    mqtt_options.set_keep_alive(KEEP_ALIVE);

    match (&config.username, &config.password) {
        (Some(username), password) => {
            mqtt_options.set_credentials(username, password.as_deref().unwrap_or_default());
        }
        (None, Some(_)) => {
            warn!("MQTT password configured without a username; credentials not sent");
        }
        (None, None) => {}
    }

    if let Some(ca_path) = &config.ca_certs {
        let ca = std::fs::read(ca_path).map_err(|source| MqttError::CaCertificates {
            path: ca_path.clone(),
            source,
        })?;
        mqtt_options.set_transport(RumqttcTransport::tls_with_config(
            TlsConfiguration::Simple {
                ca,
                alpn: None,
                client_auth: None,
            },
        ));
    }

    Ok(mqtt_options)
}
