//! MQTT client for publishing telemetry
//!
//! Split the same way throughout: pure decisions in [`connection`] and
//! [`message_handler`], I/O in [`client`].
//!
//! # Usage
//!
//! ```rust,no_run
//! use radio_bridge::config::MqttSection;
//! use radio_bridge::transport::mqtt::MqttClient;
//!
//! # tokio_test::block_on(async {
//! let config = MqttSection {
//!     host: "localhost".to_string(),
//!     port: 1883,
//!     ..Default::default()
//! };
//!
//! let mut client = MqttClient::new(config);
//! client.connect().await?;
//! client
//!     .publish("home/radio/client42", bytes::Bytes::from_static(b"{}"))
//!     .await?;
//! client.disconnect().await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod message_handler;

pub use client::{resolve_broker, MqttClient};
pub use connection::{configure_mqtt_options, ConnectionState, MqttError};
pub use message_handler::{route_mqtt_event, EventRoute};
