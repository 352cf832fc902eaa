//! Transport layer for publishing decoded events
//!
//! The [`Transport`] trait is the seam between the publisher and the broker
//! client, so the publisher can be driven by a mock in tests.

use bytes::Bytes;

pub mod mqtt;

/// A broker connection that can publish payloads to topics
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Connect to the broker; succeeds only once the broker has accepted
    async fn connect(&mut self) -> Result<(), Self::Error>;

    /// Disconnect from the broker
    async fn disconnect(&mut self) -> Result<(), Self::Error>;

    /// Publish one payload and wait until the broker acknowledges it
    async fn publish(&mut self, topic: &str, payload: Bytes) -> Result<(), Self::Error>;

    /// Check if transport is currently connected
    fn is_connected(&self) -> bool;
}

/// Type alias for MQTT transport
pub type MqttTransport = mqtt::MqttClient;
