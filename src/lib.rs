//! radio-bridge
//!
//! Bridges telemetry from a serial radio receiver to an MQTT broker.
//!
//! # Overview
//!
//! Each line on the serial device is a JSON record. Lines starting with `*`
//! are receiver diagnostics and are skipped. Every other record is decoded
//! (the `msg` field's space-separated key/value pairs become fields of their
//! own, and a `_timestamp` is added), queued, and published to
//! `home/radio/client<_sender_id>` with QoS 1.
//!
//! - [`serial`] reads and filters frames from the device
//! - [`protocol`] decodes frames and derives topics
//! - [`queue`] is the bounded hand-off between the two stages
//! - [`publisher`] and [`transport`] deliver events to the broker
//! - [`bridge`] runs both stages and drains them on shutdown
//!
//! # Quick Start
//!
//! ```rust
//! use radio_bridge::protocol::{decode_frame_at, topic_for_event, RawFrame};
//!
//! let frame = RawFrame::new(r#"{"_sender_id":"12","msg":"temp 21.5 hum 40"}"#);
//! let event = decode_frame_at(&frame, 1_700_000_000.0).unwrap();
//!
//! assert_eq!(event.get_str("temp"), Some("21.5"));
//! assert_eq!(event.get_str("hum"), Some("40"));
//! assert_eq!(
//!     topic_for_event(&event, "home/radio/client").unwrap(),
//!     "home/radio/client12"
//! );
//! ```

pub mod backoff;
pub mod bridge;
pub mod config;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod publisher;
pub mod queue;
pub mod serial;
pub mod testing;
pub mod transport;

pub use backoff::{BackoffPolicy, RetryDecision};
pub use bridge::{BridgeRunner, BridgeState, RunSummary, RunnerSettings, StopReason};
pub use config::{BridgeConfig, ConfigError, ConfigOverrides};
pub use error::{BridgeError, BridgeResult, DecodeError, PublishError, SourceError};
pub use protocol::*;
pub use publisher::{PublishAck, Publisher};
pub use queue::{transfer_queue, QueueItem, QueueReceiver, QueueSender};
pub use serial::{FrameSource, SerialFrameSource};
pub use transport::mqtt::MqttClient;
pub use transport::Transport;
