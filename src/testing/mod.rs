//! Testing utilities and mock implementations
//!
//! Mocks for the frame source and the broker transport, so the bridge can be
//! tested without a serial device or an MQTT broker.

pub mod mocks;

pub use mocks::*;
