//! Telemetry frame protocol
//!
//! Raw serial frames, their decoding into structured events, and the topic
//! each event is published to.

pub mod event;
pub mod frame;
pub mod topics;

pub use event::*;
pub use frame::*;
pub use topics::*;
