//! Serial ingest: newline framing and the device-backed frame source

pub mod reader;
pub mod source;

pub use reader::{LineFrameReader, LineRead};
pub use source::{next_telemetry_frame, FrameSource, SerialFrameSource, BAUD_RATE};
