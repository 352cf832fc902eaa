//! Error taxonomy for the serial-to-MQTT bridge
//!
//! Per-frame and per-event errors ([`DecodeError`], [`PublishError`]) are
//! handled inside the pipeline: logged, counted and dropped. Only
//! [`BridgeError`] travels up to the binary and decides the exit status.

use thiserror::Error;

/// Failure to turn a raw frame into a decoded event
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Malformed record: {reason}")]
    MalformedRecord { reason: String },

    #[error("Missing required field '{field}'")]
    MissingField { field: String },
}

impl DecodeError {
    /// Create malformed record error
    pub fn malformed<S: Into<String>>(reason: S) -> Self {
        Self::MalformedRecord {
            reason: reason.into(),
        }
    }

    /// Create missing field error
    pub fn missing_field<S: Into<String>>(field: S) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Short, stable name of the error kind for structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            DecodeError::MalformedRecord { .. } => "malformed_record",
            DecodeError::MissingField { .. } => "missing_field",
        }
    }
}

/// Failure of the frame source (serial device)
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Serial device I/O error on {device}: {source}")]
    Io {
        device: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Frame source is not open")]
    NotOpen,
}

impl SourceError {
    pub fn io(device: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            device: device.into(),
            source,
        }
    }
}

/// Failure to deliver one queued event to the broker
#[derive(Debug, Error)]
pub enum PublishError {
    /// The event cannot be routed to a topic; it is dropped without retry
    #[error("Routing error: {reason}")]
    Routing { reason: String },

    /// All delivery attempts failed; the event was dropped
    #[error("Publish failed after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("Publisher is closed")]
    Closed,
}

impl PublishError {
    pub fn routing<S: Into<String>>(reason: S) -> Self {
        Self::Routing {
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PublishError::Routing { .. } => "routing_error",
            PublishError::RetriesExhausted { .. } => "publish_error",
            PublishError::Closed => "publisher_closed",
        }
    }
}

/// Errors that stop the bridge
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Fatal startup error: {message}")]
    FatalStartup { message: String },

    #[error("Frame source failed permanently after {attempts} reopen attempts: {last_error}")]
    SourceFailed { attempts: u32, last_error: String },

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl BridgeError {
    /// Create fatal startup error
    pub fn fatal_startup<S: Into<String>>(message: S) -> Self {
        Self::FatalStartup {
            message: message.into(),
        }
    }

    /// Create internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;
