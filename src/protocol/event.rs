//! Frame decoding into structured telemetry events
//!
//! A frame is a JSON object with a free-text `msg` field. The field is
//! removed and its whitespace-separated tokens are merged back into the
//! object as alternating key/value pairs:
//!
//! ```rust
//! use radio_bridge::protocol::{decode_frame_at, RawFrame};
//!
//! let frame = RawFrame::new(r#"{"one":"fish","two":"fish","msg":"red fish poop fish"}"#);
//! let event = decode_frame_at(&frame, 1_700_000_000.0).unwrap();
//!
//! assert_eq!(event.get_str("red"), Some("fish"));
//! assert_eq!(event.get_str("poop"), Some("fish"));
//! assert!(event.get("msg").is_none());
//! ```

use super::frame::RawFrame;
use crate::error::DecodeError;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};

/// Free-text field that is expanded into key/value pairs
pub const MSG_FIELD: &str = "msg";
/// Field carrying the UTC decode time in epoch seconds
pub const TIMESTAMP_FIELD: &str = "_timestamp";
/// Field identifying the sending device
pub const SENDER_ID_FIELD: &str = "_sender_id";

/// Ordered key/value record produced from one frame
///
/// Keys keep the order they first appeared in; a key overwritten during
/// expansion keeps its original position.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct DecodedEvent {
    fields: Map<String, Value>,
}

impl DecodedEvent {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// String value of a field, None for missing or non-string fields
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn timestamp(&self) -> Option<f64> {
        self.fields.get(TIMESTAMP_FIELD).and_then(Value::as_f64)
    }

    pub fn sender_id(&self) -> Option<&Value> {
        self.fields.get(SENDER_ID_FIELD)
    }

    /// Copy of the fields without `_timestamp`, for comparing decodes
    pub fn without_timestamp(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .filter(|(key, _)| key.as_str() != TIMESTAMP_FIELD)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Serialize to the JSON payload published to the broker
    pub fn to_payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.fields)
    }

    fn insert(&mut self, key: String, value: Value) {
        self.fields.insert(key, value);
    }
}

/// Split free text on whitespace and pair tokens up: 1 with 2, 3 with 4, ...
///
/// An unpaired last token maps to the empty string.
pub fn expand_pairs(text: &str) -> Vec<(String, String)> {
    let mut tokens = text.split_whitespace();
    let mut pairs = Vec::new();
    while let Some(key) = tokens.next() {
        let value = tokens.next().unwrap_or_default();
        pairs.push((key.to_string(), value.to_string()));
    }
    pairs
}

/// Decode a frame, stamping it with the current UTC time
pub fn decode_frame(frame: &RawFrame) -> Result<DecodedEvent, DecodeError> {
    decode_frame_at(frame, current_epoch_seconds())
}

/// Decode a frame with an explicit `_timestamp` value
pub fn decode_frame_at(frame: &RawFrame, timestamp: f64) -> Result<DecodedEvent, DecodeError> {
    let value: Value = serde_json::from_str(frame.as_str())
        .map_err(|e| DecodeError::malformed(format!("invalid JSON: {e}")))?;

    let record = match value {
        Value::Object(record) => record,
        other => {
            return Err(DecodeError::malformed(format!(
                "expected a JSON object, got {}",
                json_type_name(&other)
            )))
        }
    };

    let text = match record.get(MSG_FIELD) {
        Some(Value::String(text)) => text.clone(),
        Some(other) => {
            return Err(DecodeError::malformed(format!(
                "field '{MSG_FIELD}' must be a string, got {}",
                json_type_name(other)
            )))
        }
        None => return Err(DecodeError::missing_field(MSG_FIELD)),
    };

    // Rebuild instead of removing so the remaining keys keep their order.
    let mut event = DecodedEvent {
        fields: record
            .into_iter()
            .filter(|(key, _)| key != MSG_FIELD)
            .collect(),
    };

    for (key, value) in expand_pairs(&text) {
        event.insert(key, Value::String(value));
    }

    event.insert(TIMESTAMP_FIELD.to_string(), Value::from(timestamp));
    Ok(event)
}

static LAST_TIMESTAMP_BITS: AtomicU64 = AtomicU64::new(0);

/// Current UTC time as floating-point epoch seconds
///
/// Never goes backwards within the process, even if the wall clock is
/// stepped back; the last value handed out is repeated until it catches up.
pub fn current_epoch_seconds() -> f64 {
    let now = chrono::Utc::now();
    let wall = (now.timestamp() as f64
        + f64::from(now.timestamp_subsec_micros()) / 1_000_000.0)
        .max(0.0);
    // Non-negative floats order the same as their bit patterns.
    let previous = LAST_TIMESTAMP_BITS.fetch_max(wall.to_bits(), Ordering::Relaxed);
    wall.max(f64::from_bits(previous))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
