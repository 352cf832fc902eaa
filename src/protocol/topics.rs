//! Topic derivation from sender identity
//!
//! Every event is published to `<prefix><sender_id>`, one topic per sender,
//! e.g. `home/radio/client7`.

use super::event::DecodedEvent;
use serde_json::Value;
use thiserror::Error;

/// Reasons an event cannot be routed to a topic
#[derive(Debug, Error, PartialEq)]
pub enum TopicError {
    #[error("event has no '_sender_id' field")]
    MissingSenderId,
    #[error("'_sender_id' is empty")]
    EmptySenderId,
    #[error("'_sender_id' has unsupported value {0}")]
    UnsupportedSenderId(String),
    #[error("'_sender_id' contains MQTT wildcard or null characters: {0:?}")]
    InvalidCharacters(String),
}

/// Render a sender id value as the topic suffix
///
/// Strings are used verbatim and numbers use their JSON text, so a numeric
/// `7` and a string `"7"` route to the same topic.
pub fn sender_id_text(value: &Value) -> Result<String, TopicError> {
    let text = match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        other => return Err(TopicError::UnsupportedSenderId(other.to_string())),
    };

    if text.is_empty() {
        return Err(TopicError::EmptySenderId);
    }
    if text.contains(['+', '#', '\0']) {
        return Err(TopicError::InvalidCharacters(text));
    }
    Ok(text)
}

/// Build the publish topic for a decoded event
pub fn topic_for_event(event: &DecodedEvent, prefix: &str) -> Result<String, TopicError> {
    let sender = event.sender_id().ok_or(TopicError::MissingSenderId)?;
    Ok(format!("{prefix}{}", sender_id_text(sender)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_TOPIC_PREFIX;
    use crate::protocol::{decode_frame_at, RawFrame};
    use proptest::prelude::*;
    use serde_json::json;

    fn event(line: &str) -> DecodedEvent {
        decode_frame_at(&RawFrame::new(line), 0.0).unwrap()
    }

    #[test]
    fn test_string_sender_id() {
        let topic = topic_for_event(
            &event(r#"{"_sender_id":"12","msg":"a b"}"#),
            DEFAULT_TOPIC_PREFIX,
        );
        assert_eq!(topic, Ok("home/radio/client12".to_string()));
    }

    #[test]
    fn test_numeric_sender_id() {
        let topic = topic_for_event(
            &event(r#"{"_sender_id":12,"msg":"a b"}"#),
            DEFAULT_TOPIC_PREFIX,
        );
        assert_eq!(topic, Ok("home/radio/client12".to_string()));
    }

    #[test]
    fn test_sender_id_from_msg_expansion() {
        let topic = topic_for_event(
            &event(r#"{"msg":"_sender_id 3 temp 20"}"#),
            DEFAULT_TOPIC_PREFIX,
        );
        assert_eq!(topic, Ok("home/radio/client3".to_string()));
    }

    #[test]
    fn test_missing_sender_id() {
        let result = topic_for_event(&event(r#"{"msg":"a b"}"#), DEFAULT_TOPIC_PREFIX);
        assert_eq!(result, Err(TopicError::MissingSenderId));
    }

    #[test]
    fn test_unroutable_sender_ids() {
        assert_eq!(sender_id_text(&json!("")), Err(TopicError::EmptySenderId));
        assert!(matches!(
            sender_id_text(&json!(null)),
            Err(TopicError::UnsupportedSenderId(_))
        ));
        assert!(matches!(
            sender_id_text(&json!({"id": 1})),
            Err(TopicError::UnsupportedSenderId(_))
        ));
        assert!(matches!(
            sender_id_text(&json!("a/#")),
            Err(TopicError::InvalidCharacters(_))
        ));
    }

    #[test]
    fn test_custom_prefix() {
        let topic = topic_for_event(&event(r#"{"_sender_id":"9","msg":""}"#), "lab/node-");
        assert_eq!(topic, Ok("lab/node-9".to_string()));
    }

    proptest! {
        #[test]
        fn topic_is_prefix_plus_id(id in "[a-zA-Z0-9_-]{1,12}") {
            let line = json!({"_sender_id": id.clone(), "msg": ""}).to_string();
            let topic = topic_for_event(&event(&line), DEFAULT_TOPIC_PREFIX).unwrap();
            prop_assert_eq!(topic, format!("home/radio/client{id}"));
        }
    }
}
