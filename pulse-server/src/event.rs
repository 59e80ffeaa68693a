//! The inbound event model and its validation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::CACHE_KEY_PREFIX;

/// An error raised when an inbound event fails schema validation.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// The body is not an event document.
    #[error("invalid event: {0}")]
    Schema(#[from] serde_path_to_error::Error<serde_json::Error>),

    /// The body contains data after the event document.
    #[error("invalid event: trailing data after the event")]
    TrailingData(#[source] serde_json::Error),

    /// The event id is an empty string.
    #[error("invalid event: id must not be empty")]
    EmptyId,
}

/// The origin of an event.
///
/// `region` and `instance` are required, all other entries are retained as-is.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct EventSource {
    /// The region the event originates from, used as a metrics label.
    pub region: String,
    /// The emitting instance.
    pub instance: String,
    /// Additional string attributes of the origin.
    #[serde(flatten)]
    pub other: BTreeMap<String, String>,
}

/// The body of an event.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct EventPayload {
    /// Classification of the payload.
    #[serde(rename = "type")]
    pub ty: String,
    /// Arbitrary payload attributes.
    pub properties: Map<String, Value>,
}

/// A telemetry event submitted for processing.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Event {
    /// Caller-supplied identifier. Uniqueness is assumed but not enforced.
    pub id: String,
    /// ISO-8601 timestamp supplied by the caller.
    pub timestamp: String,
    /// Short classification of the event.
    #[serde(rename = "type")]
    pub ty: String,
    /// The origin of the event.
    pub source: EventSource,
    /// The event body.
    pub payload: EventPayload,
    /// Free-form metadata, not interpreted during processing.
    pub metadata: Map<String, Value>,
}

impl Event {
    /// Parses and validates an event from a JSON body.
    ///
    /// Errors point to the offending field, for example `source.region: missing field`.
    pub fn parse(body: &[u8]) -> Result<Self, ValidationError> {
        let mut deserializer = serde_json::Deserializer::from_slice(body);
        let event: Self = serde_path_to_error::deserialize(&mut deserializer)?;
        deserializer.end().map_err(ValidationError::TrailingData)?;

        event.validate()?;
        Ok(event)
    }

    /// Checks constraints not expressed by the type.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.is_empty() {
            return Err(ValidationError::EmptyId);
        }

        Ok(())
    }

    /// Returns the replay cache key of this event.
    pub fn cache_key(&self) -> String {
        format!("{CACHE_KEY_PREFIX}{}", self.id)
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    const EVENT: &str = r#"{
        "id": "evt-123",
        "timestamp": "2024-05-01T12:00:00Z",
        "type": "user_action",
        "source": {"region": "us-east", "instance": "i-1", "zone": "a"},
        "payload": {"type": "click", "properties": {"button": "buy", "count": 3}},
        "metadata": {"version": "1.0"}
    }"#;

    fn event_json() -> Value {
        serde_json::from_str(EVENT).unwrap()
    }

    fn parse_value(value: &Value) -> Result<Event, ValidationError> {
        Event::parse(&serde_json::to_vec(value).unwrap())
    }

    #[test]
    fn test_parse_event() {
        let event = Event::parse(EVENT.as_bytes()).unwrap();

        assert_eq!(event.id, "evt-123");
        assert_eq!(event.ty, "user_action");
        assert_eq!(event.source.region, "us-east");
        assert_eq!(event.source.other.get("zone").map(String::as_str), Some("a"));
        assert_eq!(event.payload.ty, "click");
        assert_eq!(event.cache_key(), "event:evt-123");
    }

    #[test]
    fn test_serialize_preserves_document() {
        let event = Event::parse(EVENT.as_bytes()).unwrap();
        assert_eq!(serde_json::to_value(&event).unwrap(), event_json());
    }

    #[test]
    fn test_missing_type() {
        let mut value = event_json();
        value.as_object_mut().unwrap().remove("type");

        let error = parse_value(&value).unwrap_err();
        assert!(error.to_string().contains("missing field `type`"));
    }

    #[test]
    fn test_payload_not_a_mapping() {
        let mut value = event_json();
        value["payload"] = Value::String("click".to_owned());

        let error = parse_value(&value).unwrap_err();
        assert!(matches!(error, ValidationError::Schema(ref e) if e.path().to_string() == "payload"));
    }

    #[test]
    fn test_source_without_region() {
        let mut value = event_json();
        value["source"].as_object_mut().unwrap().remove("region");

        let error = parse_value(&value).unwrap_err();
        assert!(matches!(error, ValidationError::Schema(_)));
    }

    #[test]
    fn test_source_non_string_value() {
        let mut value = event_json();
        value["source"]["zone"] = Value::from(7);

        assert!(parse_value(&value).is_err());
    }

    #[test]
    fn test_metadata_required() {
        let mut value = event_json();
        value.as_object_mut().unwrap().remove("metadata");

        assert!(parse_value(&value).is_err());
    }

    #[test]
    fn test_empty_id() {
        let mut value = event_json();
        value["id"] = Value::String(String::new());

        let error = parse_value(&value).unwrap_err();
        assert!(matches!(error, ValidationError::EmptyId));
    }

    #[test]
    fn test_trailing_data() {
        let body = format!("{EVENT} []");
        let error = Event::parse(body.as_bytes()).unwrap_err();
        assert!(matches!(error, ValidationError::TrailingData(_)));
    }

    #[test]
    fn test_not_json() {
        assert!(Event::parse(b"not json").is_err());
    }
}
