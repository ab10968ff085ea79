//! External event type delivered to event-wait nodes.
//!
//! `WorkflowEvent` is what callers emit on the event bus to resume suspended
//! workflows. It is Clone + Send + Sync and serializes to JSON so it can be
//! handed to the next step as part of the `(event, input)` pair.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A named external event with an arbitrary JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEvent {
    /// Event name that event-wait nodes match against.
    pub name: String,
    /// Caller-supplied payload.
    #[serde(default)]
    pub data: Value,
    /// UUIDv7 assigned at creation.
    pub id: Uuid,
    pub emitted_at: DateTime<Utc>,
}

impl WorkflowEvent {
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data,
            id: Uuid::now_v7(),
            emitted_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_event_carries_name_and_payload() {
        let event = WorkflowEvent::new("approved", json!({"by": "ops"}));
        assert_eq!(event.name, "approved");
        assert_eq!(event.data["by"], "ops");
    }

    #[test]
    fn test_event_json_roundtrip_keeps_identity() {
        let event = WorkflowEvent::new("shipped", json!(42));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["name"], "shipped");

        let parsed: WorkflowEvent = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.id, event.id);
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_missing_data_defaults_to_null() {
        let raw = json!({
            "name": "ping",
            "id": Uuid::now_v7(),
            "emitted_at": Utc::now(),
        });
        let parsed: WorkflowEvent = serde_json::from_value(raw).unwrap();
        assert!(parsed.data.is_null());
    }
}
