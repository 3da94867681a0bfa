//! Event records: the unit of the session log and of the live stream

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::error::ErrorKind;

/// Author name used for events created from the inbound request
pub const USER_AUTHOR: &str = "user";

/// Key/value writes carried by a `state_delta` event
pub type StateDelta = BTreeMap<String, Value>;

/// A file or blob attached to a user message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    /// Display name
    pub name: String,
    /// MIME type of the content
    pub content_type: String,
    /// Inline content or a reference the tools understand
    pub content: String,
}

/// One immutable entry of a session's event log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique event ID
    pub id: String,

    /// Monotonic position within the session (assigned on append, starts at 1)
    pub sequence: u64,

    /// Turn that produced this event
    pub turn_id: String,

    /// Agent name, or "user" for the inbound message
    pub author: String,

    /// When the event was created
    pub timestamp: DateTime<Utc>,

    /// What happened
    pub payload: EventPayload,
}

/// Payload variants of an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Inbound user message that opened a turn
    UserMessage {
        text: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        attachments: Vec<Attachment>,
    },

    /// Text produced by an agent
    Text { text: String },

    /// Agent requested a tool invocation
    ToolCall {
        call_id: String,
        name: String,
        args: Value,
    },

    /// Outcome of a tool invocation (`is_error` marks a tool error)
    ToolResult {
        call_id: String,
        name: String,
        result: Value,
        is_error: bool,
    },

    /// State writes
    StateDelta { delta: StateDelta },

    /// Control moved from one agent to another
    Delegation { from: String, to: String },

    /// A failure; `fatal` errors terminate the turn
    Error {
        kind: ErrorKind,
        message: String,
        fatal: bool,
    },

    /// The turn finished normally
    TurnComplete {
        /// Agent that produced the final response
        agent: String,
        /// Whether the next turn resumes with `agent`
        sticky: bool,
    },
}

impl EventPayload {
    /// Wire name of this payload variant
    pub fn type_name(&self) -> &'static str {
        match self {
            EventPayload::UserMessage { .. } => "user_message",
            EventPayload::Text { .. } => "text",
            EventPayload::ToolCall { .. } => "tool_call",
            EventPayload::ToolResult { .. } => "tool_result",
            EventPayload::StateDelta { .. } => "state_delta",
            EventPayload::Delegation { .. } => "delegation",
            EventPayload::Error { .. } => "error",
            EventPayload::TurnComplete { .. } => "turn_complete",
        }
    }
}

impl Event {
    /// Create an unsequenced event; the store assigns `sequence` on append
    pub fn new(turn_id: impl Into<String>, author: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            sequence: 0,
            turn_id: turn_id.into(),
            author: author.into(),
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Create an error event
    pub fn error(
        turn_id: impl Into<String>,
        author: impl Into<String>,
        kind: ErrorKind,
        message: impl Into<String>,
        fatal: bool,
    ) -> Self {
        Self::new(
            turn_id,
            author,
            EventPayload::Error {
                kind,
                message: message.into(),
                fatal,
            },
        )
    }

    /// Whether this event ends a turn's stream
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.payload,
            EventPayload::TurnComplete { .. } | EventPayload::Error { fatal: true, .. }
        )
    }

    /// The state writes carried by this event, if any
    pub fn state_delta(&self) -> Option<&StateDelta> {
        match &self.payload {
            EventPayload::StateDelta { delta } => Some(delta),
            _ => None,
        }
    }

    /// Wire name of the payload
    pub fn type_name(&self) -> &'static str {
        self.payload.type_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_serializes_with_type_tag() {
        let event = Event::new(
            "turn-1",
            "Coder",
            EventPayload::Delegation {
                from: "Orchestrator".into(),
                to: "Coder".into(),
            },
        );
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["payload"]["type"], "delegation");
        assert_eq!(value["payload"]["to"], "Coder");

        let back: Event = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_terminal_events() {
        let done = Event::new(
            "t",
            "A",
            EventPayload::TurnComplete {
                agent: "A".into(),
                sticky: false,
            },
        );
        assert!(done.is_terminal());

        let recoverable = Event::error("t", "A", ErrorKind::Routing, "bad target", false);
        assert!(!recoverable.is_terminal());

        let fatal = Event::error("t", "A", ErrorKind::Backend, "down", true);
        assert!(fatal.is_terminal());
    }

    #[test]
    fn test_state_delta_accessor() {
        let mut delta = StateDelta::new();
        delta.insert("k".into(), json!(1));
        let event = Event::new("t", "A", EventPayload::StateDelta { delta });
        assert_eq!(event.state_delta().unwrap()["k"], json!(1));
        assert_eq!(event.type_name(), "state_delta");
    }

    #[test]
    fn test_user_message_attachments_default() {
        let value = json!({"type": "user_message", "text": "hi"});
        let payload: EventPayload = serde_json::from_value(value).unwrap();
        assert!(matches!(payload, EventPayload::UserMessage { attachments, .. } if attachments.is_empty()));
    }
}
