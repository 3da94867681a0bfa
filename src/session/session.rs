//! Conversation session record
//!
//! A `Session` combines metadata, the ordered event log and the state
//! projected from it. It is only ever mutated through `commit`, after the
//! event has been made durable.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::core::{Event, EventPayload};

use super::metadata::SessionMetadata;
use super::state::SessionState;

/// Fully qualified identity of a session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    /// Application name
    pub app_name: String,
    /// Owning user
    pub user_id: String,
    /// Session ID
    pub session_id: String,
}

impl SessionKey {
    /// Create a key
    pub fn new(
        app_name: impl Into<String>,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            user_id: user_id.into(),
            session_id: session_id.into(),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.app_name, self.user_id, self.session_id)
    }
}

/// A session held in memory
#[derive(Debug, Clone)]
pub struct Session {
    /// Session metadata (identity, progress, timestamps)
    pub metadata: SessionMetadata,

    /// Event log, in sequence order
    pub events: Vec<Event>,

    /// Projection of `events`
    pub state: SessionState,
}

impl Session {
    /// Create an empty session
    pub fn new(key: &SessionKey) -> Self {
        Self {
            metadata: SessionMetadata::new(&key.app_name, &key.user_id, &key.session_id),
            events: Vec::new(),
            state: SessionState::new(),
        }
    }

    /// Rebuild a session from its persisted parts
    pub fn restore(metadata: SessionMetadata, events: Vec<Event>) -> Self {
        let state = SessionState::replay(&events);
        let mut metadata = metadata;
        if let Some(last) = events.last() {
            // The log is authoritative if metadata lagged behind a crash
            metadata.last_sequence = metadata.last_sequence.max(last.sequence);
        }
        Self {
            metadata,
            events,
            state,
        }
    }

    /// Get the session ID
    pub fn session_id(&self) -> &str {
        &self.metadata.session_id
    }

    /// Sequence number the next event will receive
    pub fn next_sequence(&self) -> u64 {
        self.metadata.last_sequence + 1
    }

    /// Apply an already persisted event to the log and projection
    pub fn commit(&mut self, event: Event) {
        let completes_turn = matches!(event.payload, EventPayload::TurnComplete { .. });
        self.state.apply_event(&event);
        self.metadata.record_event(event.sequence, completes_turn);
        self.events.push(event);
    }

    /// Get the event log
    pub fn history(&self) -> &[Event] {
        &self.events
    }
}

/// Read-only copy of a session, as returned to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    /// Session metadata
    pub metadata: SessionMetadata,
    /// State projected from this session's own log
    pub state: BTreeMap<String, Value>,
    /// Current `user:` and `app:` values, including writes from other sessions
    pub shared: BTreeMap<String, Value>,
    /// Event log
    pub events: Vec<Event>,
}

impl SessionSnapshot {
    /// Get a value from this session's projection
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.state.get(key)
    }

    /// Get a value as an agent sees it, shared registers first
    pub fn lookup(&self, key: &str) -> Option<&Value> {
        self.shared.get(key).or_else(|| self.state.get(key))
    }

    /// The projection with the shared registers overlaid
    pub fn visible_state(&self) -> BTreeMap<String, Value> {
        overlay_shared(&self.state, &self.shared)
    }
}

/// Overlay shared register values on a session projection
pub fn overlay_shared(
    state: &BTreeMap<String, Value>,
    shared: &BTreeMap<String, Value>,
) -> BTreeMap<String, Value> {
    let mut visible = state.clone();
    visible.extend(shared.iter().map(|(k, v)| (k.clone(), v.clone())));
    visible
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StateDelta;
    use serde_json::json;

    fn sequenced(mut event: Event, sequence: u64) -> Event {
        event.sequence = sequence;
        event
    }

    #[test]
    fn test_new_session() {
        let key = SessionKey::new("analytics", "u1", "s1");
        let session = Session::new(&key);

        assert_eq!(session.session_id(), "s1");
        assert_eq!(session.next_sequence(), 1);
        assert!(session.history().is_empty());
        assert_eq!(key.to_string(), "analytics/u1/s1");
    }

    #[test]
    fn test_commit_updates_projection() {
        let mut session = Session::new(&SessionKey::new("analytics", "u1", "s1"));

        let mut delta = StateDelta::new();
        delta.insert("analyst_result".into(), json!("1"));
        session.commit(sequenced(
            Event::new("t1", "DataAnalyst", EventPayload::StateDelta { delta }),
            1,
        ));
        session.commit(sequenced(
            Event::new(
                "t1",
                "DataAnalyst",
                EventPayload::TurnComplete {
                    agent: "DataAnalyst".into(),
                    sticky: true,
                },
            ),
            2,
        ));

        assert_eq!(session.state.get("analyst_result"), Some(&json!("1")));
        assert_eq!(session.next_sequence(), 3);
        assert_eq!(session.metadata.turn_count, 1);
    }

    #[test]
    fn test_restore_trusts_log() {
        let key = SessionKey::new("analytics", "u1", "s1");
        let meta = SessionMetadata::new(&key.app_name, &key.user_id, &key.session_id);
        let events = vec![
            sequenced(Event::new("t1", "user", EventPayload::Text { text: "a".into() }), 1),
            sequenced(Event::new("t1", "A", EventPayload::Text { text: "b".into() }), 2),
        ];

        let session = Session::restore(meta, events);
        assert_eq!(session.next_sequence(), 3);
    }
}
