//! Session metadata types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Metadata for a conversation session
///
/// This is persisted separately from the event log for quick access.
/// Everything here except `custom` can be rebuilt from the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    // --- Identity ---
    /// Unique session ID
    pub session_id: String,

    /// Owning user
    pub user_id: String,

    /// Application the session belongs to
    pub app_name: String,

    // --- Progress ---
    /// Sequence number of the last appended event
    #[serde(default)]
    pub last_sequence: u64,

    /// Number of turns that completed
    #[serde(default)]
    pub turn_count: u64,

    // --- Timestamps ---
    /// When the session was created
    pub created_at: DateTime<Utc>,

    /// When the session was last updated
    pub updated_at: DateTime<Utc>,

    // --- Custom Metadata ---
    /// Extensible metadata
    #[serde(default)]
    pub custom: HashMap<String, Value>,
}

impl SessionMetadata {
    /// Create new metadata for an empty session
    pub fn new(
        app_name: impl Into<String>,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            app_name: app_name.into(),
            last_sequence: 0,
            turn_count: 0,
            created_at: now,
            updated_at: now,
            custom: HashMap::new(),
        }
    }

    /// Update the updated_at timestamp
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Record an appended event
    pub fn record_event(&mut self, sequence: u64, completes_turn: bool) {
        self.last_sequence = sequence;
        if completes_turn {
            self.turn_count += 1;
        }
        self.touch();
    }

    /// Set custom metadata
    pub fn set_custom(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.custom.insert(key.into(), value.into());
        self.touch();
    }

    /// Get custom metadata
    pub fn get_custom(&self, key: &str) -> Option<&Value> {
        self.custom.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_metadata() {
        let meta = SessionMetadata::new("analytics", "u1", "s1");

        assert_eq!(meta.session_id, "s1");
        assert_eq!(meta.user_id, "u1");
        assert_eq!(meta.app_name, "analytics");
        assert_eq!(meta.last_sequence, 0);
        assert_eq!(meta.turn_count, 0);
    }

    #[test]
    fn test_record_event() {
        let mut meta = SessionMetadata::new("analytics", "u1", "s1");

        meta.record_event(1, false);
        meta.record_event(2, true);

        assert_eq!(meta.last_sequence, 2);
        assert_eq!(meta.turn_count, 1);
        assert!(meta.updated_at >= meta.created_at);
    }

    #[test]
    fn test_custom_metadata() {
        let mut meta = SessionMetadata::new("analytics", "u1", "s1");

        meta.set_custom("title", "Quarterly numbers");
        meta.set_custom("priority", serde_json::json!(2));

        assert_eq!(
            meta.get_custom("title").and_then(|v| v.as_str()),
            Some("Quarterly numbers")
        );
        assert_eq!(meta.get_custom("priority").and_then(|v| v.as_i64()), Some(2));
    }

    #[test]
    fn test_serialization_defaults() {
        let json = r#"{
            "session_id": "s1",
            "user_id": "u1",
            "app_name": "analytics",
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-01T00:00:00Z"
        }"#;

        let loaded: SessionMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(loaded.last_sequence, 0);
        assert!(loaded.custom.is_empty());
    }
}
