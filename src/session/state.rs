//! Scoped session state, projected from the event log
//!
//! Keys are partitioned by prefix:
//! - no prefix: session scope
//! - `user:` shared by all sessions of one user
//! - `app:` shared by every user of the application
//! - `temp:` lives for the current turn only and is never persisted

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::core::{Event, StateDelta};

/// Prefix of application-scoped keys
pub const APP_PREFIX: &str = "app:";
/// Prefix of user-scoped keys
pub const USER_PREFIX: &str = "user:";
/// Prefix of turn-scoped keys
pub const TEMP_PREFIX: &str = "temp:";

const RESERVED_PREFIXES: [&str; 3] = [APP_PREFIX, USER_PREFIX, TEMP_PREFIX];

/// Lifetime of a state key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StateScope {
    /// Lives as long as the session
    #[default]
    Session,
    /// Persists across sessions of one user
    User,
    /// Shared by all users of the application
    App,
    /// Discarded at the end of the turn
    Temp,
}

impl StateScope {
    /// Scope of a fully qualified key
    pub fn of(key: &str) -> Self {
        if key.starts_with(APP_PREFIX) {
            StateScope::App
        } else if key.starts_with(USER_PREFIX) {
            StateScope::User
        } else if key.starts_with(TEMP_PREFIX) {
            StateScope::Temp
        } else {
            StateScope::Session
        }
    }

    /// Key prefix for this scope
    pub fn prefix(&self) -> &'static str {
        match self {
            StateScope::Session => "",
            StateScope::User => USER_PREFIX,
            StateScope::App => APP_PREFIX,
            StateScope::Temp => TEMP_PREFIX,
        }
    }

    /// Qualify a bare key with this scope's prefix
    pub fn qualify(&self, key: &str) -> String {
        format!("{}{}", self.prefix(), key)
    }
}

/// Whether `key` starts with one of the reserved scope prefixes
pub fn has_reserved_prefix(key: &str) -> bool {
    RESERVED_PREFIXES.iter().any(|p| key.starts_with(p))
}

/// Split a delta into its persisted part and its turn-scoped part
pub fn split_ephemeral(delta: StateDelta) -> (StateDelta, StateDelta) {
    delta
        .into_iter()
        .partition(|(key, _)| StateScope::of(key) != StateScope::Temp)
}

/// Projection of a session's event log
///
/// Only ever changed by applying events, so replaying the log from empty
/// reproduces it exactly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    values: BTreeMap<String, Value>,
}

impl SessionState {
    /// Create an empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild state by applying every event of a log in order
    pub fn replay<'a>(events: impl IntoIterator<Item = &'a Event>) -> Self {
        let mut state = Self::new();
        for event in events {
            state.apply_event(event);
        }
        state
    }

    /// Apply the delta carried by `event`, if any
    pub fn apply_event(&mut self, event: &Event) {
        if let Some(delta) = event.state_delta() {
            self.apply(delta);
        }
    }

    /// Apply a delta; turn-scoped keys are ignored
    pub fn apply(&mut self, delta: &StateDelta) {
        for (key, value) in delta {
            if StateScope::of(key) == StateScope::Temp {
                continue;
            }
            self.values.insert(key.clone(), value.clone());
        }
    }

    /// Get a value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// All values
    pub fn as_map(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    /// Values of one scope
    pub fn scoped(&self, scope: StateScope) -> BTreeMap<String, Value> {
        self.values
            .iter()
            .filter(|(k, _)| StateScope::of(k) == scope)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
