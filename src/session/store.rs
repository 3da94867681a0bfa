//! Session store: the single owner of every session's event log
//!
//! Appends for one session are serialized by that session's lock, so
//! sequence numbers are gap-free and never duplicated. An event is written
//! to storage before the in-memory projection changes; if the write fails
//! nothing changes.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{Mutex, RwLock};

use crate::core::{Event, EventPayload, OrchestratorError, OrchestratorResult};

use super::session::{overlay_shared, Session, SessionKey, SessionSnapshot};
use super::state::{split_ephemeral, StateScope};
use super::storage::SessionStorage;

type SessionSlot = Arc<Mutex<Session>>;
type Register = BTreeMap<String, Value>;

/// Result of a successful append
#[derive(Debug, Clone)]
pub struct AppendOutcome {
    /// The event as stored, with its sequence number
    pub event: Event,
    /// Session projection after the append
    pub state: BTreeMap<String, Value>,
    /// Shared `user:` and `app:` registers after the append
    pub shared: BTreeMap<String, Value>,
}

impl AppendOutcome {
    /// The projection with the shared registers overlaid
    pub fn visible_state(&self) -> BTreeMap<String, Value> {
        overlay_shared(&self.state, &self.shared)
    }
}

/// Owns sessions and their durable logs
pub struct SessionStore {
    storage: Option<SessionStorage>,
    create_missing: bool,
    /// Keyed by (app, session); the owning user is checked on access
    sessions: RwLock<HashMap<(String, String), SessionSlot>>,
    app_registers: Mutex<HashMap<String, Register>>,
    user_registers: Mutex<HashMap<(String, String), Register>>,
}

impl SessionStore {
    /// Store that keeps everything in memory
    pub fn in_memory() -> Self {
        Self {
            storage: None,
            create_missing: true,
            sessions: RwLock::new(HashMap::new()),
            app_registers: Mutex::new(HashMap::new()),
            user_registers: Mutex::new(HashMap::new()),
        }
    }

    /// Store backed by files under `storage`
    pub fn persistent(storage: SessionStorage) -> Self {
        Self {
            storage: Some(storage),
            ..Self::in_memory()
        }
    }

    /// Whether unknown sessions are created on first access
    pub fn with_create_missing(mut self, create_missing: bool) -> Self {
        self.create_missing = create_missing;
        self
    }

    /// The backing storage, if any
    pub fn storage(&self) -> Option<&SessionStorage> {
        self.storage.as_ref()
    }

    /// Fetch a session, creating it when the store allows
    ///
    /// Never mutates the session's log or state.
    pub async fn get(&self, key: &SessionKey) -> OrchestratorResult<SessionSnapshot> {
        let slot = self.slot(key, self.create_missing).await?;
        let session = slot.lock().await;
        Ok(self.snapshot(&session).await)
    }

    /// Fetch a session, creating it regardless of the store's policy
    pub async fn create(&self, key: &SessionKey) -> OrchestratorResult<SessionSnapshot> {
        let slot = self.slot(key, true).await?;
        let session = slot.lock().await;
        Ok(self.snapshot(&session).await)
    }

    /// Check whether a session exists for this user
    pub async fn exists(&self, key: &SessionKey) -> bool {
        self.slot(key, false).await.is_ok()
    }

    /// Append one event and return the new state
    ///
    /// The store assigns the sequence number. Turn-scoped keys in a state
    /// delta are stripped before the event is written.
    pub async fn append(&self, key: &SessionKey, event: Event) -> OrchestratorResult<AppendOutcome> {
        let slot = self.slot(key, false).await?;
        let mut session = slot.lock().await;

        let mut event = event;
        event.sequence = session.next_sequence();
        if let EventPayload::StateDelta { delta } = &mut event.payload {
            let (persisted, _) = split_ephemeral(std::mem::take(delta));
            *delta = persisted;
        }

        if let Some(storage) = &self.storage {
            storage
                .append_event(&key.app_name, &key.session_id, &event)
                .map_err(|e| OrchestratorError::Store(format!("Failed to append to {}: {}", key, e)))?;
        }

        session.commit(event.clone());
        tracing::debug!(
            session = %key,
            sequence = event.sequence,
            "Appended {} event",
            event.payload.type_name()
        );

        if let Some(storage) = &self.storage {
            // Derivable from the log, so a failure here is not fatal
            if let Err(e) = storage.save_metadata(&session.metadata) {
                tracing::warn!("[SessionStore] Failed to save metadata for {}: {}", key, e);
            }
        }

        if let Some(delta) = event.state_delta() {
            self.update_registers(key, delta).await;
        }

        let snapshot = self.snapshot(&session).await;
        Ok(AppendOutcome {
            event,
            state: snapshot.state,
            shared: snapshot.shared,
        })
    }

    /// List a user's session IDs within an application
    pub async fn list_sessions(&self, app_name: &str, user_id: &str) -> OrchestratorResult<Vec<String>> {
        let mut ids = Vec::new();

        {
            let sessions = self.sessions.read().await;
            for ((app, id), slot) in sessions.iter() {
                if app == app_name && slot.lock().await.metadata.user_id == user_id {
                    ids.push(id.clone());
                }
            }
        }

        if let Some(storage) = &self.storage {
            for id in storage.list_sessions(app_name)? {
                if ids.contains(&id) {
                    continue;
                }
                match storage.load_metadata(app_name, &id) {
                    Ok(meta) if meta.user_id == user_id => ids.push(id),
                    Ok(_) => {}
                    Err(e) => tracing::warn!("[SessionStore] Skipping unreadable session {}: {}", id, e),
                }
            }
        }

        ids.sort();
        Ok(ids)
    }

    /// Resolve the slot for a session, loading or creating it
    async fn slot(&self, key: &SessionKey, create: bool) -> OrchestratorResult<SessionSlot> {
        let map_key = (key.app_name.clone(), key.session_id.clone());

        let existing = self.sessions.read().await.get(&map_key).cloned();
        if let Some(slot) = existing {
            return Self::check_owner(slot, key).await;
        }

        let mut sessions = self.sessions.write().await;
        if let Some(slot) = sessions.get(&map_key).cloned() {
            drop(sessions);
            return Self::check_owner(slot, key).await;
        }

        let session = match &self.storage {
            Some(storage) if storage.session_exists(&key.app_name, &key.session_id) => {
                let metadata = storage.load_metadata(&key.app_name, &key.session_id)?;
                let events = storage.load_events(&key.app_name, &key.session_id)?;
                tracing::info!(
                    "[SessionStore] Loaded session {} ({} events)",
                    key,
                    events.len()
                );
                Session::restore(metadata, events)
            }
            _ if create => {
                let session = Session::new(key);
                if let Some(storage) = &self.storage {
                    storage
                        .save_metadata(&session.metadata)
                        .map_err(|e| OrchestratorError::Store(format!("Failed to create {}: {}", key, e)))?;
                }
                tracing::info!("[SessionStore] Created session {}", key);
                session
            }
            _ => return Err(OrchestratorError::SessionNotFound(key.session_id.clone())),
        };

        if session.metadata.user_id != key.user_id {
            return Err(OrchestratorError::SessionNotFound(key.session_id.clone()));
        }

        let slot = Arc::new(Mutex::new(session));
        sessions.insert(map_key, slot.clone());
        Ok(slot)
    }

    async fn check_owner(slot: SessionSlot, key: &SessionKey) -> OrchestratorResult<SessionSlot> {
        if slot.lock().await.metadata.user_id == key.user_id {
            Ok(slot)
        } else {
            Err(OrchestratorError::SessionNotFound(key.session_id.clone()))
        }
    }

    /// Session projection plus the current shared registers
    ///
    /// The registers are kept apart from `state` so the projection stays
    /// equal to a replay of this session's log.
    async fn snapshot(&self, session: &Session) -> SessionSnapshot {
        let meta = &session.metadata;
        let mut shared = Register::new();

        {
            let mut users = self.user_registers.lock().await;
            let register = users
                .entry((meta.app_name.clone(), meta.user_id.clone()))
                .or_insert_with(|| self.load_register(&meta.app_name, Some(meta.user_id.as_str())));
            shared.extend(register.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        {
            let mut apps = self.app_registers.lock().await;
            let register = apps
                .entry(meta.app_name.clone())
                .or_insert_with(|| self.load_register(&meta.app_name, None));
            shared.extend(register.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        SessionSnapshot {
            metadata: meta.clone(),
            state: session.state.as_map().clone(),
            shared,
            events: session.events.clone(),
        }
    }

    async fn update_registers(&self, key: &SessionKey, delta: &BTreeMap<String, Value>) {
        let user_writes: Register = delta
            .iter()
            .filter(|(k, _)| StateScope::of(k) == StateScope::User)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let app_writes: Register = delta
            .iter()
            .filter(|(k, _)| StateScope::of(k) == StateScope::App)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        if !user_writes.is_empty() {
            let mut users = self.user_registers.lock().await;
            let register = users
                .entry((key.app_name.clone(), key.user_id.clone()))
                .or_insert_with(|| self.load_register(&key.app_name, Some(key.user_id.as_str())));
            register.extend(user_writes);
            if let Some(storage) = &self.storage {
                if let Err(e) = storage.save_user_state(&key.app_name, &key.user_id, register) {
                    tracing::warn!("[SessionStore] Failed to save user state for {}: {}", key, e);
                }
            }
        }

        if !app_writes.is_empty() {
            let mut apps = self.app_registers.lock().await;
            let register = apps
                .entry(key.app_name.clone())
                .or_insert_with(|| self.load_register(&key.app_name, None));
            register.extend(app_writes);
            if let Some(storage) = &self.storage {
                if let Err(e) = storage.save_app_state(&key.app_name, register) {
                    tracing::warn!("[SessionStore] Failed to save app state for {}: {}", key.app_name, e);
                }
            }
        }
    }

    fn load_register(&self, app_name: &str, user_id: Option<&str>) -> Register {
        let Some(storage) = &self.storage else {
            return Register::new();
        };
        let loaded = match user_id {
            Some(user) => storage.load_user_state(app_name, user),
            None => storage.load_app_state(app_name),
        };
        loaded.unwrap_or_else(|e| {
            tracing::warn!("[SessionStore] Failed to load shared state for {}: {}", app_name, e);
            Register::new()
        })
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("storage", &self.storage)
            .field("create_missing", &self.create_missing)
            .finish()
    }
}
