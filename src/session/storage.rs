//! Session storage helpers
//!
//! Handles reading and writing session data to disk. Layout:
//!
//! ```text
//! <base>/<app>/<session>/metadata.json
//! <base>/<app>/<session>/events.jsonl
//! <base>/<app>/app_state.json
//! <base>/<app>/users/<user>.json
//! ```

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::core::{Event, OrchestratorError, OrchestratorResult};

use super::metadata::SessionMetadata;

/// Default directory for session storage
const SESSIONS_DIR: &str = "sessions";
const USERS_DIR: &str = "users";
const APP_STATE_FILE: &str = "app_state.json";

/// Session storage manager
#[derive(Debug, Clone)]
pub struct SessionStorage {
    base_dir: PathBuf,
}

impl SessionStorage {
    /// Create a new session storage with the default directory
    pub fn new() -> Self {
        Self {
            base_dir: PathBuf::from(SESSIONS_DIR),
        }
    }

    /// Create a new session storage with a custom directory
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: dir.into(),
        }
    }

    /// Get the base directory
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Directory of one application
    pub fn app_dir(&self, app_name: &str) -> OrchestratorResult<PathBuf> {
        Ok(self.base_dir.join(path_component(app_name)?))
    }

    /// Get the directory path for a session
    pub fn session_dir(&self, app_name: &str, session_id: &str) -> OrchestratorResult<PathBuf> {
        Ok(self.app_dir(app_name)?.join(path_component(session_id)?))
    }

    /// Get the metadata file path for a session
    pub fn metadata_path(&self, app_name: &str, session_id: &str) -> OrchestratorResult<PathBuf> {
        Ok(self.session_dir(app_name, session_id)?.join("metadata.json"))
    }

    /// Get the event log path for a session
    pub fn events_path(&self, app_name: &str, session_id: &str) -> OrchestratorResult<PathBuf> {
        Ok(self.session_dir(app_name, session_id)?.join("events.jsonl"))
    }

    /// Path of the app-scoped state file
    pub fn app_state_path(&self, app_name: &str) -> OrchestratorResult<PathBuf> {
        Ok(self.app_dir(app_name)?.join(APP_STATE_FILE))
    }

    /// Path of a user-scoped state file
    pub fn user_state_path(&self, app_name: &str, user_id: &str) -> OrchestratorResult<PathBuf> {
        Ok(self
            .app_dir(app_name)?
            .join(USERS_DIR)
            .join(format!("{}.json", path_component(user_id)?)))
    }

    /// Save session metadata
    pub fn save_metadata(&self, metadata: &SessionMetadata) -> OrchestratorResult<()> {
        let path = self.metadata_path(&metadata.app_name, &metadata.session_id)?;
        write_json_atomic(&path, metadata)
    }

    /// Load session metadata
    pub fn load_metadata(&self, app_name: &str, session_id: &str) -> OrchestratorResult<SessionMetadata> {
        let path = self.metadata_path(app_name, session_id)?;

        if !path.exists() {
            return Err(OrchestratorError::SessionNotFound(session_id.to_string()));
        }

        let file = File::open(&path)?;
        let reader = BufReader::new(file);
        let metadata: SessionMetadata = serde_json::from_reader(reader)?;

        Ok(metadata)
    }

    /// Append one event to the session's log and flush it to disk
    ///
    /// On any failure the log is cut back to its previous length, so a
    /// rejected event never reappears on reload.
    pub fn append_event(&self, app_name: &str, session_id: &str, event: &Event) -> OrchestratorResult<()> {
        let path = self.events_path(app_name, session_id)?;
        ensure_parent(&path)?;

        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        let len = file.metadata()?.len();

        let written = file.write_all(line.as_bytes()).and_then(|()| file.sync_data());
        if let Err(e) = written {
            if let Err(rollback) = file.set_len(len) {
                tracing::error!(
                    "[SessionStorage] Failed to roll back {} to {} bytes: {}",
                    path.display(),
                    len,
                    rollback
                );
            }
            return Err(e.into());
        }

        Ok(())
    }

    /// Load all events from the session's log
    ///
    /// A torn final record (a crash mid-append) is dropped and cut from the
    /// file. A malformed record anywhere else is an error.
    pub fn load_events(&self, app_name: &str, session_id: &str) -> OrchestratorResult<Vec<Event>> {
        let path = self.events_path(app_name, session_id)?;

        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&path)?;
        let mut events = Vec::new();
        let mut offset = 0usize;
        let mut records = content.split_inclusive('\n');

        while let Some(raw) = records.next() {
            let start = offset;
            offset += raw.len();

            let line = raw.trim();
            if line.is_empty() {
                continue;
            }

            match serde_json::from_str::<Event>(line) {
                Ok(event) => events.push(event),
                Err(e) if records.clone().all(|rest| rest.trim().is_empty()) => {
                    tracing::warn!(
                        app = app_name,
                        session_id,
                        "[SessionStorage] Dropping torn final record in {}: {}",
                        path.display(),
                        e
                    );
                    truncate_file(&path, start as u64)?;
                    return Ok(events);
                }
                Err(e) => return Err(e.into()),
            }
        }

        if !content.is_empty() && !content.ends_with('\n') {
            // Complete record whose newline never made it; terminate it
            // so the next append starts on a fresh line
            fs::OpenOptions::new().append(true).open(&path)?.write_all(b"\n")?;
        }

        Ok(events)
    }

    /// Check if a session exists
    pub fn session_exists(&self, app_name: &str, session_id: &str) -> bool {
        self.metadata_path(app_name, session_id)
            .map(|p| p.exists())
            .unwrap_or(false)
    }

    /// List the session IDs stored for an application
    pub fn list_sessions(&self, app_name: &str) -> OrchestratorResult<Vec<String>> {
        let app_dir = self.app_dir(app_name)?;
        if !app_dir.exists() {
            return Ok(Vec::new());
        }

        let mut sessions = Vec::new();

        for entry in fs::read_dir(&app_dir)? {
            let entry = entry?;
            let path = entry.path();

            if path.is_dir() {
                if let Some(name_str) = path.file_name().and_then(|n| n.to_str()) {
                    // Check if it has a metadata file
                    if self.session_exists(app_name, name_str) {
                        sessions.push(name_str.to_string());
                    }
                }
            }
        }

        sessions.sort();
        Ok(sessions)
    }

    /// Load the app-scoped register
    pub fn load_app_state(&self, app_name: &str) -> OrchestratorResult<BTreeMap<String, Value>> {
        read_json_or_default(&self.app_state_path(app_name)?)
    }

    /// Save the app-scoped register
    pub fn save_app_state(&self, app_name: &str, state: &BTreeMap<String, Value>) -> OrchestratorResult<()> {
        write_json_atomic(&self.app_state_path(app_name)?, state)
    }

    /// Load a user-scoped register
    pub fn load_user_state(&self, app_name: &str, user_id: &str) -> OrchestratorResult<BTreeMap<String, Value>> {
        read_json_or_default(&self.user_state_path(app_name, user_id)?)
    }

    /// Save a user-scoped register
    pub fn save_user_state(
        &self,
        app_name: &str,
        user_id: &str,
        state: &BTreeMap<String, Value>,
    ) -> OrchestratorResult<()> {
        write_json_atomic(&self.user_state_path(app_name, user_id)?, state)
    }
}

impl Default for SessionStorage {
    fn default() -> Self {
        Self::new()
    }
}

/// Reject identifiers that would escape their directory
fn path_component(id: &str) -> OrchestratorResult<&str> {
    let valid = !id.is_empty()
        && id != "."
        && id != ".."
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@'));
    if valid {
        Ok(id)
    } else {
        Err(OrchestratorError::Store(format!(
            "Invalid identifier for storage: {:?}",
            id
        )))
    }
}

fn truncate_file(path: &Path, len: u64) -> OrchestratorResult<()> {
    let file = fs::OpenOptions::new().write(true).open(path)?;
    file.set_len(len)?;
    file.sync_data()?;
    Ok(())
}

fn ensure_parent(path: &Path) -> OrchestratorResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Write through a temp file and rename, so readers never see half a file
fn write_json_atomic<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> OrchestratorResult<()> {
    ensure_parent(path)?;
    let tmp = path.with_extension("json.tmp");

    {
        let file = File::create(&tmp)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush()?;
    }

    fs::rename(&tmp, path)?;
    Ok(())
}

fn read_json_or_default<T: serde::de::DeserializeOwned + Default>(path: &Path) -> OrchestratorResult<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EventPayload;
    use serde_json::json;
    use tempfile::TempDir;

    fn create_test_storage() -> (SessionStorage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = SessionStorage::with_dir(temp_dir.path());
        (storage, temp_dir)
    }

    #[test]
    fn test_save_load_metadata() {
        let (storage, _temp) = create_test_storage();

        let meta = SessionMetadata::new("analytics", "u1", "s1");
        storage.save_metadata(&meta).unwrap();

        let loaded = storage.load_metadata("analytics", "s1").unwrap();
        assert_eq!(loaded.session_id, "s1");
        assert_eq!(loaded.user_id, "u1");
        assert!(storage.base_dir().join("analytics/s1/metadata.json").exists());
    }

    #[test]
    fn test_missing_metadata_is_not_found() {
        let (storage, _temp) = create_test_storage();
        assert!(matches!(
            storage.load_metadata("analytics", "nope"),
            Err(OrchestratorError::SessionNotFound(_))
        ));
    }

    #[test]
    fn test_append_load_events() {
        let (storage, _temp) = create_test_storage();

        let mut first = Event::new("t1", "user", EventPayload::Text { text: "hi".into() });
        first.sequence = 1;
        let mut second = Event::new("t1", "Orchestrator", EventPayload::Text { text: "hello".into() });
        second.sequence = 2;

        storage.append_event("analytics", "s1", &first).unwrap();
        storage.append_event("analytics", "s1", &second).unwrap();

        let events = storage.load_events("analytics", "s1").unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], first);
        assert_eq!(events[1].sequence, 2);
    }

    fn text_event(sequence: u64, text: &str) -> Event {
        let mut event = Event::new("t1", "Orchestrator", EventPayload::Text { text: text.into() });
        event.sequence = sequence;
        event
    }

    fn append_raw(storage: &SessionStorage, bytes: &str) {
        let path = storage.events_path("analytics", "s1").unwrap();
        let mut file = fs::OpenOptions::new().append(true).open(path).unwrap();
        file.write_all(bytes.as_bytes()).unwrap();
    }

    #[test]
    fn test_torn_final_record_is_dropped_and_cut() {
        let (storage, _temp) = create_test_storage();
        storage.append_event("analytics", "s1", &text_event(1, "hi")).unwrap();
        let intact_len = fs::metadata(storage.events_path("analytics", "s1").unwrap())
            .unwrap()
            .len();

        append_raw(&storage, r#"{"id":"x","seq"#);

        let events = storage.load_events("analytics", "s1").unwrap();
        assert_eq!(events, vec![text_event(1, "hi")]);
        let path = storage.events_path("analytics", "s1").unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), intact_len);

        // The next record lands on a clean line
        storage.append_event("analytics", "s1", &text_event(2, "again")).unwrap();
        let events = storage.load_events("analytics", "s1").unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].sequence, 2);
    }

    #[test]
    fn test_record_missing_newline_is_kept() {
        let (storage, _temp) = create_test_storage();
        storage.append_event("analytics", "s1", &text_event(1, "hi")).unwrap();
        append_raw(&storage, &serde_json::to_string(&text_event(2, "no newline")).unwrap());

        assert_eq!(storage.load_events("analytics", "s1").unwrap().len(), 2);

        storage.append_event("analytics", "s1", &text_event(3, "next")).unwrap();
        let sequences: Vec<u64> = storage
            .load_events("analytics", "s1")
            .unwrap()
            .iter()
            .map(|e| e.sequence)
            .collect();
        assert_eq!(sequences, vec![1, 2, 3]);
    }

    #[test]
    fn test_corrupt_record_before_the_end_is_an_error() {
        let (storage, _temp) = create_test_storage();
        storage.append_event("analytics", "s1", &text_event(1, "hi")).unwrap();
        append_raw(&storage, "not json\n");
        storage.append_event("analytics", "s1", &text_event(2, "after")).unwrap();

        assert!(matches!(
            storage.load_events("analytics", "s1"),
            Err(OrchestratorError::Serialization(_))
        ));
    }

    #[test]
    fn test_session_exists_and_list() {
        let (storage, _temp) = create_test_storage();

        assert!(!storage.session_exists("analytics", "s1"));
        assert!(storage.list_sessions("analytics").unwrap().is_empty());

        storage.save_metadata(&SessionMetadata::new("analytics", "u1", "s2")).unwrap();
        storage.save_metadata(&SessionMetadata::new("analytics", "u1", "s1")).unwrap();
        storage.save_metadata(&SessionMetadata::new("other", "u1", "s3")).unwrap();

        assert!(storage.session_exists("analytics", "s1"));
        assert_eq!(storage.list_sessions("analytics").unwrap(), vec!["s1", "s2"]);
    }

    #[test]
    fn test_shared_registers() {
        let (storage, _temp) = create_test_storage();

        assert!(storage.load_app_state("analytics").unwrap().is_empty());

        let mut app = BTreeMap::new();
        app.insert("app:version".to_string(), json!("2"));
        storage.save_app_state("analytics", &app).unwrap();

        let mut user = BTreeMap::new();
        user.insert("user:lang".to_string(), json!("en"));
        storage.save_user_state("analytics", "u1", &user).unwrap();

        assert_eq!(storage.load_app_state("analytics").unwrap(), app);
        assert_eq!(storage.load_user_state("analytics", "u1").unwrap(), user);
        assert!(storage.load_user_state("analytics", "u2").unwrap().is_empty());
    }

    #[test]
    fn test_rejects_path_escapes() {
        let (storage, _temp) = create_test_storage();
        assert!(matches!(
            storage.session_dir("analytics", "../etc"),
            Err(OrchestratorError::Store(_))
        ));
        assert!(storage.session_dir("", "s1").is_err());
        assert!(!storage.session_exists("analytics", ".."));
    }
}
