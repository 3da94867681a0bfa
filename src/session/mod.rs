//! Session management
//!
//! This module provides the event-sourced session model:
//! - `SessionStore` - owns every session and serializes appends per session
//! - `Session` / `SessionSnapshot` - a session's log, metadata and state
//! - `SessionState` - scoped state projected from the log
//! - `SessionStorage` - on-disk layout for logs and shared registers

pub mod metadata;
pub mod session;
pub mod state;
pub mod storage;
pub mod store;

pub use metadata::SessionMetadata;
pub use session::{Session, SessionKey, SessionSnapshot};
pub use state::{
    has_reserved_prefix, split_ephemeral, SessionState, StateScope, APP_PREFIX, TEMP_PREFIX,
    USER_PREFIX,
};
pub use storage::SessionStorage;
pub use store::{AppendOutcome, SessionStore};
