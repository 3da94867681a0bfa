//! Core types for the orchestrator
//!
//! This module provides the fundamental types used throughout the crate:
//! - `Event` / `EventPayload` - The session log and stream unit
//! - `ToolContext` - Scoped state passed to a single tool call
//! - `TurnPhase` - Current phase of a turn
//! - `OrchestratorError` - Error types

pub mod context;
pub mod error;
pub mod event;
pub mod state;

pub use context::{ResourceMap, ToolContext, ToolScope};
pub use error::{ErrorKind, OrchestratorError, OrchestratorResult};
pub use event::{Attachment, Event, EventPayload, StateDelta, USER_AUTHOR};
pub use state::TurnPhase;
