//! Multi-agent orchestration over event-sourced sessions
//!
//! A turn routes a user message through a tree of agents. Each model step,
//! tool call, delegation and state change becomes an event that is persisted
//! to the session log before it is streamed to the caller.

pub mod agent;
pub mod core;
pub mod llm;
pub mod runtime;
pub mod session;
pub mod tools;

// Optional components
pub mod logging;

pub use crate::agent::{AgentDefinition, AgentRegistry, AgentTreeConfig, BusyPolicy, OrchestratorConfig};
pub use crate::core::{Event, EventPayload, OrchestratorError, OrchestratorResult, StateDelta, TurnPhase};
pub use crate::llm::{ModelBackend, ModelRequest, ModelResponse, ScriptedBackend};
pub use crate::runtime::{encode_sse, Orchestrator, TurnHandle, TurnOutcome, TurnRequest, TurnStream};
pub use crate::session::{SessionKey, SessionSnapshot, SessionStore};
pub use crate::tools::{FunctionTool, Tool, ToolRegistry};
