//! Orchestrator configuration
//!
//! Runtime limits and policies, plus the static agent tree. Both load from
//! JSON; every field of `OrchestratorConfig` has a default.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::definition::AgentDefinition;
use super::registry::AgentRegistry;
use crate::core::{OrchestratorError, OrchestratorResult};
use crate::llm::RetryPolicy;

/// What to do when a turn arrives for a session that is mid-turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BusyPolicy {
    /// Fail the new request with `SessionBusy`
    #[default]
    Reject,
    /// Wait until the running turn finishes
    Queue,
}

/// Configuration for an `Orchestrator`
///
/// Use the builder pattern to configure:
///
/// ```ignore
/// let config = OrchestratorConfig::default()
///     .with_max_iterations(10)
///     .with_busy_policy(BusyPolicy::Queue)
///     .with_model_timeout(Duration::from_secs(30));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Maximum backend calls per turn (prevents runaway tool/transfer loops)
    pub max_iterations: usize,

    /// Number of recent events from earlier turns offered to the model
    pub history_window: usize,

    /// Deadline for one backend call
    pub model_timeout_ms: u64,

    /// Deadline for one tool call
    pub tool_timeout_ms: u64,

    /// Delay before retrying a failed backend call
    pub retry_backoff_ms: u64,

    /// Handling of concurrent turns on one session
    pub busy_policy: BusyPolicy,

    /// Whether unknown sessions are created on first turn
    pub create_sessions: bool,

    /// Capacity of the per-turn event channel
    pub stream_buffer: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_iterations: 25,
            history_window: 50,
            model_timeout_ms: 60_000,
            tool_timeout_ms: 30_000,
            retry_backoff_ms: 500,
            busy_policy: BusyPolicy::Reject,
            create_sessions: true,
            stream_buffer: 64,
        }
    }
}

impl OrchestratorConfig {
    /// Load from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> OrchestratorResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the runner cannot work with
    pub fn validate(&self) -> OrchestratorResult<()> {
        if self.max_iterations == 0 {
            return Err(OrchestratorError::config("max_iterations must be at least 1"));
        }
        if self.stream_buffer == 0 {
            return Err(OrchestratorError::config("stream_buffer must be at least 1"));
        }
        if self.model_timeout_ms == 0 || self.tool_timeout_ms == 0 {
            return Err(OrchestratorError::config("timeouts must be non-zero"));
        }
        Ok(())
    }

    /// Set the per-turn iteration guard
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    /// Set the history window
    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    /// Set the backend call deadline
    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the tool call deadline
    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the retry backoff
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff_ms = backoff.as_millis() as u64;
        self
    }

    /// Set the busy policy
    pub fn with_busy_policy(mut self, policy: BusyPolicy) -> Self {
        self.busy_policy = policy;
        self
    }

    /// Set whether sessions are created on demand
    pub fn with_create_sessions(mut self, create: bool) -> Self {
        self.create_sessions = create;
        self
    }

    /// Set the event channel capacity
    pub fn with_stream_buffer(mut self, capacity: usize) -> Self {
        self.stream_buffer = capacity;
        self
    }

    /// Tool call deadline
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_timeout_ms)
    }

    /// Retry policy for backend calls: one retry after the backoff
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(self.retry_backoff_ms),
            timeout: Duration::from_millis(self.model_timeout_ms),
        }
    }
}

/// Static agent tree as written in configuration
///
/// ```json
/// {
///   "root": "Orchestrator",
///   "agents": [
///     {"name": "Orchestrator", "children": ["DataAnalyst"]},
///     {"name": "DataAnalyst", "description": "Runs SQL", "tools": ["run_query"]}
///   ]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentTreeConfig {
    /// Name of the root agent
    pub root: String,
    /// Every agent in the tree
    pub agents: Vec<AgentDefinition>,
}

impl AgentTreeConfig {
    /// Parse from a JSON string
    pub fn from_json_str(json: &str) -> OrchestratorResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| OrchestratorError::config(format!("Invalid agent tree: {}", e)))
    }

    /// Load from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> OrchestratorResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    /// Validate into an `AgentRegistry`
    pub fn build(self) -> OrchestratorResult<AgentRegistry> {
        AgentRegistry::new(self.root, self.agents)
    }
}
