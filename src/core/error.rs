//! Orchestrator error types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while configuring or running the orchestrator
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// Invalid agent graph or settings (fatal at startup)
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// No tool registered under the requested name
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// A tool invocation failed
    #[error("Tool '{tool}' failed: {message}")]
    Tool {
        /// Name of the failing tool
        tool: String,
        /// Failure description
        message: String,
    },

    /// Transfer directive named an agent the current agent cannot reach
    #[error("Cannot transfer from '{from}' to '{to}': {reason}")]
    Routing {
        /// Agent that issued the transfer
        from: String,
        /// Requested target
        to: String,
        /// Why the transfer was rejected
        reason: String,
    },

    /// Iteration guard exceeded
    #[error("Orchestration aborted: {0}")]
    Orchestration(String),

    /// Session does not exist and creation is disabled
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Session already has a turn in flight
    #[error("Session busy: {0}")]
    SessionBusy(String),

    /// Language-model backend failure
    #[error("Backend error: {0}")]
    Backend(String),

    /// Backend or tool call exceeded its deadline
    #[error("Timed out after {0} ms")]
    Timeout(u64),

    /// Event log append failed
    #[error("Store error: {0}")]
    Store(String),

    /// Channel closed unexpectedly
    #[error("Channel closed")]
    ChannelClosed,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl OrchestratorError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        OrchestratorError::Config(msg.into())
    }

    /// Create a tool error
    pub fn tool(tool: impl Into<String>, msg: impl Into<String>) -> Self {
        OrchestratorError::Tool {
            tool: tool.into(),
            message: msg.into(),
        }
    }

    /// Create a routing error
    pub fn routing(from: impl Into<String>, to: impl Into<String>, reason: impl Into<String>) -> Self {
        OrchestratorError::Routing {
            from: from.into(),
            to: to.into(),
            reason: reason.into(),
        }
    }

    /// Classify this error for an `error` event
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrchestratorError::Config(_) => ErrorKind::Config,
            OrchestratorError::UnknownTool(_) | OrchestratorError::Tool { .. } => ErrorKind::Tool,
            OrchestratorError::Routing { .. } => ErrorKind::Routing,
            OrchestratorError::Orchestration(_) => ErrorKind::Orchestration,
            OrchestratorError::SessionNotFound(_) | OrchestratorError::SessionBusy(_) => {
                ErrorKind::Session
            }
            OrchestratorError::Backend(_) => ErrorKind::Backend,
            OrchestratorError::Timeout(_) => ErrorKind::Timeout,
            OrchestratorError::Store(_)
            | OrchestratorError::ChannelClosed
            | OrchestratorError::Io(_)
            | OrchestratorError::Serialization(_) => ErrorKind::Store,
        }
    }
}

/// Result type alias for orchestrator operations
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Error classification carried inside `error` events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Config,
    Tool,
    Routing,
    Orchestration,
    Session,
    Backend,
    Timeout,
    Store,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Config => "config",
            ErrorKind::Tool => "tool",
            ErrorKind::Routing => "routing",
            ErrorKind::Orchestration => "orchestration",
            ErrorKind::Session => "session",
            ErrorKind::Backend => "backend",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Store => "store",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = OrchestratorError::SessionNotFound("abc123".into());
        assert_eq!(err.to_string(), "Session not found: abc123");

        let err = OrchestratorError::routing("Orchestrator", "Nobody", "not a child");
        assert_eq!(
            err.to_string(),
            "Cannot transfer from 'Orchestrator' to 'Nobody': not a child"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: OrchestratorError = io_err.into();
        assert!(matches!(err, OrchestratorError::Io(_)));
        assert_eq!(err.kind(), ErrorKind::Store);
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(OrchestratorError::UnknownTool("x".into()).kind(), ErrorKind::Tool);
        assert_eq!(OrchestratorError::Timeout(10).kind(), ErrorKind::Timeout);
        assert_eq!(
            OrchestratorError::SessionBusy("s".into()).kind(),
            ErrorKind::Session
        );
        assert_eq!(ErrorKind::Orchestration.to_string(), "orchestration");
    }
}
