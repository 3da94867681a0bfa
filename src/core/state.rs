//! Turn phase types

use serde::{Deserialize, Serialize};

/// Phase of the turn state machine
///
/// `RoutingToAgent -> AwaitingModelResponse -> {HandlingToolCalls |
/// HandlingDelegation | EmittingText} -> Persisting -> StreamingOut ->
/// (loop or TurnComplete)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TurnPhase {
    /// Waiting for the session lease
    Queued,

    /// Resolving the active agent
    RoutingToAgent {
        /// Agent that will handle the next model call
        agent: String,
    },

    /// Backend call in flight
    AwaitingModelResponse {
        /// Agent the call was made for
        agent: String,
        /// Model invocations so far in this turn
        iteration: usize,
    },

    /// Running the tool calls of one model response
    HandlingToolCalls {
        /// Number of calls in the batch
        count: usize,
    },

    /// Validating and applying a transfer directive
    HandlingDelegation {
        /// Agent that issued the transfer
        from: String,
        /// Requested target
        to: String,
    },

    /// Producing the final text of the turn
    EmittingText,

    /// Appending an event to the session store
    Persisting,

    /// Forwarding an appended event to the consumer
    StreamingOut,

    /// Turn finished normally
    TurnComplete,

    /// Turn ended with a fatal error event
    Failed {
        /// Error message
        message: String,
    },
}

impl TurnPhase {
    /// Check if the turn has ended
    pub fn is_terminal(&self) -> bool {
        matches!(self, TurnPhase::TurnComplete | TurnPhase::Failed { .. })
    }

    /// Check if the turn is suspended on an external call
    pub fn is_suspended(&self) -> bool {
        matches!(
            self,
            TurnPhase::AwaitingModelResponse { .. } | TurnPhase::HandlingToolCalls { .. }
        )
    }

    /// Create a routing phase
    pub fn routing(agent: impl Into<String>) -> Self {
        TurnPhase::RoutingToAgent {
            agent: agent.into(),
        }
    }

    /// Create a model-wait phase
    pub fn awaiting_model(agent: impl Into<String>, iteration: usize) -> Self {
        TurnPhase::AwaitingModelResponse {
            agent: agent.into(),
            iteration,
        }
    }

    /// Create a delegation phase
    pub fn delegating(from: impl Into<String>, to: impl Into<String>) -> Self {
        TurnPhase::HandlingDelegation {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Create a failed phase
    pub fn failed(msg: impl Into<String>) -> Self {
        TurnPhase::Failed {
            message: msg.into(),
        }
    }
}

impl Default for TurnPhase {
    fn default() -> Self {
        TurnPhase::Queued
    }
}

impl std::fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TurnPhase::Queued => write!(f, "Queued"),
            TurnPhase::RoutingToAgent { agent } => write!(f, "Routing to {}", agent),
            TurnPhase::AwaitingModelResponse { agent, iteration } => {
                write!(f, "Awaiting model for {} (iteration {})", agent, iteration)
            }
            TurnPhase::HandlingToolCalls { count } => write!(f, "Handling {} tool call(s)", count),
            TurnPhase::HandlingDelegation { from, to } => write!(f, "Delegating {} -> {}", from, to),
            TurnPhase::EmittingText => write!(f, "Emitting text"),
            TurnPhase::Persisting => write!(f, "Persisting"),
            TurnPhase::StreamingOut => write!(f, "Streaming out"),
            TurnPhase::TurnComplete => write!(f, "Turn complete"),
            TurnPhase::Failed { message } => write!(f, "Failed: {}", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_checks() {
        assert!(TurnPhase::TurnComplete.is_terminal());
        assert!(TurnPhase::failed("oops").is_terminal());
        assert!(!TurnPhase::Queued.is_terminal());

        assert!(TurnPhase::awaiting_model("Coder", 1).is_suspended());
        assert!(TurnPhase::HandlingToolCalls { count: 2 }.is_suspended());
        assert!(!TurnPhase::Persisting.is_suspended());
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(TurnPhase::Queued.to_string(), "Queued");
        assert_eq!(
            TurnPhase::delegating("Orchestrator", "Coder").to_string(),
            "Delegating Orchestrator -> Coder"
        );
    }
}
