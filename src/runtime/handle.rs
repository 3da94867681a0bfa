//! TurnHandle - External view of a running turn
//!
//! The handle is what callers use to observe a turn independently of its
//! event stream: the current phase while it runs, and a summary once it is
//! done. Dropping the handle does not affect the turn.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::core::{OrchestratorError, OrchestratorResult, TurnPhase};
use crate::session::SessionKey;

/// Summary of a finished turn
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnOutcome {
    /// Turn ID
    pub turn_id: String,
    /// Agent that was active when the turn ended
    pub final_agent: String,
    /// Number of events appended to the session log
    pub appended: usize,
    /// Number of events that reached the consumer
    pub delivered: usize,
    /// Whether the consumer went away before the turn ended
    pub disconnected: bool,
    /// Final phase (`TurnComplete` or `Failed`)
    pub phase: TurnPhase,
}

impl TurnOutcome {
    /// Whether the turn ended with a completion event
    pub fn is_complete(&self) -> bool {
        self.phase == TurnPhase::TurnComplete
    }
}

/// Handle for observing a running turn
pub struct TurnHandle {
    turn_id: String,
    session: SessionKey,
    phase: Arc<RwLock<TurnPhase>>,
    task: JoinHandle<TurnOutcome>,
}

impl TurnHandle {
    /// Create a new turn handle
    ///
    /// This is called by `Orchestrator::submit()`, not directly.
    pub(crate) fn new(
        turn_id: impl Into<String>,
        session: SessionKey,
        phase: Arc<RwLock<TurnPhase>>,
        task: JoinHandle<TurnOutcome>,
    ) -> Self {
        Self {
            turn_id: turn_id.into(),
            session,
            phase,
            task,
        }
    }

    /// Get the turn ID
    pub fn turn_id(&self) -> &str {
        &self.turn_id
    }

    /// Session the turn runs in
    pub fn session(&self) -> &SessionKey {
        &self.session
    }

    /// Current phase
    pub async fn phase(&self) -> TurnPhase {
        self.phase.read().await.clone()
    }

    /// Check whether the turn task has finished
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the turn to finish
    pub async fn join(self) -> OrchestratorResult<TurnOutcome> {
        self.task.await.map_err(|e| {
            OrchestratorError::Orchestration(format!("Turn {} task failed: {}", self.turn_id, e))
        })
    }
}

impl std::fmt::Debug for TurnHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnHandle")
            .field("turn_id", &self.turn_id)
            .field("session", &self.session)
            .field("finished", &self.task.is_finished())
            .finish()
    }
}
