//! Tool trait definition
//!
//! All tools implement this trait to provide a consistent interface.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::core::{OrchestratorError, StateDelta, ToolContext};
use crate::llm::{ToolDefinition, ToolInputSchema};

/// Trait for external capabilities an agent can call
///
/// Tools receive an explicit, per-call `ToolContext` and never reach for
/// ambient state. Returning `Err` is fine: the runner turns it into a
/// tool-error event and the turn continues.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the name of this tool
    fn name(&self) -> &str;

    /// Get a description of this tool
    fn description(&self) -> &str;

    /// Get the argument schema
    fn input_schema(&self) -> ToolInputSchema;

    /// Execute the tool with the given arguments
    async fn execute(&self, ctx: &mut ToolContext, args: &Value) -> Result<Value>;

    /// Get the definition offered to the model
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

/// A finished tool call: what was asked, what came back, what it wrote
#[derive(Debug)]
pub struct ToolInvocation {
    /// ID of the call
    pub call_id: String,
    /// Tool name
    pub tool_name: String,
    /// Arguments the tool was called with
    pub args: Value,
    /// Result value or failure
    pub outcome: Result<Value, OrchestratorError>,
    /// State writes buffered by the tool's context
    pub state_delta: StateDelta,
}

impl ToolInvocation {
    /// Whether the call failed
    pub fn is_error(&self) -> bool {
        self.outcome.is_err()
    }

    /// Result value as it is recorded in the tool-result event
    pub fn result_value(&self) -> Value {
        match &self.outcome {
            Ok(value) => value.clone(),
            Err(e) => serde_json::json!({ "error": e.to_string() }),
        }
    }
}
