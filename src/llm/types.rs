//! Request/response types at the model backend boundary
//!
//! The orchestrator only needs to know which of three things the model
//! wants: to say something, to call tools, or to hand control to another
//! agent. Wire protocols are the backend's business.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::Event;

// ============================================================================
// Tool Definitions
// ============================================================================

/// Tool definition offered to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name
    pub name: String,

    /// Tool description
    pub description: String,

    /// JSON schema for the tool input
    pub input_schema: ToolInputSchema,
}

/// JSON schema for tool input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInputSchema {
    /// Type (always "object")
    #[serde(rename = "type")]
    pub schema_type: String,

    /// Properties of the input object
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<Value>,

    /// Required properties
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
}

impl ToolInputSchema {
    /// Create a new tool input schema
    pub fn new() -> Self {
        Self {
            schema_type: "object".to_string(),
            properties: None,
            required: None,
        }
    }

    /// Set the properties
    pub fn with_properties(mut self, properties: Value) -> Self {
        self.properties = Some(properties);
        self
    }

    /// Set the required fields
    pub fn with_required(mut self, required: Vec<String>) -> Self {
        self.required = Some(required);
        self
    }

    /// Check that `args` is an object carrying every required field
    pub fn validate(&self, args: &Value) -> Result<(), String> {
        let obj = args
            .as_object()
            .ok_or_else(|| format!("arguments must be a JSON object, got {}", args))?;

        if let Some(required) = &self.required {
            let missing: Vec<&str> = required
                .iter()
                .filter(|name| !obj.contains_key(name.as_str()))
                .map(|s| s.as_str())
                .collect();
            if !missing.is_empty() {
                return Err(format!("missing required argument(s): {}", missing.join(", ")));
            }
        }
        Ok(())
    }
}

impl Default for ToolInputSchema {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Request
// ============================================================================

/// An agent the model may hand control to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferTarget {
    /// Agent name
    pub name: String,

    /// What the agent is for
    pub description: String,
}

/// Everything the backend receives for one invocation
#[derive(Debug, Clone, Serialize)]
pub struct ModelRequest {
    /// Agent the call is made for
    pub agent: String,

    /// Rendered instruction
    pub instruction: String,

    /// Tools the agent may call
    pub tools: Vec<ToolDefinition>,

    /// Agents the model may transfer to
    pub transfer_targets: Vec<TransferTarget>,

    /// Bounded event history, oldest first
    pub history: Vec<Event>,
}

// ============================================================================
// Response
// ============================================================================

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Call ID (unique within the response)
    pub id: String,

    /// Tool name
    pub name: String,

    /// Tool arguments
    pub args: Value,
}

impl ToolCallRequest {
    /// Create a call with a generated ID
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        Self {
            id: format!("call_{}", uuid::Uuid::new_v4().simple()),
            name: name.into(),
            args,
        }
    }
}

/// What the model decided
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelResponse {
    /// Plain text; ends the turn
    Text {
        text: String,
        /// Hand control back so the next turn starts at the root agent
        #[serde(default)]
        release_control: bool,
    },

    /// One or more tool calls
    ToolCalls { calls: Vec<ToolCallRequest> },

    /// Hand control to another agent
    Transfer { target: String },
}

impl ModelResponse {
    /// Text response that keeps the answering agent active
    pub fn text(text: impl Into<String>) -> Self {
        ModelResponse::Text {
            text: text.into(),
            release_control: false,
        }
    }

    /// Text response that releases control back to the root agent
    pub fn final_text(text: impl Into<String>) -> Self {
        ModelResponse::Text {
            text: text.into(),
            release_control: true,
        }
    }

    /// Single tool call
    pub fn tool_call(name: impl Into<String>, args: Value) -> Self {
        ModelResponse::ToolCalls {
            calls: vec![ToolCallRequest::new(name, args)],
        }
    }

    /// Transfer directive
    pub fn transfer(target: impl Into<String>) -> Self {
        ModelResponse::Transfer {
            target: target.into(),
        }
    }
}
