//! Agent definition
//!
//! Static description of one agent. Definitions are built once at service
//! start, validated by `AgentRegistry`, and never change afterwards.

use serde::{Deserialize, Serialize};

use crate::session::StateScope;

/// A named unit of behavior: instruction, tools and delegation targets
///
/// Use the builder pattern to configure the agent:
///
/// ```ignore
/// let analyst = AgentDefinition::new("DataAnalyst")
///     .with_description("Answers questions by querying the warehouse")
///     .with_instruction("You analyze data for {user:name?}.")
///     .with_tools(vec!["run_query".into()])
///     .with_output_key("analyst_result");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDefinition {
    /// Unique agent name
    pub name: String,

    /// What this agent handles; used by other agents to decide routing
    #[serde(default)]
    pub description: String,

    /// Instruction template, may reference state as `{key}` or `{key?}`
    #[serde(default)]
    pub instruction: String,

    /// Names of the tools this agent may call, in offer order
    #[serde(default)]
    pub tools: Vec<String>,

    /// State key the agent's final text is written under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_key: Option<String>,

    /// Scope of `output_key`
    #[serde(default)]
    pub output_scope: StateScope,

    /// Names of the agents this one may delegate to
    #[serde(default)]
    pub children: Vec<String>,

    /// Whether the agent may hand control back to its parent
    #[serde(default)]
    pub allow_transfer_to_parent: bool,

    /// Whether the agent may hand control to its siblings
    #[serde(default)]
    pub allow_transfer_to_peers: bool,
}

impl AgentDefinition {
    /// Create a definition with no tools or children
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            instruction: String::new(),
            tools: Vec::new(),
            output_key: None,
            output_scope: StateScope::Session,
            children: Vec::new(),
            allow_transfer_to_parent: false,
            allow_transfer_to_peers: false,
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the instruction template
    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    /// Set the allowed tools
    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.tools = tools;
        self
    }

    /// Add a single allowed tool
    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tools.push(tool.into());
        self
    }

    /// Write the final text into session state under `key`
    pub fn with_output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = Some(key.into());
        self
    }

    /// Set the scope `output_key` is written in
    pub fn with_output_scope(mut self, scope: StateScope) -> Self {
        self.output_scope = scope;
        self
    }

    /// Add a child agent by name
    pub fn with_child(mut self, child: impl Into<String>) -> Self {
        self.children.push(child.into());
        self
    }

    /// Set the child agents
    pub fn with_children(mut self, children: Vec<String>) -> Self {
        self.children = children;
        self
    }

    /// Allow transferring back to the parent
    pub fn with_transfer_to_parent(mut self, allowed: bool) -> Self {
        self.allow_transfer_to_parent = allowed;
        self
    }

    /// Allow transferring to siblings
    pub fn with_transfer_to_peers(mut self, allowed: bool) -> Self {
        self.allow_transfer_to_peers = allowed;
        self
    }

    /// Fully qualified state key of the output, if any
    pub fn output_state_key(&self) -> Option<String> {
        self.output_key
            .as_deref()
            .map(|key| self.output_scope.qualify(key))
    }

    /// Check if a description was given
    pub fn has_description(&self) -> bool {
        !self.description.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let agent = AgentDefinition::new("DataAnalyst")
            .with_description("Runs queries")
            .with_tool("run_query")
            .with_output_key("analyst_result");

        assert_eq!(agent.tools, vec!["run_query"]);
        assert_eq!(agent.output_state_key().as_deref(), Some("analyst_result"));
        assert!(agent.has_description());
        assert!(!AgentDefinition::new("x").with_description("  ").has_description());
    }

    #[test]
    fn test_output_scope_qualifies_key() {
        let agent = AgentDefinition::new("Profiler")
            .with_output_key("profile")
            .with_output_scope(StateScope::User);
        assert_eq!(agent.output_state_key().as_deref(), Some("user:profile"));
    }

    #[test]
    fn test_deserialize_defaults() {
        let agent: AgentDefinition = serde_json::from_str(
            r#"{"name": "Coder", "description": "Writes code", "output_scope": "temp"}"#,
        )
        .unwrap();

        assert_eq!(agent.name, "Coder");
        assert!(agent.tools.is_empty());
        assert!(agent.children.is_empty());
        assert!(agent.output_key.is_none());
        assert_eq!(agent.output_scope, StateScope::Temp);
        assert!(!agent.allow_transfer_to_parent);
    }
}
