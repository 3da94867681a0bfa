//! Tool registry for resolving and invoking tools
//!
//! The registry holds every tool the service exposes. Agents are assigned
//! subsets of it by name; invocation always goes through `invoke`, which
//! scopes a fresh `ToolContext` to the single call.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde_json::Value;

use super::tool::{Tool, ToolInvocation};
use crate::core::{OrchestratorError, OrchestratorResult, StateDelta, ToolContext, ToolScope};
use crate::llm::{ToolCallRequest, ToolDefinition};

/// Default per-call deadline
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Registry that holds all available tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    call_timeout: Duration,
}

impl ToolRegistry {
    /// Create a new empty tool registry
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Set the per-call deadline
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Per-call deadline
    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Register a tool in the registry
    ///
    /// Returns an error if a tool with the same name already exists.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) -> OrchestratorResult<()> {
        self.register_arc(Arc::new(tool))
    }

    /// Register an already shared tool
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> OrchestratorResult<()> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(OrchestratorError::config(format!(
                "Tool name conflict: '{}' already registered",
                name
            )));
        }
        tracing::info!("[ToolRegistry] Registering tool: {}", name);
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Resolve a tool by name
    pub fn resolve(&self, name: &str) -> OrchestratorResult<Arc<dyn Tool>> {
        self.tools
            .get(name)
            .cloned()
            .ok_or_else(|| OrchestratorError::UnknownTool(name.to_string()))
    }

    /// Check whether a tool is registered
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Definitions for the named tools, in the given order (unknown names skipped)
    pub fn definitions_for(&self, names: &[String]) -> Vec<ToolDefinition> {
        names
            .iter()
            .filter_map(|n| self.tools.get(n))
            .map(|t| t.definition())
            .collect()
    }

    /// Invoke one tool call under its own scoped context
    ///
    /// Never returns an error: failures, panics and timeouts are captured in
    /// the invocation's `outcome`. State written by a failed call is dropped.
    pub async fn invoke(&self, scope: ToolScope, call: &ToolCallRequest) -> ToolInvocation {
        let mut ctx = ToolContext::acquire(scope, &call.id, &call.name);
        let outcome = self.run(&mut ctx, &call.name, &call.args).await;
        let written = ctx.release();

        let state_delta = match &outcome {
            Ok(_) => written,
            Err(e) => {
                if !written.is_empty() {
                    tracing::debug!(
                        "[ToolRegistry] Dropping {} state write(s) from failed call {}: {}",
                        written.len(),
                        call.id,
                        e
                    );
                }
                StateDelta::new()
            }
        };

        ToolInvocation {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            args: call.args.clone(),
            outcome,
            state_delta,
        }
    }

    async fn run(&self, ctx: &mut ToolContext, name: &str, args: &Value) -> OrchestratorResult<Value> {
        let tool = self.resolve(name)?;

        tool.input_schema()
            .validate(args)
            .map_err(|msg| OrchestratorError::tool(name, msg))?;

        tracing::info!(
            session_id = %ctx.session_id(),
            agent = %ctx.agent(),
            "Executing tool: {}",
            name
        );
        tracing::debug!("Input: {:?}", args);

        let call = AssertUnwindSafe(tool.execute(ctx, args)).catch_unwind();
        let result = match tokio::time::timeout(self.call_timeout, call).await {
            Err(_) => {
                tracing::warn!("[ToolRegistry] Tool {} timed out", name);
                return Err(OrchestratorError::Timeout(self.call_timeout.as_millis() as u64));
            }
            Ok(Err(_panic)) => {
                tracing::error!("[ToolRegistry] Tool {} panicked", name);
                return Err(OrchestratorError::tool(name, "tool panicked"));
            }
            Ok(Ok(result)) => result,
        };

        tracing::debug!("Tool {} completed. Is error: {}", name, result.is_err());

        result.map_err(|e| OrchestratorError::tool(name, e.to_string()))
    }

    /// Get the list of tool names
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Get the number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tool_names())
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ResourceMap;
    use crate::llm::ToolInputSchema;
    use crate::tools::FunctionTool;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn scope() -> ToolScope {
        ToolScope {
            app_name: "app".into(),
            user_id: "u1".into(),
            session_id: "s1".into(),
            turn_id: "t1".into(),
            agent: "DataAnalyst".into(),
            state: Arc::new(BTreeMap::new()),
            resources: Arc::new(ResourceMap::new()),
        }
    }

    fn query_tool() -> FunctionTool {
        FunctionTool::new("run_query", "Run a SQL query", |ctx, args| {
            ctx.set_state("last_query", args["q"].clone());
            Ok(json!(1))
        })
        .with_schema(
            ToolInputSchema::new()
                .with_properties(json!({"q": {"type": "string"}}))
                .with_required(vec!["q".into()]),
        )
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "Never finishes in time"
        }
        fn input_schema(&self) -> ToolInputSchema {
            ToolInputSchema::new()
        }
        async fn execute(&self, ctx: &mut ToolContext, _args: &Value) -> anyhow::Result<Value> {
            ctx.set_state("partial", true);
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(json!(null))
        }
    }

    struct PanickingTool;

    #[async_trait]
    impl Tool for PanickingTool {
        fn name(&self) -> &str {
            "panics"
        }
        fn description(&self) -> &str {
            "Panics"
        }
        fn input_schema(&self) -> ToolInputSchema {
            ToolInputSchema::new()
        }
        async fn execute(&self, _ctx: &mut ToolContext, _args: &Value) -> anyhow::Result<Value> {
            panic!("tool blew up");
        }
    }

    #[test]
    fn test_empty_registry() {
        let registry = ToolRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
        assert!(matches!(
            registry.resolve("nonexistent"),
            Err(OrchestratorError::UnknownTool(_))
        ));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(query_tool()).unwrap();
        assert!(matches!(
            registry.register(query_tool()),
            Err(OrchestratorError::Config(_))
        ));
    }

    #[test]
    fn test_definitions_follow_requested_order() {
        let mut registry = ToolRegistry::new();
        registry.register(query_tool()).unwrap();
        registry.register(SlowTool).unwrap();

        let defs = registry.definitions_for(&["slow".into(), "missing".into(), "run_query".into()]);
        let names: Vec<_> = defs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["slow", "run_query"]);
    }

    #[tokio::test]
    async fn test_invoke_success_collects_writes() {
        let mut registry = ToolRegistry::new();
        registry.register(query_tool()).unwrap();

        let call = ToolCallRequest::new("run_query", json!({"q": "SELECT 1"}));
        let invocation = registry.invoke(scope(), &call).await;

        assert_eq!(invocation.outcome.as_ref().unwrap(), &json!(1));
        assert_eq!(invocation.state_delta["last_query"], json!("SELECT 1"));
        assert_eq!(invocation.call_id, call.id);
    }

    #[tokio::test]
    async fn test_invoke_unknown_and_invalid_args() {
        let mut registry = ToolRegistry::new();
        registry.register(query_tool()).unwrap();

        let unknown = registry
            .invoke(scope(), &ToolCallRequest::new("drop_table", json!({})))
            .await;
        assert!(matches!(unknown.outcome, Err(OrchestratorError::UnknownTool(_))));

        let invalid = registry
            .invoke(scope(), &ToolCallRequest::new("run_query", json!({})))
            .await;
        assert!(matches!(invalid.outcome, Err(OrchestratorError::Tool { .. })));
        assert!(invalid.state_delta.is_empty());
    }

    #[tokio::test]
    async fn test_tool_error_is_captured() {
        let mut registry = ToolRegistry::new();
        registry
            .register(FunctionTool::new("fails", "Always fails", |ctx, _| {
                ctx.set_state("half_done", true);
                Err(anyhow!("database unavailable"))
            }))
            .unwrap();

        let invocation = registry
            .invoke(scope(), &ToolCallRequest::new("fails", json!({})))
            .await;
        assert!(invocation.is_error());
        assert!(invocation.state_delta.is_empty());
        assert!(invocation.result_value()["error"]
            .as_str()
            .unwrap()
            .contains("database unavailable"));
    }

    #[tokio::test]
    async fn test_timeout_and_panic_are_captured() {
        let mut registry = ToolRegistry::new().with_call_timeout(Duration::from_millis(20));
        registry.register(SlowTool).unwrap();
        registry.register(PanickingTool).unwrap();

        let slow = registry
            .invoke(scope(), &ToolCallRequest::new("slow", json!({})))
            .await;
        assert!(matches!(slow.outcome, Err(OrchestratorError::Timeout(20))));
        assert!(slow.state_delta.is_empty());

        let panicked = registry
            .invoke(scope(), &ToolCallRequest::new("panics", json!({})))
            .await;
        assert!(matches!(panicked.outcome, Err(OrchestratorError::Tool { .. })));
    }
}
