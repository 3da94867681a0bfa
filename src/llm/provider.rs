//! Model backend trait
//!
//! Abstracts the language-model capability so that any provider (hosted
//! API, local model, scripted test double) can drive the orchestrator.

use anyhow::Result;

use super::types::{ModelRequest, ModelResponse};

/// Trait for language-model backends used by the runner.
///
/// A backend receives the rendered instruction, the tools and transfer
/// targets available to the active agent and a bounded slice of history,
/// and answers with text, tool calls or a transfer directive.
#[async_trait::async_trait]
pub trait ModelBackend: Send + Sync {
    /// Produce the next response for `request`.
    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse>;

    /// Backend name for logging (e.g., "anthropic", "scripted").
    fn name(&self) -> &str;
}
