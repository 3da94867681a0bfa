pub mod provider;
pub mod retry;
pub mod scripted;
pub mod types;

pub use provider::ModelBackend;
pub use retry::{generate_with_retry, RetryPolicy};
pub use scripted::{ScriptStep, ScriptedBackend};
pub use types::{
    ModelRequest, ModelResponse, ToolCallRequest, ToolDefinition, ToolInputSchema,
    TransferTarget,
};
