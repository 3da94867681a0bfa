//! Tool system for the orchestrator
//!
//! This module provides:
//! - `Tool` trait - Interface for implementing tools
//! - `ToolInvocation` - A finished call with its result and state writes
//! - `ToolRegistry` - Resolves names and runs calls under scoped contexts
//! - `FunctionTool` - Closure-backed tool

mod function;
mod registry;
mod tool;

pub use function::FunctionTool;
pub use registry::ToolRegistry;
pub use tool::{Tool, ToolInvocation};
