//! Agents: definitions, the validated tree, instruction rendering and
//! orchestrator configuration

pub mod config;
pub mod definition;
pub mod instruction;
pub mod registry;

pub use config::{AgentTreeConfig, BusyPolicy, OrchestratorConfig};
pub use definition::AgentDefinition;
pub use instruction::{InstructionRenderer, RenderedInstruction};
pub use registry::AgentRegistry;
