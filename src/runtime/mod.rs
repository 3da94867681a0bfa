//! Turn execution and delivery
//!
//! This module provides the infrastructure for running turns:
//! - `Orchestrator` - Accepts turns, enforces one writer per session, spawns runners
//! - `TurnStream` - The consumer's ordered view of a turn's events
//! - `TurnHandle` - Observes a turn's phase and final outcome
//! - `encode_sse` - Server-push framing for events
//!
//! Turns run as separate tokio tasks and deliver events over bounded channels.
//! Dropping a `TurnStream` stops delivery; the turn itself always completes.

pub mod channels;
pub mod handle;
pub mod history;
pub mod orchestrator;
mod runner;
pub mod transport;

pub use channels::{EventReceiver, EventSender};
pub use handle::{TurnHandle, TurnOutcome};
pub use history::select_history;
pub use orchestrator::{Orchestrator, OrchestratorBuilder, TurnRequest};
pub use transport::{encode_sse, TurnStream};
