//! Channel type definitions for turn event delivery
//!
//! Each turn gets one bounded mpsc channel: the runner produces events,
//! the single consumer drains them. A full channel applies backpressure to
//! the runner.

use tokio::sync::mpsc;

use crate::core::Event;

/// Default buffer size for a turn's event channel
pub const EVENT_CHANNEL_SIZE: usize = 64;

/// Sender half of the event channel (used by the runner)
pub type EventSender = mpsc::Sender<Event>;

/// Receiver half of the event channel (used by `TurnStream`)
pub type EventReceiver = mpsc::Receiver<Event>;

/// Create a new event channel pair
///
/// A capacity of zero is raised to one.
pub fn create_event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    mpsc::channel(capacity.max(1))
}
