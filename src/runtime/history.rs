//! History window offered to the model
//!
//! Earlier turns are cut to the most recent `window` events, plus every
//! older state-delta event that still sets a value no later delta has
//! overwritten.
//!
//! The window applies to earlier turns only. Events of the turn in flight
//! are always sent in full, since the model needs every tool result it
//! asked for; `max_iterations` bounds how many there can be.

use std::collections::HashSet;

use crate::core::Event;

/// Select the events from earlier turns to include in a model request
///
/// The caller appends the current turn's events after these, uncut.
pub fn select_history(events: &[Event], window: usize) -> Vec<Event> {
    let cutoff = events.len().saturating_sub(window);

    let mut overwritten: HashSet<&str> = HashSet::new();
    let mut keep = vec![false; events.len()];

    for (index, event) in events.iter().enumerate().rev() {
        if index >= cutoff {
            keep[index] = true;
        }
        if let Some(delta) = event.state_delta() {
            let live = delta.keys().any(|k| !overwritten.contains(k.as_str()));
            if live {
                keep[index] = true;
            }
            overwritten.extend(delta.keys().map(|k| k.as_str()));
        }
    }

    events
        .iter()
        .zip(keep)
        .filter(|(_, keep)| *keep)
        .map(|(event, _)| event.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EventPayload, StateDelta};
    use serde_json::json;

    fn text(t: &str) -> Event {
        Event::new("t", "A", EventPayload::Text { text: t.into() })
    }

    fn delta(key: &str, value: i64) -> Event {
        let mut delta = StateDelta::new();
        delta.insert(key.to_string(), json!(value));
        Event::new("t", "A", EventPayload::StateDelta { delta })
    }

    fn describe(events: &[Event]) -> Vec<String> {
        events
            .iter()
            .map(|e| match &e.payload {
                EventPayload::Text { text } => text.clone(),
                EventPayload::StateDelta { delta } => {
                    let (k, v) = delta.iter().next().unwrap();
                    format!("{}={}", k, v)
                }
                other => other.type_name().to_string(),
            })
            .collect()
    }

    #[test]
    fn test_window_keeps_recent() {
        let events: Vec<Event> = (0..5).map(|i| text(&i.to_string())).collect();
        assert_eq!(describe(&select_history(&events, 2)), vec!["3", "4"]);
        assert_eq!(select_history(&events, 10).len(), 5);
        assert!(select_history(&events, 0).is_empty());
    }

    #[test]
    fn test_live_deltas_survive_window() {
        let events = vec![
            delta("a", 1),
            delta("b", 1),
            text("x"),
            delta("a", 2),
            text("y"),
            text("z"),
        ];

        // a=1 is shadowed by a=2; b=1 is still live
        assert_eq!(
            describe(&select_history(&events, 2)),
            vec!["b=1", "a=2", "y", "z"]
        );
    }
}
