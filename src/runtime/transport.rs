//! Event stream transport
//!
//! `EventSink` is the runner's end: it forwards already persisted events
//! and, once the consumer is gone, silently stops delivering while the turn
//! carries on. `TurnStream` is the consumer's end. Dropping it cancels
//! delivery, never the turn.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio_util::sync::{CancellationToken, DropGuard};

use super::channels::{EventReceiver, EventSender};
use crate::core::{Event, OrchestratorResult};

/// Render one event as a server-push frame
///
/// ```text
/// id: 3
/// event: tool_result
/// data: {"id":"...","sequence":3,...}
/// ```
///
/// Events that were never persisted carry sequence 0 and get no `id:` line,
/// so a reconnecting client does not resume from them.
pub fn encode_sse(event: &Event) -> OrchestratorResult<String> {
    let data = serde_json::to_string(event)?;
    let mut frame = String::with_capacity(data.len() + 48);
    if event.sequence > 0 {
        frame.push_str(&format!("id: {}\n", event.sequence));
    }
    frame.push_str(&format!("event: {}\n", event.payload.type_name()));
    for line in data.lines() {
        frame.push_str("data: ");
        frame.push_str(line);
        frame.push('\n');
    }
    frame.push('\n');
    Ok(frame)
}

/// Consumer end of a turn's events
///
/// Yields events in the order they were produced and ends after the
/// terminal event.
pub struct TurnStream {
    turn_id: String,
    rx: EventReceiver,
    _cancel_on_drop: DropGuard,
}

impl TurnStream {
    pub(crate) fn new(turn_id: impl Into<String>, rx: EventReceiver, cancel: CancellationToken) -> Self {
        Self {
            turn_id: turn_id.into(),
            rx,
            _cancel_on_drop: cancel.drop_guard(),
        }
    }

    /// ID of the turn this stream belongs to
    pub fn turn_id(&self) -> &str {
        &self.turn_id
    }

    /// Receive the next event
    pub async fn next_event(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Drain the stream to its end
    pub async fn collect_all(mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Some(event) = self.rx.recv().await {
            events.push(event);
        }
        events
    }

    /// Re-encode the stream as server-push frames
    pub fn into_sse(mut self) -> impl Stream<Item = OrchestratorResult<String>> + Send {
        async_stream::stream! {
            while let Some(event) = self.rx.recv().await {
                yield encode_sse(&event);
            }
        }
    }
}

impl Stream for TurnStream {
    type Item = Event;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl std::fmt::Debug for TurnStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnStream")
            .field("turn_id", &self.turn_id)
            .finish()
    }
}

/// Runner end of a turn's events
#[derive(Debug)]
pub(crate) struct EventSink {
    tx: Option<EventSender>,
    cancel: CancellationToken,
    delivered: usize,
}

impl EventSink {
    pub(crate) fn new(tx: EventSender, cancel: CancellationToken) -> Self {
        Self {
            tx: Some(tx),
            cancel,
            delivered: 0,
        }
    }

    /// Forward one event; never fails
    ///
    /// Waits while the channel is full. Returns whether the event reached
    /// the channel.
    pub(crate) async fn deliver(&mut self, event: &Event) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };

        let sent = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            result = tx.send(event.clone()) => result.is_ok(),
        };

        if sent {
            self.delivered += 1;
        } else {
            tracing::info!(
                turn_id = %event.turn_id,
                "[Transport] Consumer disconnected; continuing turn without delivery"
            );
            self.tx = None;
        }
        sent
    }

    /// Number of events that reached the channel
    pub(crate) fn delivered(&self) -> usize {
        self.delivered
    }

    /// Whether the consumer went away
    pub(crate) fn is_disconnected(&self) -> bool {
        self.tx.is_none() || self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EventPayload;
    use crate::runtime::channels::create_event_channel;
    use futures::StreamExt;
    use serde_json::json;

    fn text(t: &str) -> Event {
        Event::new("turn_1", "Orchestrator", EventPayload::Text { text: t.into() })
    }

    #[test]
    fn test_encode_sse() {
        let mut event = Event::new(
            "turn_1",
            "DataAnalyst",
            EventPayload::ToolResult {
                call_id: "c1".into(),
                name: "run_query".into(),
                result: json!(1),
                is_error: false,
            },
        );
        event.sequence = 4;

        let frame = encode_sse(&event).unwrap();
        let lines: Vec<&str> = frame.lines().collect();
        assert_eq!(lines[0], "id: 4");
        assert_eq!(lines[1], "event: tool_result");
        assert!(lines[2].starts_with("data: {"));
        assert!(frame.ends_with("\n\n"));

        let data: Event = serde_json::from_str(&lines[2]["data: ".len()..]).unwrap();
        assert_eq!(data, event);
    }

    #[test]
    fn test_unpersisted_event_has_no_id() {
        let frame = encode_sse(&text("hi")).unwrap();
        assert!(frame.starts_with("event: text\n"));
    }

    #[tokio::test]
    async fn test_stream_yields_in_order() {
        let (tx, rx) = create_event_channel(8);
        let cancel = CancellationToken::new();
        let mut sink = EventSink::new(tx, cancel.clone());
        let stream = TurnStream::new("turn_1", rx, cancel);

        assert!(sink.deliver(&text("a")).await);
        assert!(sink.deliver(&text("b")).await);
        drop(sink);

        let texts: Vec<String> = stream
            .map(|e| match e.payload {
                EventPayload::Text { text } => text,
                _ => String::new(),
            })
            .collect()
            .await;
        assert_eq!(texts, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_dropping_stream_stops_delivery() {
        let (tx, rx) = create_event_channel(8);
        let cancel = CancellationToken::new();
        let mut sink = EventSink::new(tx, cancel.clone());
        let stream = TurnStream::new("turn_1", rx, cancel);

        assert!(sink.deliver(&text("a")).await);
        drop(stream);

        assert!(!sink.deliver(&text("b")).await);
        assert!(!sink.deliver(&text("c")).await);
        assert!(sink.is_disconnected());
        assert_eq!(sink.delivered(), 1);
    }

    #[tokio::test]
    async fn test_drop_unblocks_full_channel() {
        let (tx, rx) = create_event_channel(1);
        let cancel = CancellationToken::new();
        let mut sink = EventSink::new(tx, cancel.clone());
        let stream = TurnStream::new("turn_1", rx, cancel);

        assert!(sink.deliver(&text("a")).await);
        let blocked = tokio::spawn(async move {
            let ok = sink.deliver(&text("b")).await;
            (ok, sink.delivered())
        });

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        drop(stream);

        let (ok, delivered) = blocked.await.unwrap();
        assert!(!ok);
        assert_eq!(delivered, 1);
    }

    #[tokio::test]
    async fn test_into_sse() {
        let (tx, rx) = create_event_channel(8);
        let cancel = CancellationToken::new();
        let mut sink = EventSink::new(tx, cancel.clone());
        let stream = TurnStream::new("turn_1", rx, cancel);

        sink.deliver(&text("a")).await;
        drop(sink);

        let frames: Vec<String> = stream
            .into_sse()
            .map(|f| f.unwrap())
            .collect()
            .await;
        assert_eq!(frames.len(), 1);
        assert!(frames[0].contains("event: text"));
    }
}
