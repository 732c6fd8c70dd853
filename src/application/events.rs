//! Event emission for sync runs
//!
//! The engine publishes [`SyncEvent`]s into an unbounded channel; whatever
//! transport is attached (NDJSON on stdout, a file, a test collector) reads
//! from the receiving [`EventStream`]. A dropped receiver never fails a run.

use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

use crate::domain::SyncEvent;

/// Sending half, cheap to clone into every component of a run
#[derive(Clone)]
pub struct EventEmitter {
    sender: Option<mpsc::UnboundedSender<SyncEvent>>,
}

/// Receiving half handed to a transport
pub struct EventStream {
    receiver: mpsc::UnboundedReceiver<SyncEvent>,
}

impl EventEmitter {
    /// Create a connected emitter/stream pair
    pub fn channel() -> (Self, EventStream) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self { sender: Some(sender) },
            EventStream { receiver },
        )
    }

    /// Emitter that only mirrors events to tracing
    pub fn detached() -> Self {
        Self { sender: None }
    }

    /// Publish one event; mirrored to tracing at debug level
    pub fn emit(&self, event: SyncEvent) {
        debug!(event_type = event.kind(), "📣 {:?}", event);
        if let Some(sender) = &self.sender {
            if sender.send(event).is_err() {
                debug!("Event receiver dropped, event discarded");
            }
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(SyncEvent::info(message));
    }

    pub fn error(&self, sku: Option<&str>, name: Option<&str>, error: impl Into<String>) {
        self.emit(SyncEvent::error(sku, name, error));
    }
}

impl EventStream {
    pub async fn recv(&mut self) -> Option<SyncEvent> {
        self.receiver.recv().await
    }

    /// Everything already queued, without waiting
    pub fn drain(&mut self) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }

    pub fn into_stream(self) -> UnboundedReceiverStream<SyncEvent> {
        UnboundedReceiverStream::new(self.receiver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let (emitter, mut stream) = EventEmitter::channel();
        emitter.info("first");
        emitter.error(Some("A1"), None, "second");
        let events = stream.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], SyncEvent::info("first"));
        assert_eq!(events[1].kind(), "error");
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_harmless() {
        let (emitter, stream) = EventEmitter::channel();
        drop(stream);
        emitter.info("nobody listens");
    }

    #[tokio::test]
    async fn test_stream_ends_when_emitters_drop() {
        let (emitter, stream) = EventEmitter::channel();
        emitter.info("only");
        drop(emitter);
        let collected: Vec<SyncEvent> = stream.into_stream().collect().await;
        assert_eq!(collected, vec![SyncEvent::info("only")]);
    }
}
