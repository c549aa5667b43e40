//! Live stream registry: maps a [`StreamId`] to the bounded channel an SSE
//! response future is currently draining, with RAII release (§5 "Resource
//! acquisition").
//!
//! One *bounded* sender per stream id, so a slow client applies
//! backpressure to the server instead of the server buffering unboundedly
//! in memory (§5 "a stream's outbound queue is bounded; a full queue is
//! backpressure, not data loss — the event is still in the event store
//! for replay").

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::event_store::{StoredEvent, StreamId};

/// Bound on each stream's live-delivery queue. A full queue means the SSE
/// consumer is lagging; `push` reports [`PushOutcome::Backpressure`] and
/// the event remains retrievable from the [`crate::event_store::EventStore`].
const STREAM_CHANNEL_CAPACITY: usize = 64;

/// Outcome of attempting to deliver an event to a live, connected stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Delivered to the channel; the consumer will see it in order.
    Delivered,
    /// No consumer currently holds this stream open.
    NoConsumer,
    /// A consumer is attached but its queue is full.
    Backpressure,
}

/// Registers and releases the live receivers backing SSE responses.
///
/// One registry per transport instance; streams from different sessions
/// never collide because [`StreamId`] values are derived from the session
/// id plus request id (see [`StreamId`]'s constructors in `router`).
#[derive(Default)]
pub struct StreamRegistry {
    senders: DashMap<StreamId, mpsc::Sender<StoredEvent>>,
}

impl StreamRegistry {
    /// Build an empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Open a new live stream, returning the receiving half and a guard
    /// that deregisters the stream when dropped.
    ///
    /// Registering a second open stream for the same id replaces the
    /// first; the first's guard, when it later drops, is a no-op (it only
    /// removes itself if it still owns the registry entry).
    pub fn open(self: &Arc<Self>, stream_id: StreamId) -> (mpsc::Receiver<StoredEvent>, StreamGuard) {
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        self.senders.insert(stream_id.clone(), tx);
        let guard = StreamGuard {
            registry: self.clone(),
            stream_id,
        };
        (rx, guard)
    }

    /// Deliver one event to whichever consumer currently holds
    /// `stream_id` open, if any.
    pub fn push(&self, stream_id: &StreamId, event: StoredEvent) -> PushOutcome {
        let Some(sender) = self.senders.get(stream_id) else {
            return PushOutcome::NoConsumer;
        };
        match sender.try_send(event) {
            Ok(()) => PushOutcome::Delivered,
            Err(mpsc::error::TrySendError::Full(_)) => PushOutcome::Backpressure,
            Err(mpsc::error::TrySendError::Closed(_)) => PushOutcome::NoConsumer,
        }
    }

    /// Whether a live consumer currently holds `stream_id` open.
    pub fn is_live(&self, stream_id: &StreamId) -> bool {
        self.senders.contains_key(stream_id)
    }

    fn close(&self, stream_id: &StreamId) {
        self.senders.remove(stream_id);
    }
}

/// Releases a stream's registry entry on drop, including on cancellation
/// (client disconnect) since the SSE response future is simply dropped in
/// that case rather than run to completion.
pub struct StreamGuard {
    registry: Arc<StreamRegistry>,
    stream_id: StreamId,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.registry.close(&self.stream_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(id: u64) -> StoredEvent {
        StoredEvent {
            event_id: id,
            data: json!({ "id": id }),
        }
    }

    #[tokio::test]
    async fn push_without_a_consumer_reports_no_consumer() {
        let registry = StreamRegistry::new();
        let stream_id = StreamId("s1".to_string());
        assert_eq!(registry.push(&stream_id, event(1)), PushOutcome::NoConsumer);
    }

    #[tokio::test]
    async fn open_then_push_delivers_in_order() {
        let registry = StreamRegistry::new();
        let stream_id = StreamId("s1".to_string());
        let (mut rx, _guard) = registry.open(stream_id.clone());

        registry.push(&stream_id, event(1));
        registry.push(&stream_id, event(2));

        assert_eq!(rx.recv().await.unwrap().event_id, 1);
        assert_eq!(rx.recv().await.unwrap().event_id, 2);
    }

    #[tokio::test]
    async fn dropping_the_guard_closes_the_stream() {
        let registry = StreamRegistry::new();
        let stream_id = StreamId("s1".to_string());
        let (_rx, guard) = registry.open(stream_id.clone());
        assert!(registry.is_live(&stream_id));

        drop(guard);
        assert!(!registry.is_live(&stream_id));
        assert_eq!(registry.push(&stream_id, event(1)), PushOutcome::NoConsumer);
    }

    #[tokio::test]
    async fn full_queue_reports_backpressure() {
        let registry = StreamRegistry::new();
        let stream_id = StreamId("s1".to_string());
        let (_rx, _guard) = registry.open(stream_id.clone());

        for n in 0..STREAM_CHANNEL_CAPACITY as u64 {
            assert_eq!(registry.push(&stream_id, event(n)), PushOutcome::Delivered);
        }
        assert_eq!(registry.push(&stream_id, event(999)), PushOutcome::Backpressure);
    }
}
