//! Event store: durable, ordered per-stream append/replay for SSE
//! resumability (§4.3).
//!
//! One `Mutex<Vec<StoredEvent>>` per stream, keyed in a `DashMap`, so
//! unrelated streams never contend on the same lock (§5 "serializes
//! appends *per stream* ... but not across streams").

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;

/// Identifies one logical SSE stream: a per-request stream or the
/// session's standalone stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamId(
    /// The raw stream key, e.g. `"<session>:req:<request-id>"`.
    pub String,
);

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One durable event within a stream. `event_id` is monotone within the
/// stream (§3 invariant).
#[derive(Debug, Clone)]
pub struct StoredEvent {
    /// Position within the stream, strictly increasing, 1-based.
    pub event_id: u64,
    /// The JSON-RPC payload this event carries.
    pub data: Value,
}

/// Durable, ordered append/replay for SSE streams.
///
/// Reads after an `append` to the same stream observe that append; no
/// ordering is promised across streams (§4.3 Guarantees).
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append one event to `stream_id`, returning its assigned id.
    async fn append(&self, stream_id: &StreamId, data: Value) -> u64;

    /// Every event in `stream_id` with `event_id > after_event_id`, in
    /// order.
    async fn replay(&self, stream_id: &StreamId, after_event_id: u64) -> Vec<StoredEvent>;

    /// Release storage for events up to (and including) `up_to`, or the
    /// entire stream when `up_to` is `None`. Implementations may treat
    /// this as a hint.
    async fn trim(&self, stream_id: &StreamId, up_to: Option<u64>);
}

#[derive(Default)]
struct StreamLog {
    next_id: u64,
    events: Vec<StoredEvent>,
}

/// In-memory [`EventStore`]. Production deployments swap in a durable
/// backend (e.g. Redis) that the session store can reference by stream
/// id (§4.3).
#[derive(Default)]
pub struct InMemoryEventStore {
    streams: DashMap<StreamId, Mutex<StreamLog>>,
}

impl InMemoryEventStore {
    /// Build an empty store.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, stream_id: &StreamId, data: Value) -> u64 {
        let log = self.streams.entry(stream_id.clone()).or_default();
        let mut log = log.lock();
        log.next_id += 1;
        let event_id = log.next_id;
        log.events.push(StoredEvent { event_id, data });
        event_id
    }

    async fn replay(&self, stream_id: &StreamId, after_event_id: u64) -> Vec<StoredEvent> {
        let Some(log) = self.streams.get(stream_id) else {
            return Vec::new();
        };
        log.lock()
            .events
            .iter()
            .filter(|e| e.event_id > after_event_id)
            .cloned()
            .collect()
    }

    async fn trim(&self, stream_id: &StreamId, up_to: Option<u64>) {
        let Some(log) = self.streams.get(stream_id) else {
            return;
        };
        let mut log = log.lock();
        match up_to {
            Some(cutoff) => log.events.retain(|e| e.event_id > cutoff),
            None => log.events.clear(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn appends_are_ordered_and_monotone() {
        let store = InMemoryEventStore::new();
        let stream = StreamId("req-1".to_string());

        let id1 = store.append(&stream, serde_json::json!({"n": 1})).await;
        let id2 = store.append(&stream, serde_json::json!({"n": 2})).await;
        assert_eq!(id1, 1);
        assert_eq!(id2, 2);
    }

    #[tokio::test]
    async fn replay_returns_events_strictly_after_cursor() {
        let store = InMemoryEventStore::new();
        let stream = StreamId("req-1".to_string());
        for n in 1..=5 {
            store.append(&stream, serde_json::json!({"n": n})).await;
        }

        let replayed = store.replay(&stream, 3).await;
        assert_eq!(replayed.len(), 2);
        assert_eq!(replayed[0].event_id, 4);
        assert_eq!(replayed[1].event_id, 5);
    }

    #[tokio::test]
    async fn replay_on_unknown_stream_is_empty() {
        let store = InMemoryEventStore::new();
        let replayed = store.replay(&StreamId("ghost".to_string()), 0).await;
        assert!(replayed.is_empty());
    }

    #[tokio::test]
    async fn trim_releases_acknowledged_events() {
        let store = InMemoryEventStore::new();
        let stream = StreamId("req-1".to_string());
        for n in 1..=3 {
            store.append(&stream, serde_json::json!({"n": n})).await;
        }

        store.trim(&stream, Some(2)).await;
        let replayed = store.replay(&stream, 0).await;
        assert_eq!(replayed.len(), 1);
        assert_eq!(replayed[0].event_id, 3);
    }

    #[tokio::test]
    async fn cross_stream_ids_are_independent() {
        let store = InMemoryEventStore::new();
        let a = StreamId("a".to_string());
        let b = StreamId("b".to_string());
        store.append(&a, serde_json::json!(1)).await;
        let id_b = store.append(&b, serde_json::json!(1)).await;
        assert_eq!(id_b, 1);
    }
}
