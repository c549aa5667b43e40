//! [`Transport`] implementation backing one session's HTTP connection.
//!
//! Follows `protomcp-transport`'s in-memory transport for the
//! `set_event_sink`/`start`/`close` lifecycle, routing outbound sends to
//! the right SSE stream by request id. Unlike stdio or in-memory, one
//! instance here is scoped to a single session: the router constructs one
//! per session (see `router::ServerState::open_session`) rather than one
//! for the whole server.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use protomcp_transport::{
    MessageExtra, SendOptions, Transport, TransportError, TransportEventSink, TransportMessage,
    TransportResult,
};

use crate::event_store::{EventStore, StoredEvent, StreamId};
use crate::session::SessionId;
use crate::stream::StreamRegistry;

/// Derive the [`StreamId`] a per-request response stream is filed under.
pub fn request_stream_id(session_id: &SessionId, request_id: &protomcp_types::RequestId) -> StreamId {
    StreamId(format!("{session_id}:req:{request_id}"))
}

/// Derive the [`StreamId`] a session's standalone (server-initiated)
/// stream is filed under.
pub fn standalone_stream_id(session_id: &SessionId) -> StreamId {
    StreamId(format!("{session_id}:standalone"))
}

/// One session's half of the streamable HTTP transport.
///
/// `send` never blocks on a client actually being connected: outbound
/// messages always land in the [`EventStore`] first, then get pushed to a
/// live [`StreamRegistry`] consumer if one is attached. A client that
/// reconnects later replays from the store (§4.5 Resumability).
pub struct StreamableHttpTransport {
    session_id: SessionId,
    event_store: Arc<dyn EventStore>,
    stream_registry: Arc<StreamRegistry>,
    sink: ArcSwapOption<dyn TransportEventSink>,
    open: AtomicBool,
}

impl StreamableHttpTransport {
    /// Build a transport scoped to one session.
    pub fn new(
        session_id: SessionId,
        event_store: Arc<dyn EventStore>,
        stream_registry: Arc<StreamRegistry>,
    ) -> Arc<Self> {
        Arc::new(Self {
            session_id,
            event_store,
            stream_registry,
            sink: ArcSwapOption::empty(),
            open: AtomicBool::new(false),
        })
    }

    /// The session this transport instance belongs to.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Feed one inbound frame (an HTTP POST body) to the registered sink,
    /// as if it arrived over the wire. Called by the router, not by
    /// [`Protocol`](protomcp_protocol::Protocol) itself.
    pub async fn deliver_inbound(&self, message: TransportMessage, extra: MessageExtra) {
        if let Some(sink) = self.sink.load_full() {
            sink.on_message(message, extra).await;
        }
    }

    async fn publish(&self, stream_id: StreamId, message: &TransportMessage) -> StoredEvent {
        // Store each envelope in the batch as its own event so replay and
        // live delivery see the same granularity regardless of whether
        // the peer batched its writes.
        let mut last = None;
        for envelope in message.iter() {
            let data = serde_json::to_value(envelope)
                .unwrap_or_else(|_| serde_json::json!({"error": "unserializable message"}));
            let event_id = self.event_store.append(&stream_id, data.clone()).await;
            let stored = StoredEvent { event_id, data };
            self.stream_registry.push(&stream_id, stored.clone());
            last = Some(stored);
        }
        last.unwrap_or(StoredEvent {
            event_id: 0,
            data: serde_json::Value::Null,
        })
    }
}

#[async_trait]
impl Transport for StreamableHttpTransport {
    fn set_event_sink(&self, sink: Arc<dyn TransportEventSink>) {
        self.sink.store(Some(sink));
    }

    async fn start(&self) -> TransportResult<()> {
        if self.open.swap(true, Ordering::SeqCst) {
            return Err(TransportError::ConnectFailed(
                "streamable HTTP transport already started".to_string(),
            ));
        }
        Ok(())
    }

    async fn send(&self, message: TransportMessage, opts: SendOptions) -> TransportResult<()> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(TransportError::NotOpen(
                "streamable HTTP transport has not been started".to_string(),
            ));
        }
        let stream_id = match &opts.related_request_id {
            Some(request_id) => request_stream_id(&self.session_id, request_id),
            None => standalone_stream_id(&self.session_id),
        };
        self.publish(stream_id, &message).await;
        Ok(())
    }

    async fn close(&self) -> TransportResult<()> {
        if !self.open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(sink) = self.sink.load_full() {
            sink.on_close().await;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protomcp_types::{JsonRpcMessage, JsonRpcNotification, RequestId};

    fn transport() -> Arc<StreamableHttpTransport> {
        StreamableHttpTransport::new(
            SessionId::from("sess-1"),
            crate::event_store::InMemoryEventStore::new(),
            StreamRegistry::new(),
        )
    }

    #[tokio::test]
    async fn send_before_start_fails_loudly() {
        let transport = transport();
        let note = JsonRpcMessage::Notification(JsonRpcNotification::new("ping", None));
        let result = transport.send(note.into(), SendOptions::default()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn starting_twice_is_an_error() {
        let transport = transport();
        transport.start().await.unwrap();
        assert!(transport.start().await.is_err());
    }

    #[tokio::test]
    async fn send_without_related_request_publishes_to_the_standalone_stream() {
        let transport = transport();
        transport.start().await.unwrap();

        let note = JsonRpcMessage::Notification(JsonRpcNotification::new("ping", None));
        transport.send(note.into(), SendOptions::default()).await.unwrap();

        let stream_id = standalone_stream_id(transport.session_id());
        let replayed = transport.event_store.replay(&stream_id, 0).await;
        assert_eq!(replayed.len(), 1);
    }

    #[tokio::test]
    async fn send_with_related_request_publishes_to_that_requests_stream() {
        let transport = transport();
        transport.start().await.unwrap();

        let request_id = RequestId::Number(7);
        let note = JsonRpcMessage::Notification(JsonRpcNotification::new("progress", None));
        transport
            .send(
                note.into(),
                SendOptions {
                    related_request_id: Some(request_id.clone()),
                },
            )
            .await
            .unwrap();

        let stream_id = request_stream_id(transport.session_id(), &request_id);
        let replayed = transport.event_store.replay(&stream_id, 0).await;
        assert_eq!(replayed.len(), 1);
    }

    #[test]
    fn request_and_standalone_stream_ids_differ() {
        let session_id = SessionId::from("sess-1");
        let request_id = RequestId::Number(1);
        assert_ne!(
            request_stream_id(&session_id, &request_id).0,
            standalone_stream_id(&session_id).0
        );
    }
}
