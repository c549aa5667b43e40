//! The single `/mcp` axum route: POST/GET/DELETE per §4.5.
//!
//! One route, SSE-by-default response mode (JSON only when
//! `enable_json_response` is configured and the client doesn't demand
//! `text/event-stream`), `Mcp-Session-Id` session resolution, and
//! `Last-Event-ID` replay on GET. Origin checks and bearer-auth
//! enforcement are intentionally absent from the handler bodies —
//! they're layered on as `tower`/axum middleware by whoever mounts this
//! router, so a deployment that doesn't need them doesn't pay for them.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use protomcp_protocol::Protocol;
use protomcp_transport::{MessageExtra, Transport, TransportMessage};
use protomcp_types::{JsonRpcMessage, RequestId};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{SessionMode, StreamableHttpConfig};
use crate::event_store::EventStore;
use crate::session::{new_session_record, SessionId, SessionStore};
use crate::sse::{parse_last_event_id, to_sse_event};
use crate::stream::StreamRegistry;
use crate::transport::{request_stream_id, standalone_stream_id, StreamableHttpTransport};

const SESSION_HEADER: &str = "mcp-session-id";
const PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";
const LAST_EVENT_ID_HEADER: &str = "last-event-id";

/// Protocol versions this server understands (§6). Requests naming an
/// unrecognized version are rejected rather than silently downgraded.
const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26"];

/// A session's live transport and the `Protocol` bound to it.
struct SessionEntry {
    transport: Arc<StreamableHttpTransport>,
    protocol: Protocol,
}

/// Shared state behind the `/mcp` route.
///
/// `protocol_factory` builds a fresh, handler-registered [`Protocol`] for
/// each new session; the router only supplies the transport half.
pub struct ServerState {
    config: StreamableHttpConfig,
    session_store: Arc<dyn SessionStore>,
    event_store: Arc<dyn EventStore>,
    stream_registry: Arc<StreamRegistry>,
    sessions: DashMap<SessionId, Arc<SessionEntry>>,
    protocol_factory: Arc<dyn Fn() -> Protocol + Send + Sync>,
}

impl ServerState {
    /// Assemble server state. `protocol_factory` is invoked once per new
    /// session and must return a `Protocol` with every request/notification
    /// handler already registered (it has not yet been `connect`ed).
    pub fn new(
        config: StreamableHttpConfig,
        session_store: Arc<dyn SessionStore>,
        event_store: Arc<dyn EventStore>,
        protocol_factory: Arc<dyn Fn() -> Protocol + Send + Sync>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            session_store,
            event_store,
            stream_registry: StreamRegistry::new(),
            sessions: DashMap::new(),
            protocol_factory,
        })
    }

    async fn open_session(self: &Arc<Self>) -> Arc<SessionEntry> {
        let session_id = SessionId::generate();
        let transport = StreamableHttpTransport::new(
            session_id.clone(),
            self.event_store.clone(),
            self.stream_registry.clone(),
        );
        let protocol = (self.protocol_factory)();
        if let Err(err) = protocol.connect(transport.clone() as Arc<dyn Transport>).await {
            warn!(%err, "failed to connect session transport");
        }
        self.session_store
            .store_session(new_session_record(session_id.clone()))
            .await;
        let entry = Arc::new(SessionEntry { transport, protocol });
        self.sessions.insert(session_id, entry.clone());
        entry
    }

    async fn lookup_session(&self, id: &SessionId) -> Option<Arc<SessionEntry>> {
        if self.session_store.get_session(id).await.is_none() {
            self.sessions.remove(id);
            return None;
        }
        self.session_store.update_session_activity(id).await;
        self.sessions.get(id).map(|e| e.clone())
    }
}

/// Build the `/mcp` router (a single path handling GET/POST/DELETE), per
/// §4.5.
pub fn create_router(state: Arc<ServerState>) -> Router {
    let path = state.config.endpoint_path.clone();
    Router::new()
        .route(&path, post(post_handler).get(get_handler).delete(delete_handler))
        .with_state(state)
}

fn accepts_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(axum::http::header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("text/event-stream"))
        .unwrap_or(false)
}

fn session_header(headers: &HeaderMap) -> Option<SessionId> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(SessionId::from)
}

fn protocol_version_is_supported(headers: &HeaderMap) -> bool {
    match headers.get(PROTOCOL_VERSION_HEADER).and_then(|v| v.to_str().ok()) {
        None => true,
        Some(version) => SUPPORTED_PROTOCOL_VERSIONS.contains(&version),
    }
}

fn is_initialize_request(message: &TransportMessage) -> bool {
    matches!(
        message,
        TransportMessage::Single(JsonRpcMessage::Request(req)) if req.method == "initialize"
    )
}

fn request_ids(message: &TransportMessage) -> Vec<RequestId> {
    message
        .iter()
        .filter_map(|m| match m {
            JsonRpcMessage::Request(req) => Some(req.id.clone()),
            _ => None,
        })
        .collect()
}

/// `POST /mcp`: the client sends one request/notification/response (or a
/// batch), the server replies as an SSE stream primed with a retry event,
/// unless `enable_json_response` is configured and the client accepts a
/// plain JSON body (§4.5 "Response mode negotiation").
async fn post_handler(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !protocol_version_is_supported(&headers) {
        return (StatusCode::BAD_REQUEST, "unsupported MCP-Protocol-Version").into_response();
    }

    let message: TransportMessage = match parse_body(&body) {
        Ok(m) => m,
        Err(err) => return (StatusCode::BAD_REQUEST, err).into_response(),
    };

    let entry = match resolve_session_for_post(&state, &headers, &message).await {
        Ok(entry) => entry,
        Err(resp) => return resp,
    };

    let pending = request_ids(&message);
    let extra = MessageExtra {
        session_id: Some(entry.transport.session_id().to_string()),
        ..Default::default()
    };

    if pending.is_empty() {
        entry.transport.deliver_inbound(message, extra).await;
        return (StatusCode::ACCEPTED, session_header_map(entry.transport.session_id())).into_response();
    }

    // Each request in the batch gets its own stream; a single request is
    // the common case and degenerates to one stream.
    let mut receivers: Vec<_> = pending
        .iter()
        .map(|id| state.stream_registry.open(request_stream_id(entry.transport.session_id(), id)))
        .collect();
    entry.transport.deliver_inbound(message, extra).await;

    let response_headers = session_header_map(entry.transport.session_id());
    let expected = pending.len();

    // SSE is the default response mode; JSON mode only kicks in when the
    // server is configured for it (§4.5 "used when enableJsonResponse is
    // set") and the client hasn't explicitly demanded an event stream.
    let use_json = state.config.enable_json_response && !accepts_event_stream(&headers);

    if use_json {
        let mut responses = Vec::with_capacity(expected);
        for (mut rx, guard) in receivers.drain(..) {
            while let Some(event) = rx.recv().await {
                let terminal = is_terminal_response(&event.data);
                if terminal {
                    responses.push(event.data);
                    break;
                }
            }
            drop(guard);
        }
        let body = if responses.len() == 1 {
            responses.into_iter().next().unwrap()
        } else {
            Value::Array(responses)
        };
        (StatusCode::OK, response_headers, Json(body)).into_response()
    } else {
        let keep_alive = state.config.keep_alive_interval;
        let priming = stream::once(async { Ok::<Event, axum::Error>(priming_event(keep_alive)) });
        let merged = stream::select_all(receivers.into_iter().map(|(rx, guard)| {
            Box::pin(stream::unfold((rx, guard, false), |(mut rx, guard, done)| async move {
                if done {
                    return None;
                }
                let event = rx.recv().await?;
                let terminal = is_terminal_response(&event.data);
                Some((Ok::<Event, axum::Error>(to_sse_event(&event)), (rx, guard, terminal)))
            }))
        }));
        Sse::new(priming.chain(merged))
            .keep_alive(KeepAlive::new().interval(keep_alive))
            .into_response()
    }
}

/// The first event on a freshly opened SSE stream: no `id`/`data` payload
/// of its own, just a suggested `retry:` interval so the client knows how
/// soon to reconnect if the stream drops before the eventual response
/// (§4.5 "a priming event … then the eventual response", §6).
fn priming_event(retry: std::time::Duration) -> Event {
    Event::default().retry(retry).comment("stream open")
}

fn session_header_map(session_id: &SessionId) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(session_id.as_str()) {
        headers.insert(SESSION_HEADER, value);
    }
    headers
}

fn is_terminal_response(data: &Value) -> bool {
    data.get("result").is_some() || data.get("error").is_some()
}

async fn resolve_session_for_post(
    state: &Arc<ServerState>,
    headers: &HeaderMap,
    message: &TransportMessage,
) -> Result<Arc<SessionEntry>, Response> {
    if state.config.session_mode == SessionMode::Stateless {
        return Ok(state.open_session().await);
    }

    match session_header(headers) {
        Some(id) => state
            .lookup_session(&id)
            .await
            .ok_or_else(|| (StatusCode::NOT_FOUND, "unknown or expired session").into_response()),
        None if is_initialize_request(message) => Ok(state.open_session().await),
        None => Err((StatusCode::BAD_REQUEST, "missing Mcp-Session-Id").into_response()),
    }
}

fn parse_body(body: &Bytes) -> Result<TransportMessage, &'static str> {
    let value: Value = serde_json::from_slice(body).map_err(|_| "malformed JSON body")?;
    match value {
        Value::Array(items) => {
            let messages: Result<Vec<JsonRpcMessage>, _> =
                items.into_iter().map(serde_json::from_value).collect();
            messages
                .map(TransportMessage::Batch)
                .map_err(|_| "malformed JSON-RPC batch")
        }
        other => serde_json::from_value(other)
            .map(TransportMessage::Single)
            .map_err(|_| "malformed JSON-RPC message"),
    }
}

/// `GET /mcp`: opens (or resumes) the session's standalone server-push
/// stream (§4.5 "Standalone stream").
async fn get_handler(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> Response {
    let Some(session_id) = session_header(&headers) else {
        return (StatusCode::BAD_REQUEST, "missing Mcp-Session-Id").into_response();
    };
    if state.lookup_session(&session_id).await.is_none() {
        return (StatusCode::NOT_FOUND, "unknown or expired session").into_response();
    }

    let stream_id = standalone_stream_id(&session_id);
    let after = parse_last_event_id(
        headers
            .get(LAST_EVENT_ID_HEADER)
            .and_then(|v| v.to_str().ok()),
    );
    let backlog = state.event_store.replay(&stream_id, after).await;
    debug!(session_id = %session_id, replayed = backlog.len(), "resuming standalone stream");

    let (rx, guard) = state.stream_registry.open(stream_id);
    let keep_alive = state.config.keep_alive_interval;

    let live = stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let event = rx.recv().await?;
        Some((Ok::<Event, axum::Error>(to_sse_event(&event)), (rx, guard)))
    });
    let replayed: Vec<Event> = backlog.iter().map(to_sse_event).collect();
    let combined = stream::iter(replayed).map(Ok::<Event, axum::Error>).chain(live);

    Sse::new(combined)
        .keep_alive(KeepAlive::new().interval(keep_alive))
        .into_response()
}

/// `DELETE /mcp`: explicit session termination (§4.5).
async fn delete_handler(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> Response {
    let Some(session_id) = session_header(&headers) else {
        return (StatusCode::BAD_REQUEST, "missing Mcp-Session-Id").into_response();
    };
    if let Some((_, entry)) = state.sessions.remove(&session_id) {
        let _ = entry.protocol.close().await;
    }
    state.session_store.delete_session(&session_id).await;
    state.event_store.trim(&standalone_stream_id(&session_id), None).await;
    StatusCode::NO_CONTENT.into_response()
}
