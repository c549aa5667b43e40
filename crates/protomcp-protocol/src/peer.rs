//! The symmetric JSON-RPC peer: `Protocol`.
//!
//! Implements the correlation-map design described in §4.2. A `Protocol`
//! is usable as both a client (issuing requests to a server) and a server
//! (answering requests from a client) since the wire contract is
//! symmetric; only the handler registrations differ.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{oneshot, Notify};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use protomcp_transport::{MessageExtra, SendOptions, Transport, TransportEventSink, TransportError, TransportMessage};
use protomcp_types::{
    JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, JsonRpcResponsePayload,
    ProgressNotificationParams, ProgressToken, RequestId,
};

use crate::context::{PeerHandle, RequestContext};
use crate::error::{ProtocolError, ProtocolResult};
use crate::handler::{Handler, HandlerTable, NotificationHandler};
use crate::inflight::{InFlight, RequestOptions};
use crate::middleware::{MethodClass, MiddlewareRequest, Pipeline};

/// Default request deadline, per §5 ("request 60s (configurable)").
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const CANCEL_NOTIFICATION_METHOD: &str = "notifications/cancelled";
const PROGRESS_NOTIFICATION_METHOD: &str = "notifications/progress";

/// Configuration for a [`Protocol`] instance.
#[derive(Clone)]
pub struct ProtocolConfig {
    /// Default per-request timeout applied when the caller doesn't set one.
    pub default_timeout: Duration,
    /// Outgoing middleware pipeline (requests/notifications this peer sends).
    pub outgoing: Pipeline,
    /// Incoming middleware pipeline (requests/notifications this peer serves).
    pub incoming: Pipeline,
    /// Specialized pipelines layered inside `incoming` for particular
    /// method classes (§4.2: tool call, resource read, sampling,
    /// elicitation, prompt). A class with no entry here runs `incoming`
    /// only, straight through to the handler.
    pub method_class: HashMap<MethodClass, Pipeline>,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_REQUEST_TIMEOUT,
            outgoing: Pipeline::default(),
            incoming: Pipeline::default(),
            method_class: HashMap::new(),
        }
    }
}

impl ProtocolConfig {
    /// Register a specialized pipeline for `class`, run after `incoming`
    /// and before the handler for any method that classifies as `class`.
    #[must_use]
    pub fn with_method_class_pipeline(mut self, class: MethodClass, pipeline: Pipeline) -> Self {
        self.method_class.insert(class, pipeline);
        self
    }
}

struct ProtocolInner {
    transport: ArcSwapOption<dyn Transport>,
    in_flight: DashMap<RequestId, InFlight>,
    /// Cancellation tokens for requests this peer is currently *serving*,
    /// keyed by the inbound request id. Looked up when a peer
    /// `notifications/cancelled` arrives (§4.2).
    inbound_cancellations: DashMap<RequestId, CancellationToken>,
    next_id: AtomicI64,
    handlers: HandlerTable,
    config: ProtocolConfig,
    closed: std::sync::atomic::AtomicBool,
}

/// A symmetric JSON-RPC 2.0 peer.
///
/// Cheap to clone: internally an `Arc<ProtocolInner>`. Clones share the
/// same connection, handler table, and in-flight map.
#[derive(Clone)]
pub struct Protocol {
    inner: Arc<ProtocolInner>,
}

impl Default for Protocol {
    fn default() -> Self {
        Self::new(ProtocolConfig::default())
    }
}

impl Protocol {
    /// Build an unconnected engine.
    #[must_use]
    pub fn new(config: ProtocolConfig) -> Self {
        Self {
            inner: Arc::new(ProtocolInner {
                transport: ArcSwapOption::empty(),
                in_flight: DashMap::new(),
                inbound_cancellations: DashMap::new(),
                next_id: AtomicI64::new(1),
                handlers: HandlerTable::new(),
                config,
                closed: std::sync::atomic::AtomicBool::new(false),
            }),
        }
    }

    /// Attach a transport and start receiving. Fails if already connected.
    pub async fn connect(&self, transport: Arc<dyn Transport>) -> ProtocolResult<()> {
        if self.inner.transport.load().is_some() {
            return Err(ProtocolError::AlreadyConnected);
        }
        self.inner.closed.store(false, Ordering::SeqCst);

        let sink: Arc<dyn TransportEventSink> = Arc::new(ProtocolSink {
            inner: Arc::downgrade(&self.inner),
        });
        transport.set_event_sink(sink);
        transport
            .start()
            .await
            .map_err(|e| ProtocolError::Internal(format!("transport start failed: {e}")))?;
        self.inner.transport.store(Some(transport));
        Ok(())
    }

    /// Register a handler for a request method.
    pub async fn set_request_handler(&self, method: impl Into<String>, handler: Arc<dyn Handler>) {
        self.inner.handlers.set_request_handler(method, handler).await;
    }

    /// Register a handler for a notification method.
    pub async fn set_notification_handler(&self, method: impl Into<String>, handler: Arc<dyn NotificationHandler>) {
        self.inner.handlers.set_notification_handler(method, handler).await;
    }

    /// Send a request and await its result, applying `opts`' timeout and
    /// progress semantics.
    pub async fn request(&self, method: &str, params: Option<Value>, opts: RequestOptions) -> ProtocolResult<Value> {
        self.request_related(method, params, opts, None).await
    }

    /// As [`Protocol::request`], but tags the outbound send with
    /// `related_request_id` (used when answering a request with a
    /// server-initiated sub-request, so a stream-aware transport can route
    /// it to the right SSE stream).
    pub async fn request_related(
        &self,
        method: &str,
        params: Option<Value>,
        opts: RequestOptions,
        related_request_id: Option<RequestId>,
    ) -> ProtocolResult<Value> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(ProtocolError::Closed("protocol is closed".to_string()));
        }
        let transport = self
            .inner
            .transport
            .load_full()
            .ok_or(ProtocolError::NotConnected)?;

        let id = RequestId::Number(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = oneshot::channel();
        let cancellation = opts.signal.clone().unwrap_or_default();
        let in_flight = InFlight::new(ProgressToken::from(id.clone()), &opts, tx);
        let reset_notify = in_flight.reset_notify.clone();
        self.inner.in_flight.insert(id.clone(), in_flight);

        let peer: Arc<dyn PeerHandle> = Arc::new(ProtocolPeerHandle { protocol: self.clone() });
        let outbound_ctx = RequestContext::new(
            Some(id.clone()),
            CancellationToken::new(),
            None,
            None,
            Arc::new(HashMap::new()),
            peer,
        );
        let mreq = MiddlewareRequest {
            method: method.to_string(),
            params,
            ctx: outbound_ctx,
        };
        let send_id = id.clone();
        let send_outcome = self
            .inner
            .config
            .outgoing
            .run(mreq, move |mreq| {
                Box::pin(async move {
                    let request = JsonRpcRequest::new(send_id, mreq.method, mreq.params);
                    let send_opts = SendOptions { related_request_id };
                    transport
                        .send(TransportMessage::Single(JsonRpcMessage::Request(request)), send_opts)
                        .await
                        .map(|()| Value::Null)
                        .map_err(|e| ProtocolError::Internal(format!("send failed: {e}")))
                })
            })
            .await;
        if let Err(err) = send_outcome {
            self.inner.in_flight.remove(&id);
            return Err(err);
        }

        let timeout = opts.timeout_ms.map(Duration::from_millis).unwrap_or(self.inner.config.default_timeout);
        let max_total = opts.max_total_timeout_ms.map(Duration::from_millis);
        let result = self
            .await_response(&id, rx, timeout, max_total, opts.reset_timeout_on_progress, reset_notify, cancellation)
            .await;
        self.inner.in_flight.remove(&id);
        result
    }

    /// Wait for `rx` to resolve, honoring `timeout` (reset by progress when
    /// `reset_on_progress` is set, via `reset_signal`), the hard `max_total`
    /// cap, and early cancellation from `external_cancel`.
    #[allow(clippy::too_many_arguments)]
    async fn await_response(
        &self,
        id: &RequestId,
        mut rx: oneshot::Receiver<crate::inflight::RequestOutcome>,
        timeout: Duration,
        max_total: Option<Duration>,
        reset_on_progress: bool,
        reset_signal: Arc<Notify>,
        external_cancel: CancellationToken,
    ) -> ProtocolResult<Value> {
        let start = Instant::now();
        let mut window_start = start;
        loop {
            if let Some(cap) = max_total {
                if start.elapsed() >= cap {
                    self.cancel_request(id, "timed out".to_string()).await;
                    return Err(ProtocolError::TimedOut { elapsed_ms: start.elapsed().as_millis() as u64 });
                }
            }
            let window_remaining = timeout.saturating_sub(window_start.elapsed());
            let sleep_for = match max_total {
                Some(cap) => window_remaining.min(cap.saturating_sub(start.elapsed())),
                None => window_remaining,
            };

            tokio::select! {
                outcome = &mut rx => {
                    return match outcome {
                        Ok(result) => result,
                        Err(_) => Err(ProtocolError::Internal("responder dropped".to_string())),
                    };
                }
                _ = external_cancel.cancelled() => {
                    self.cancel_request(id, "caller signal".to_string()).await;
                    return Err(ProtocolError::Cancelled { reason: "caller signal".to_string() });
                }
                () = reset_signal.notified(), if reset_on_progress => {
                    window_start = Instant::now();
                }
                () = tokio::time::sleep(sleep_for) => {
                    let elapsed_ms = start.elapsed().as_millis() as u64;
                    self.cancel_request(id, "timed out".to_string()).await;
                    return Err(ProtocolError::TimedOut { elapsed_ms });
                }
            }
        }
    }

    async fn cancel_request(&self, id: &RequestId, reason: String) {
        if let Some((_, mut record)) = self.inner.in_flight.remove(id) {
            debug!(?id, reason = %reason, elapsed_ms = record.elapsed().as_millis() as u64, "cancelling request");
            record.cancellation.cancel();
            record.resolve(Err(ProtocolError::Cancelled { reason: reason.clone() }));
        }
        if let Some(transport) = self.inner.transport.load_full() {
            let note = JsonRpcNotification::new(
                CANCEL_NOTIFICATION_METHOD,
                Some(serde_json::json!({ "requestId": id, "reason": reason })),
            );
            let _ = transport
                .send(TransportMessage::Single(JsonRpcMessage::Notification(note)), SendOptions::default())
                .await;
        }
    }

    /// Send a fire-and-forget notification.
    pub async fn notification(&self, method: &str, params: Option<Value>) -> ProtocolResult<()> {
        let transport = self
            .inner
            .transport
            .load_full()
            .ok_or(ProtocolError::NotConnected)?;
        let note = JsonRpcNotification::new(method, params);
        transport
            .send(TransportMessage::Single(JsonRpcMessage::Notification(note)), SendOptions::default())
            .await
            .map_err(|e| ProtocolError::Internal(format!("send failed: {e}")))
    }

    /// Cancel every in-flight request with a shutdown error and disconnect
    /// the transport. Safe to call more than once.
    pub async fn close(&self) -> ProtocolResult<()> {
        self.inner.closed.store(true, Ordering::SeqCst);
        let ids: Vec<RequestId> = self.inner.in_flight.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Some((_, mut record)) = self.inner.in_flight.remove(&id) {
                record.cancellation.cancel();
                record.resolve(Err(ProtocolError::Closed("protocol closed".to_string())));
            }
        }
        for entry in self.inner.inbound_cancellations.iter() {
            entry.value().cancel();
        }
        self.inner.inbound_cancellations.clear();
        if let Some(transport) = self.inner.transport.swap(None) {
            let _ = transport.close().await;
        }
        Ok(())
    }

    async fn dispatch_request(&self, request: JsonRpcRequest, extra: MessageExtra) {
        let id = request.id.clone();
        let Some(transport) = self.inner.transport.load_full() else {
            return;
        };

        let handler = self.inner.handlers.request_handler(&request.method).await;
        let class_pipeline = MethodClass::classify(&request.method)
            .and_then(|class| self.inner.config.method_class.get(&class).cloned());
        let cancellation = CancellationToken::new();
        self.inner.inbound_cancellations.insert(id.clone(), cancellation.clone());
        let this = self.clone();
        let this_for_peer = self.clone();

        tokio::spawn(async move {
            let response = match handler {
                None => JsonRpcResponse::error(
                    id.clone(),
                    ProtocolError::MethodNotFound { method: request.method.clone() }.to_jsonrpc_error(),
                ),
                Some(handler) => {
                    let peer: Arc<dyn PeerHandle> = Arc::new(ProtocolPeerHandle { protocol: this_for_peer });
                    let ctx = RequestContext::new(
                        Some(id.clone()),
                        cancellation,
                        extra.auth_info.clone(),
                        extra.session_id.clone(),
                        Arc::new(extra.request_info.iter().map(|(k, v)| (k.clone(), Value::String(v.clone()))).collect::<HashMap<_, _>>()),
                        peer,
                    );
                    let mreq = MiddlewareRequest {
                        method: request.method.clone(),
                        params: request.params.clone(),
                        ctx,
                    };
                    let result = this.inner.config.incoming.run(mreq, move |mreq| {
                        Box::pin(async move {
                            let run_handler = move |mreq: MiddlewareRequest| -> futures::future::BoxFuture<'static, ProtocolResult<Value>> {
                                Box::pin(async move {
                                    handler.handle(mreq.params, mreq.ctx).await.map_err(|e| ProtocolError::Application {
                                        code: e.code,
                                        message: e.message,
                                        data: e.data,
                                    })
                                })
                            };
                            match class_pipeline {
                                Some(class_pipeline) => class_pipeline.run(mreq, run_handler).await,
                                None => run_handler(mreq).await,
                            }
                        })
                    }).await;
                    match result {
                        Ok(value) => JsonRpcResponse::success(id.clone(), value),
                        Err(err) => JsonRpcResponse::error(id.clone(), err.to_jsonrpc_error()),
                    }
                }
            };
            this.inner.inbound_cancellations.remove(&id);

            let send_opts = SendOptions { related_request_id: Some(id) };
            if let Err(err) = transport
                .send(TransportMessage::Single(JsonRpcMessage::Response(response)), send_opts)
                .await
            {
                warn!(error = %err, "failed to send response");
            }
        });
    }

    async fn dispatch_notification(&self, note: JsonRpcNotification, extra: MessageExtra) {
        match note.method.as_str() {
            CANCEL_NOTIFICATION_METHOD => {
                if let Some(request_id) = note
                    .params
                    .as_ref()
                    .and_then(|p| p.get("requestId"))
                    .and_then(|v| serde_json::from_value::<RequestId>(v.clone()).ok())
                {
                    debug!(?request_id, "peer requested cancellation");
                    if let Some((_, token)) = self.inner.inbound_cancellations.remove(&request_id) {
                        token.cancel();
                    }
                }
                return;
            }
            PROGRESS_NOTIFICATION_METHOD => {
                if let Some(params) = note.params.as_ref().and_then(|p| serde_json::from_value::<ProgressNotificationParams>(p.clone()).ok())
                {
                    self.handle_progress(params);
                }
                return;
            }
            _ => {}
        }

        let Some(handler) = self.inner.handlers.notification_handler(&note.method).await else {
            trace!(method = %note.method, "no handler for notification");
            return;
        };
        let peer: Arc<dyn PeerHandle> = Arc::new(ProtocolPeerHandle { protocol: self.clone() });
        let ctx = RequestContext::new(
            None,
            CancellationToken::new(),
            extra.auth_info,
            extra.session_id,
            Arc::new(extra.request_info.into_iter().map(|(k, v)| (k, Value::String(v))).collect::<HashMap<_, _>>()),
            peer,
        );
        tokio::spawn(async move {
            handler.handle(note.params, ctx).await;
        });
    }

    fn handle_progress(&self, params: ProgressNotificationParams) {
        let id = match &params.progress_token {
            ProgressToken::Number(n) => RequestId::Number(*n),
            ProgressToken::String(s) => RequestId::String(s.clone()),
        };
        if let Some(record) = self.inner.in_flight.get(&id) {
            debug_assert_eq!(record.progress_token, params.progress_token, "progress token must match its request id");
            record.on_progress(params.progress, params.total, params.message);
        }
    }

    async fn dispatch_response(&self, response: JsonRpcResponse) {
        let Some(id) = response.id.as_request_id().cloned() else {
            warn!("received response with null id");
            return;
        };
        if let Some((_, mut record)) = self.inner.in_flight.remove(&id) {
            let outcome = match response.payload {
                JsonRpcResponsePayload::Success { result } => Ok(result),
                JsonRpcResponsePayload::Error { error } => Err(ProtocolError::Application {
                    code: error.code,
                    message: error.message,
                    data: error.data,
                }),
            };
            record.resolve(outcome);
        }
    }

    async fn handle_message(&self, message: JsonRpcMessage, extra: MessageExtra) {
        match message {
            JsonRpcMessage::Request(req) => self.dispatch_request(req, extra).await,
            JsonRpcMessage::Notification(note) => self.dispatch_notification(note, extra).await,
            JsonRpcMessage::Response(resp) => self.dispatch_response(resp).await,
        }
    }
}

/// [`TransportEventSink`] that routes messages back into the owning
/// [`Protocol`]. Holds a `Weak` reference so a transport outliving its
/// protocol (briefly, during shutdown races) doesn't keep it alive.
struct ProtocolSink {
    inner: std::sync::Weak<ProtocolInner>,
}

#[async_trait]
impl TransportEventSink for ProtocolSink {
    async fn on_message(&self, message: TransportMessage, extra: MessageExtra) {
        let Some(inner) = self.inner.upgrade() else { return };
        let protocol = Protocol { inner };
        for msg in message.iter().cloned().collect::<Vec<_>>() {
            protocol.handle_message(msg, extra.clone()).await;
        }
    }

    async fn on_error(&self, error: TransportError) {
        warn!(%error, "transport error");
    }

    async fn on_close(&self) {
        debug!("transport closed");
        if let Some(inner) = self.inner.upgrade() {
            let protocol = Protocol { inner };
            let _ = protocol.close().await;
        }
    }
}

/// [`PeerHandle`] implementation handed to handlers via [`RequestContext`].
struct ProtocolPeerHandle {
    protocol: Protocol,
}

#[async_trait]
impl PeerHandle for ProtocolPeerHandle {
    async fn send_request(&self, method: &str, params: Option<Value>, related_request_id: RequestId) -> ProtocolResult<Value> {
        self.protocol
            .request_related(method, params, RequestOptions::default(), Some(related_request_id))
            .await
    }

    async fn send_notification(&self, method: &str, params: Option<Value>) -> ProtocolResult<()> {
        self.protocol.notification(method, params).await
    }
}

impl std::fmt::Debug for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Protocol")
            .field("connected", &self.inner.transport.load().is_some())
            .field("in_flight", &self.inner.in_flight.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use protomcp_transport::InMemoryTransport;

    use crate::handler::FnHandler;
    use crate::middleware::{MethodClass, Middleware, Next, Pipeline};

    struct CountingMiddleware(Arc<AtomicUsize>);

    #[async_trait]
    impl Middleware for CountingMiddleware {
        async fn handle<'a>(&'a self, req: MiddlewareRequest, next: Next<'a>) -> ProtocolResult<Value> {
            self.0.fetch_add(1, Ordering::SeqCst);
            next(req).await
        }
    }

    #[tokio::test]
    async fn method_class_pipeline_runs_only_for_classified_methods() {
        let hits = Arc::new(AtomicUsize::new(0));
        let config = ProtocolConfig::default()
            .with_method_class_pipeline(MethodClass::ToolCall, Pipeline::new(vec![Arc::new(CountingMiddleware(hits.clone()))]));
        let server = Protocol::new(config);
        server
            .set_request_handler(
                "tools/call",
                Arc::new(FnHandler(|_params, _ctx| async {
                    Ok::<Value, protomcp_types::JsonRpcError>(Value::Bool(true))
                })),
            )
            .await;
        server
            .set_request_handler(
                "ping",
                Arc::new(FnHandler(|_params, _ctx| async {
                    Ok::<Value, protomcp_types::JsonRpcError>(Value::Bool(true))
                })),
            )
            .await;

        let client = Protocol::default();
        let (client_transport, server_transport) = InMemoryTransport::pair();
        client.connect(client_transport).await.unwrap();
        server.connect(server_transport).await.unwrap();

        let result = client.request("tools/call", None, RequestOptions::default()).await;
        assert!(result.is_ok());
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let result = client.request("ping", None, RequestOptions::default()).await;
        assert!(result.is_ok());
        assert_eq!(hits.load(Ordering::SeqCst), 1, "unclassified method must not run the tool-call pipeline");
    }
}
