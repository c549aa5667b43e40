//! Per-request context handed to handlers.
//!
//! Carries what a symmetric peer needs: cancellation, correlated
//! send-back, and the identity/session fields extracted by the transport.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use protomcp_types::{JsonRpcError, RequestId};

use crate::error::ProtocolResult;

/// Lets a handler send requests/notifications back to the peer that sent
/// it, correlated to the request it is handling.
///
/// A separate trait (rather than handing the handler an `Arc<Protocol>`
/// directly) keeps `protomcp-protocol`'s public surface free of a
/// `Context -> Protocol -> Context` cycle and lets callers substitute a
/// test double.
#[async_trait]
pub trait PeerHandle: Send + Sync {
    /// Send a request to the peer, correlated with `related_request_id`.
    /// Returns the peer's result, or the peer's error translated via
    /// [`crate::ProtocolError::Application`].
    async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
        related_request_id: RequestId,
    ) -> ProtocolResult<Value>;

    /// Send a fire-and-forget notification to the peer.
    async fn send_notification(&self, method: &str, params: Option<Value>) -> ProtocolResult<()>;
}

/// Context threaded through a single inbound request or notification.
#[derive(Clone)]
pub struct RequestContext {
    /// The id of the request being handled. `None` for notification
    /// handlers, which have nothing to correlate a response to.
    pub request_id: Option<RequestId>,
    /// Signaled when the request is cancelled (caller signal, timeout,
    /// peer `notifications/cancelled`, or engine shutdown). Handlers
    /// should check this at suspension points.
    pub cancellation_token: CancellationToken,
    /// Opaque auth info attached by a fronting auth layer, if any.
    pub auth_info: Option<Value>,
    /// Session id, when the transport is session-aware.
    pub session_id: Option<String>,
    /// Arbitrary metadata the transport chose to surface (remote address,
    /// selected headers, …).
    pub metadata: Arc<HashMap<String, Value>>,
    /// Handle for sending requests/notifications back to the peer,
    /// correlated to this request.
    pub(crate) peer: Arc<dyn PeerHandle>,
}

impl RequestContext {
    pub(crate) fn new(
        request_id: Option<RequestId>,
        cancellation_token: CancellationToken,
        auth_info: Option<Value>,
        session_id: Option<String>,
        metadata: Arc<HashMap<String, Value>>,
        peer: Arc<dyn PeerHandle>,
    ) -> Self {
        Self {
            request_id,
            cancellation_token,
            auth_info,
            session_id,
            metadata,
            peer,
        }
    }

    /// `true` if cancellation has been signaled for this request.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Send a request to the peer this handler is answering, correlated
    /// to the current request id.
    pub async fn send_request(&self, method: &str, params: Option<Value>) -> ProtocolResult<Value> {
        let related = self
            .request_id
            .clone()
            .unwrap_or_else(|| RequestId::String("unsolicited".to_string()));
        self.peer.send_request(method, params, related).await
    }

    /// Send a notification to the peer this handler is answering.
    pub async fn send_notification(&self, method: &str, params: Option<Value>) -> ProtocolResult<()> {
        self.peer.send_notification(method, params).await
    }

    /// Fetch a metadata value by key.
    #[must_use]
    pub fn get_metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }
}

/// Either a handler's success value or a structured application error,
/// returned by [`crate::Handler::handle`].
pub type HandlerResult = Result<Value, JsonRpcError>;
