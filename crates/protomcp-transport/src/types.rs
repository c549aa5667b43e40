//! Message envelope and lifecycle-callback types shared by all transports.

use std::collections::HashMap;

use protomcp_types::JsonRpcMessage;
use serde_json::Value;

/// One frame moved across a [`crate::Transport`].
///
/// Batches are represented as `Vec<JsonRpcMessage>` rather than a nested
/// enum, since on the wire a JSON-RPC batch is just an array of envelopes.
#[derive(Debug, Clone)]
pub enum TransportMessage {
    /// A single request, response, or notification.
    Single(JsonRpcMessage),
    /// A batch of messages sent/received as one array.
    Batch(Vec<JsonRpcMessage>),
}

impl TransportMessage {
    /// Iterate the individual messages, whether this is a single frame or
    /// a batch.
    pub fn iter(&self) -> impl Iterator<Item = &JsonRpcMessage> {
        match self {
            Self::Single(msg) => std::slice::from_ref(msg).iter(),
            Self::Batch(msgs) => msgs.iter(),
        }
    }
}

impl From<JsonRpcMessage> for TransportMessage {
    fn from(msg: JsonRpcMessage) -> Self {
        Self::Single(msg)
    }
}

/// Options accompanying a [`crate::Transport::send`] call.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Hints which in-flight request this response/notification belongs
    /// to. The Streamable HTTP transport uses this to pick the SSE stream
    /// to emit on; other transports may ignore it.
    pub related_request_id: Option<protomcp_types::RequestId>,
}

/// Out-of-band context delivered alongside an inbound message.
#[derive(Debug, Clone, Default)]
pub struct MessageExtra {
    /// Authentication info attached by a fronting auth layer (e.g. the
    /// bearer middleware in `protomcp-auth`), as an opaque JSON value so
    /// this crate need not depend on the auth crate.
    pub auth_info: Option<Value>,
    /// Arbitrary request metadata (remote address, headers subset, …).
    pub request_info: HashMap<String, String>,
    /// Session id, when the transport is session-aware.
    pub session_id: Option<String>,
}
