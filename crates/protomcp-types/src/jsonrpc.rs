//! JSON-RPC 2.0 envelope types.
//!
//! A message is exactly one of [`JsonRpcRequest`], [`JsonRpcResponse`], or
//! [`JsonRpcNotification`] (see [`JsonRpcMessage`]), or a [`JsonRpcBatch`]
//! of these. Request ids are never reused by the peer that issued them
//! while the corresponding request is outstanding; that invariant is
//! enforced by `protomcp-protocol`, not by this crate.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// JSON-RPC version string carried on every envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// Zero-sized marker that (de)serializes as the literal `"2.0"` and
/// rejects anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JsonRpcVersion;

impl Serialize for JsonRpcVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(JSONRPC_VERSION)
    }
}

impl<'de> Deserialize<'de> for JsonRpcVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let version = String::deserialize(deserializer)?;
        if version == JSONRPC_VERSION {
            Ok(JsonRpcVersion)
        } else {
            Err(serde::de::Error::custom(format!(
                "invalid jsonrpc version: expected '{JSONRPC_VERSION}', got '{version}'"
            )))
        }
    }
}

/// A request or response identifier.
///
/// Per JSON-RPC 2.0, ids are either a string or a number; protomcp never
/// emits fractional numeric ids and treats them as `i64`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric id, as assigned by [`crate`]'s callers via a monotonic
    /// counter.
    Number(i64),
    /// String id, typically used by peers that prefer opaque tokens.
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for RequestId {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

/// The id field of a response, which is `null` for responses to requests
/// that could not be parsed (e.g. a parse error has no known id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseId(pub Option<RequestId>);

impl ResponseId {
    /// Build a response id tied to a known request.
    pub fn from_request(id: RequestId) -> Self {
        Self(Some(id))
    }

    /// Build the `null` response id used for parse errors.
    pub fn null() -> Self {
        Self(None)
    }

    /// Borrow the underlying request id, if any.
    pub fn as_request_id(&self) -> Option<&RequestId> {
        self.0.as_ref()
    }

    /// `true` for the parse-error `null` id.
    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }
}

/// A JSON-RPC request: expects exactly one [`JsonRpcResponse`] with a
/// matching id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Always `"2.0"`.
    pub jsonrpc: JsonRpcVersion,
    /// Method name, dispatched by `protomcp-protocol` on the receiver.
    pub method: String,
    /// Method parameters, method-specific.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Correlates the eventual response back to this request.
    pub id: RequestId,
}

impl JsonRpcRequest {
    /// Construct a request with the given id, method, and params.
    pub fn new(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            method: method.into(),
            params,
            id,
        }
    }
}

/// A JSON-RPC notification: fire-and-forget, never answered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// Always `"2.0"`.
    pub jsonrpc: JsonRpcVersion,
    /// Notification method name.
    pub method: String,
    /// Notification parameters, method-specific.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    /// Construct a notification.
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC error object, nested inside an error [`JsonRpcResponse`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Numeric error code; see [`JsonRpcErrorCode`] for the standard set.
    pub code: i32,
    /// Short, human-readable summary.
    pub message: String,
    /// Arbitrary structured detail, preserved verbatim across the wire.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    /// Build an error object.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attach structured `data` to the error.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// A response payload is exactly one of `result` or `error`, never both.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcResponsePayload {
    /// Successful result.
    Success {
        /// The method's return value.
        result: Value,
    },
    /// Failed result.
    Error {
        /// The error detail.
        error: JsonRpcError,
    },
}

/// A JSON-RPC response to a previously issued [`JsonRpcRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Always `"2.0"`.
    pub jsonrpc: JsonRpcVersion,
    /// Either the result or the error, mutually exclusive.
    #[serde(flatten)]
    pub payload: JsonRpcResponsePayload,
    /// Id of the request this responds to, or `null` for parse errors.
    pub id: ResponseId,
}

impl JsonRpcResponse {
    /// Build a success response.
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            payload: JsonRpcResponsePayload::Success { result },
            id: ResponseId::from_request(id),
        }
    }

    /// Build an error response tied to a known request id.
    pub fn error(id: RequestId, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            payload: JsonRpcResponsePayload::Error { error },
            id: ResponseId::from_request(id),
        }
    }

    /// Build an error response with no known request id (parse errors).
    pub fn error_without_id(error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            payload: JsonRpcResponsePayload::Error { error },
            id: ResponseId::null(),
        }
    }

    /// `true` if this is an error response.
    pub fn is_error(&self) -> bool {
        matches!(self.payload, JsonRpcResponsePayload::Error { .. })
    }
}

/// One array element of a batch request or response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    /// An outbound or inbound request.
    Request(JsonRpcRequest),
    /// A reply to a prior request.
    Response(JsonRpcResponse),
    /// A one-way notification.
    Notification(JsonRpcNotification),
}

impl JsonRpcMessage {
    /// The request id, if this message carries one.
    pub fn request_id(&self) -> Option<&RequestId> {
        match self {
            Self::Request(r) => Some(&r.id),
            Self::Response(r) => r.id.as_request_id(),
            Self::Notification(_) => None,
        }
    }

    /// The method name, for requests and notifications.
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request(r) => Some(&r.method),
            Self::Notification(n) => Some(&n.method),
            Self::Response(_) => None,
        }
    }
}

/// A batch of JSON-RPC messages sent or received as a single JSON array.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JsonRpcBatch<T> {
    /// The batch's items, in wire order.
    pub items: Vec<T>,
}

/// The standard JSON-RPC 2.0 error codes, plus an escape hatch for
/// application-defined codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonRpcErrorCode {
    /// Malformed JSON (-32700).
    ParseError,
    /// The envelope is not a valid request object (-32600).
    InvalidRequest,
    /// No handler registered for `method` (-32601).
    MethodNotFound,
    /// `params` failed validation for the method (-32602).
    InvalidParams,
    /// Unclassified server-side failure (-32603).
    InternalError,
    /// Handler- or application-defined code, outside the reserved range.
    ApplicationError(i32),
}

impl JsonRpcErrorCode {
    /// The numeric code on the wire.
    pub fn code(&self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::ApplicationError(code) => *code,
        }
    }

    /// The standard short message for this code.
    pub fn message(&self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
            Self::ApplicationError(_) => "Application error",
        }
    }
}

impl fmt::Display for JsonRpcErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message(), self.code())
    }
}

impl From<JsonRpcErrorCode> for JsonRpcError {
    fn from(code: JsonRpcErrorCode) -> Self {
        Self {
            code: code.code(),
            message: code.message().to_string(),
            data: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn request_round_trips() {
        let req = JsonRpcRequest::new(RequestId::Number(1), "tools/call", None);
        let json = serde_json::to_string(&req).unwrap();
        let back: JsonRpcRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.method, "tools/call");
        assert_eq!(back.id, RequestId::Number(1));
    }

    #[test]
    fn response_payload_is_mutually_exclusive() {
        let ok = JsonRpcResponse::success(RequestId::Number(1), serde_json::json!({"ok": true}));
        let json = serde_json::to_value(&ok).unwrap();
        assert!(json.get("result").is_some());
        assert!(json.get("error").is_none());

        let err = JsonRpcResponse::error(RequestId::Number(1), JsonRpcErrorCode::MethodNotFound.into());
        let json = serde_json::to_value(&err).unwrap();
        assert!(json.get("error").is_some());
        assert!(json.get("result").is_none());
    }

    #[test]
    fn rejects_wrong_jsonrpc_version() {
        let bad = serde_json::json!({"jsonrpc": "1.0", "method": "ping", "id": 1});
        let result: Result<JsonRpcRequest, _> = serde_json::from_value(bad);
        assert!(result.is_err());
    }

    #[test]
    fn batch_is_transparent_array() {
        let batch = JsonRpcBatch {
            items: vec![JsonRpcNotification::new("a", None), JsonRpcNotification::new("b", None)],
        };
        let json = serde_json::to_value(&batch).unwrap();
        assert!(json.is_array());
        assert_eq!(json.as_array().unwrap().len(), 2);
    }

    #[test]
    fn error_without_id_is_null() {
        let resp = JsonRpcResponse::error_without_id(JsonRpcErrorCode::ParseError.into());
        assert!(resp.id.is_null());
    }

    #[test]
    fn untagged_message_dispatches_by_shape() {
        let req_json = serde_json::json!({"jsonrpc":"2.0","method":"ping","id":1});
        let note_json = serde_json::json!({"jsonrpc":"2.0","method":"notifications/progress"});
        let resp_json = serde_json::json!({"jsonrpc":"2.0","result":{},"id":1});

        assert!(matches!(
            serde_json::from_value::<JsonRpcMessage>(req_json).unwrap(),
            JsonRpcMessage::Request(_)
        ));
        assert!(matches!(
            serde_json::from_value::<JsonRpcMessage>(note_json).unwrap(),
            JsonRpcMessage::Notification(_)
        ));
        assert!(matches!(
            serde_json::from_value::<JsonRpcMessage>(resp_json).unwrap(),
            JsonRpcMessage::Response(_)
        ));
    }
}
