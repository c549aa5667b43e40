//! Error taxonomy for the protocol engine.
//!
//! Mirrors §7 of the design: protocol errors carry the standard JSON-RPC
//! codes, cancellation/timeout are distinct from application failures so
//! callers can branch on them without string matching.

use protomcp_types::{JsonRpcError, JsonRpcErrorCode};
use serde_json::Value;
use thiserror::Error;

/// Result alias used throughout the protocol engine.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors observable by a caller of [`crate::Protocol`].
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum ProtocolError {
    /// No handler is registered for the given method.
    #[error("method not found: {method}")]
    MethodNotFound {
        /// The method name that had no handler.
        method: String,
    },

    /// `params` failed method-specific validation.
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// The envelope itself was not a well-formed JSON-RPC message.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Body failed to parse as JSON.
    #[error("parse error: {0}")]
    ParseError(String),

    /// A handler or internal invariant failed unexpectedly.
    #[error("internal error: {0}")]
    Internal(String),

    /// A handler returned an application-defined error; code/message/data
    /// are preserved verbatim across the wire.
    #[error("application error {code}: {message}")]
    Application {
        /// Application-defined error code.
        code: i32,
        /// Human-readable message.
        message: String,
        /// Optional structured detail.
        data: Option<Value>,
    },

    /// The request was cancelled before it completed.
    #[error("request cancelled: {reason}")]
    Cancelled {
        /// Best-effort human-readable reason (caller signal, timeout, peer
        /// notification, or shutdown).
        reason: String,
    },

    /// The request exceeded its deadline.
    #[error("request timed out after {elapsed_ms}ms")]
    TimedOut {
        /// Milliseconds elapsed before the deadline fired.
        elapsed_ms: u64,
    },

    /// `connect` was called while already connected.
    #[error("protocol already connected")]
    AlreadyConnected,

    /// An operation was attempted with no transport attached.
    #[error("protocol not connected")]
    NotConnected,

    /// The engine (or its transport) was closed.
    #[error("protocol closed: {0}")]
    Closed(String),
}

impl ProtocolError {
    /// Translate to the JSON-RPC error shape sent over the wire.
    pub fn to_jsonrpc_error(&self) -> JsonRpcError {
        match self {
            Self::MethodNotFound { method } => JsonRpcError::from(JsonRpcErrorCode::MethodNotFound)
                .with_data(serde_json::json!({ "method": method })),
            Self::InvalidParams(msg) => {
                JsonRpcError::from(JsonRpcErrorCode::InvalidParams).with_data(serde_json::json!({ "reason": msg }))
            }
            Self::InvalidRequest(msg) => {
                JsonRpcError::from(JsonRpcErrorCode::InvalidRequest).with_data(serde_json::json!({ "reason": msg }))
            }
            Self::ParseError(msg) => {
                JsonRpcError::from(JsonRpcErrorCode::ParseError).with_data(serde_json::json!({ "reason": msg }))
            }
            Self::Application { code, message, data } => {
                let mut err = JsonRpcError::new(*code, message.clone());
                if let Some(data) = data.clone() {
                    err = err.with_data(data);
                }
                err
            }
            Self::Cancelled { reason } => JsonRpcError::new(JsonRpcErrorCode::InternalError.code(), "Request cancelled")
                .with_data(serde_json::json!({ "reason": reason })),
            Self::TimedOut { elapsed_ms } => JsonRpcError::new(JsonRpcErrorCode::InternalError.code(), "Request timed out")
                .with_data(serde_json::json!({ "elapsedMs": elapsed_ms })),
            other => JsonRpcError::from(JsonRpcErrorCode::InternalError)
                .with_data(serde_json::json!({ "reason": other.to_string() })),
        }
    }

    /// `true` if this represents a cancellation/timeout rather than a
    /// protocol or application failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled { .. } | Self::TimedOut { .. })
    }
}
