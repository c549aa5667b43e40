//! Wire types for the protomcp JSON-RPC 2.0 runtime.
//!
//! This crate is intentionally free of any I/O, scheduling, or transport
//! concerns: it is the value domain that `protomcp-protocol` multiplexes
//! and `protomcp-http`/`protomcp-transport` move across the wire.

#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]
#![deny(unsafe_code)]

mod jsonrpc;
mod progress;

pub use jsonrpc::{
    JsonRpcBatch, JsonRpcError, JsonRpcErrorCode, JsonRpcMessage, JsonRpcNotification,
    JsonRpcRequest, JsonRpcResponse, JsonRpcResponsePayload, JsonRpcVersion, RequestId,
    ResponseId, JSONRPC_VERSION,
};
pub use progress::{ProgressNotificationParams, ProgressToken};
