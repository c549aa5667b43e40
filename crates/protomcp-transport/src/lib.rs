//! Transport abstraction for the protomcp JSON-RPC 2.0 runtime.
//!
//! A [`Transport`] moves frames between this process and a peer and
//! reports lifecycle events through a registered [`TransportEventSink`].
//! This crate carries only transports that need no HTTP stack; the
//! Streamable HTTP transport lives in `protomcp-http` since it depends on
//! `axum`.

#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]
#![deny(unsafe_code)]

mod error;
mod memory;
mod stdio;
mod traits;
mod types;

pub use error::{TransportError, TransportResult};
pub use memory::InMemoryTransport;
pub use stdio::StdioTransport;
pub use traits::{Transport, TransportEventSink};
pub use types::{MessageExtra, SendOptions, TransportMessage};
