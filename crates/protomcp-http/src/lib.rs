//! Streamable HTTP transport (server side): session store, event store,
//! SSE framing, and the `/mcp` axum router (§4.3, §4.4, §4.5).
//!
//! This crate is the HTTP-facing half of the runtime; the wire-level
//! [`protomcp_protocol::Protocol`] and its transport abstraction live in
//! `protomcp-protocol`/`protomcp-transport` and know nothing about HTTP.
//! [`transport::StreamableHttpTransport`] is the seam between the two: a
//! `protomcp_transport::Transport` implementation scoped to one session,
//! driven by the axum handlers in [`router`].

#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]
#![deny(unsafe_code)]

mod config;
mod error;
mod event_store;
mod router;
mod session;
mod sse;
mod stream;
mod transport;

pub use config::{SessionMode, StreamableHttpConfig, StreamableHttpConfigBuilder};
pub use error::{HttpTransportError, HttpTransportResult};
pub use event_store::{EventStore, InMemoryEventStore, StoredEvent, StreamId};
pub use router::{create_router, ServerState};
pub use session::{InMemorySessionStore, SessionId, SessionRecord, SessionStore};
pub use sse::{parse_last_event_id, to_sse_event};
pub use stream::{PushOutcome, StreamGuard, StreamRegistry};
pub use transport::{request_stream_id, standalone_stream_id, StreamableHttpTransport};
