//! The symmetric JSON-RPC protocol engine.
//!
//! [`Protocol`] multiplexes concurrent in-flight requests over a single
//! [`protomcp_transport::Transport`], routes incoming calls to registered
//! [`Handler`]/[`NotificationHandler`] implementations, propagates
//! cancellation and progress, enforces timeouts, and runs requests through
//! an ordered [`middleware::Pipeline`].

#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]
#![deny(unsafe_code)]

mod context;
mod error;
mod handler;
mod inflight;
mod middleware;
mod peer;
mod telemetry;

pub use context::{HandlerResult, PeerHandle, RequestContext};
pub use error::{ProtocolError, ProtocolResult};
pub use handler::{FnHandler, Handler, NotificationHandler};
pub use inflight::{RequestOptions, RequestOutcome};
pub use middleware::{MethodClass, Middleware, MiddlewareRequest, Next, Pipeline};
pub use peer::{Protocol, ProtocolConfig, DEFAULT_REQUEST_TIMEOUT};
pub use telemetry::init_tracing;
