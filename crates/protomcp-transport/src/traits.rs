//! The core [`Transport`] trait and its lifecycle-event sink.

use async_trait::async_trait;

use crate::error::TransportResult;
use crate::types::{MessageExtra, SendOptions, TransportMessage};

/// Receives lifecycle callbacks from a [`Transport`].
///
/// Registered once at construction (not per-call), matching
/// `onmessage`/`onerror`/`onclose` in the distilled spec. Implementations
/// MUST NOT block for long inside these callbacks; they run on whatever
/// task is driving the transport's read loop.
#[async_trait]
pub trait TransportEventSink: Send + Sync {
    /// A complete frame arrived from the peer.
    async fn on_message(&self, message: TransportMessage, extra: MessageExtra);

    /// A non-fatal error occurred (malformed frame, etc). The transport
    /// remains open unless the error is marked fatal (see
    /// [`crate::TransportError::is_fatal`]).
    async fn on_error(&self, error: crate::TransportError);

    /// The transport closed. Called exactly once, even if closed by both
    /// an I/O error and an explicit `close()` racing each other.
    async fn on_close(&self);
}

/// Moves one JSON-RPC message at a time between two peers and signals
/// lifecycle events through a registered [`TransportEventSink`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Register the sink that receives `on_message`/`on_error`/`on_close`
    /// callbacks. Called once by `Protocol::connect` before `start`.
    fn set_event_sink(&self, sink: std::sync::Arc<dyn TransportEventSink>);

    /// Prepare I/O; may block until a connection is established. Calling
    /// `start` twice without an intervening `close` is an error.
    async fn start(&self) -> TransportResult<()>;

    /// Deliver one message to the peer. Fails loudly
    /// ([`crate::TransportError::NotOpen`]) if the transport has not been
    /// started or has already closed.
    async fn send(&self, message: TransportMessage, opts: SendOptions) -> TransportResult<()>;

    /// Terminate the transport. Must invoke the registered sink's
    /// `on_close` exactly once; safe to call more than once.
    async fn close(&self) -> TransportResult<()>;

    /// `true` once `start` has completed and before `close` runs.
    fn is_open(&self) -> bool;
}
