//! Error type for the streamable HTTP transport.

use thiserror::Error;

/// Result alias used throughout this crate.
pub type HttpTransportResult<T> = Result<T, HttpTransportError>;

/// Errors surfaced by the streamable HTTP transport.
///
/// Variants map to HTTP status codes at the router boundary (see
/// `router::status_for`), mirroring §4.5 and §7's mapping of internal
/// failure categories onto observable wire shapes.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum HttpTransportError {
    /// The request carried no `Mcp-Session-Id` (or an unknown one) while
    /// the server runs in stateful mode.
    #[error("unknown or missing session: {0}")]
    UnknownSession(String),

    /// The request body was not a well-formed JSON-RPC message or batch.
    #[error("malformed request body: {0}")]
    MalformedBody(String),

    /// A stream handle could not be found for the given request id.
    #[error("no active stream for request {0}")]
    StreamNotFound(String),

    /// The stream's bounded output queue is full; the client is not
    /// reading fast enough.
    #[error("stream backpressure exceeded for request {0}")]
    Backpressure(String),

    /// The underlying session or event store failed.
    #[error("store error: {0}")]
    Store(String),

    /// Unclassified internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl HttpTransportError {
    /// The HTTP status this error should be reported as by the router.
    pub fn status(&self) -> http::StatusCode {
        match self {
            Self::UnknownSession(_) => http::StatusCode::NOT_FOUND,
            Self::MalformedBody(_) => http::StatusCode::BAD_REQUEST,
            Self::StreamNotFound(_) => http::StatusCode::NOT_FOUND,
            Self::Backpressure(_) => http::StatusCode::SERVICE_UNAVAILABLE,
            Self::Store(_) | Self::Internal(_) => http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
