//! Transport error type.

use thiserror::Error;

/// Result alias for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors a [`crate::Transport`] implementation may report.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum TransportError {
    /// `send`/`start` was called before the transport finished connecting,
    /// or after it closed.
    #[error("transport is not open: {0}")]
    NotOpen(String),

    /// The transport failed to establish its underlying connection.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// Writing a message to the peer failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// A frame could not be parsed as a JSON-RPC message. Per §4.1 this is
    /// reported but does not close the transport unless `fatal` is set.
    #[error("malformed frame: {0}")]
    MalformedFrame {
        /// Description of what was wrong with the frame.
        reason: String,
        /// Whether this error is unrecoverable and the transport must close.
        fatal: bool,
    },

    /// The peer closed the connection or the transport's own I/O source
    /// reached EOF.
    #[error("connection closed: {0}")]
    Closed(String),

    /// Underlying I/O failure.
    #[error("io error: {0}")]
    Io(String),
}

impl TransportError {
    /// `reason` string, ignoring whether the failure was fatal — used by
    /// callers of [`MalformedFrame`](TransportError::MalformedFrame) that
    /// don't need to branch on fatality.
    pub fn reason(&self) -> String {
        match self {
            Self::MalformedFrame { reason, .. } => reason.clone(),
            other => other.to_string(),
        }
    }

    /// `true` if receiving this error should trigger `on_close`.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::MalformedFrame { fatal, .. } => *fatal,
            Self::NotOpen(_) => false,
            _ => true,
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedFrame {
            reason: err.to_string(),
            fatal: false,
        }
    }
}
