//! Error types and the OAuth wire error shape (§4.6 "error shapes").

use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Result alias used throughout this crate.
pub type AuthResult<T> = Result<T, AuthError>;

/// Failures raised by the authorization server handlers, the client state
/// machine, and the bearer middleware.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum AuthError {
    /// The request was malformed (bad `redirect_uri`, missing parameter, …).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// `client_id` is unknown or `redirect_uri` doesn't match the
    /// registered client.
    #[error("invalid client: {0}")]
    InvalidClient(String),

    /// PKCE, code, or credential verification failed.
    #[error("invalid grant: {0}")]
    InvalidGrant(String),

    /// The requested scope exceeds what the client/token is permitted.
    #[error("invalid scope: {0}")]
    InvalidScope(String),

    /// No bearer token present, or the token is expired/malformed.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// Token is valid but lacks a required scope.
    #[error("insufficient scope: {0}")]
    InsufficientScope(String),

    /// Too many requests against a rate-limited endpoint.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds until the caller may retry.
        retry_after_secs: u64,
    },

    /// The code store, client registry, or an upstream HTTP call failed.
    #[error("server error: {0}")]
    ServerError(String),
}

impl AuthError {
    /// The OAuth `error` code for this failure (RFC 6749 §5.2).
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::InvalidClient(_) => "invalid_client",
            Self::InvalidGrant(_) => "invalid_grant",
            Self::InvalidScope(_) => "invalid_scope",
            Self::InvalidToken(_) => "invalid_token",
            Self::InsufficientScope(_) => "insufficient_scope",
            Self::RateLimited { .. } => "too_many_requests",
            Self::ServerError(_) => "server_error",
        }
    }

    /// The HTTP status this error maps to.
    pub fn status(&self) -> http::StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::InvalidGrant(_) | Self::InvalidScope(_) => {
                http::StatusCode::BAD_REQUEST
            }
            Self::InvalidClient(_) | Self::InvalidToken(_) => http::StatusCode::UNAUTHORIZED,
            Self::InsufficientScope(_) => http::StatusCode::FORBIDDEN,
            Self::RateLimited { .. } => http::StatusCode::TOO_MANY_REQUESTS,
            Self::ServerError(_) => http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Render as the OAuth `{ error, error_description }` body (§4.6).
    pub fn to_body(&self) -> OAuthErrorBody {
        OAuthErrorBody {
            error: self.code().to_string(),
            error_description: Some(self.to_string()),
            error_uri: None,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.to_body())).into_response()
    }
}

/// The wire shape every OAuth endpoint in this crate reports errors with.
#[derive(Debug, Clone, Serialize)]
pub struct OAuthErrorBody {
    /// One of the fixed RFC 6749 §5.2 error codes.
    pub error: String,
    /// Human-readable detail; not meant to be parsed by clients.
    pub error_description: Option<String>,
    /// Optional link to documentation about the error.
    pub error_uri: Option<String>,
}
