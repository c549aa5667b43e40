//! OAuth 2.1 authorization server handlers, client state machine, and
//! bearer-token middleware (§4.6, §4.7, §4.8).
//!
//! This crate is self-contained with respect to `protomcp-protocol`: it
//! exchanges plain HTTP with an authorization server and produces/verifies
//! bearer tokens. [`bearer::require_bearer_auth`] is the seam a
//! `protomcp-http` deployment layers in front of its `/mcp` route to make
//! it a protected resource.

#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]
#![deny(unsafe_code)]

pub mod bearer;
pub mod client;
pub mod error;
pub mod metadata;
pub mod pkce;
pub mod rate_limit;
pub mod server;

pub use bearer::{require_bearer_auth, BearerAuthState, OAuthTokenVerifier, TokenClaims};
pub use error::{AuthError, AuthResult, OAuthErrorBody};
pub use metadata::{AuthorizationServerMetadata, ProtectedResourceMetadata};
