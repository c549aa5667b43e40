//! OAuth 2.1 authorization server handlers (§4.6).
//!
//! `AuthorizationServer` is the shared state every handler closes over,
//! matching the `ServerState` pattern in `protomcp-http::router`: a small
//! struct of `Arc<dyn Trait>` seams plus configuration, cloned cheaply
//! per request via axum's `State` extractor.

mod authorize;
mod code_store;
mod registration;
mod registry;
mod revoke;
mod token;
mod token_store;

pub use authorize::{authorize_get, authorize_post, AuthorizeParams};
pub use code_store::{AuthorizationCodeRecord, CodeStore, InMemoryCodeStore};
pub use registration::{register, RegistrationRequest, RegistrationResponse};
pub use registry::{now_unix, ClientRegistry, InMemoryClientRegistry, RegisteredClient};
pub use revoke::revoke;
pub use token::token;
pub use token_store::{
    expires_at, IssuedToken, InMemoryTokenStore, StoreBackedVerifier, TokenStore, ACCESS_TOKEN_TTL,
};

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::metadata::{AuthorizationServerMetadata, ProtectedResourceMetadata};
use crate::rate_limit::RateLimiter;

/// Shared state for the OAuth 2.1 authorization server handlers.
///
/// Cheap to clone: every field is an `Arc`. Construct once per server and
/// pass to [`router`]. This struct also answers as the protected
/// resource's own metadata document (§4.6 `/.well-known/oauth-protected-resource`):
/// the bearer challenge a resource server emits on a bare `/mcp` request
/// names this AS as the place to complete discovery, so the two documents
/// are served from the same state.
#[derive(Clone)]
pub struct AuthorizationServer {
    /// This AS's own issuer URL, no trailing slash.
    pub issuer: Arc<String>,
    /// Scopes this AS is willing to grant.
    pub scopes_supported: Arc<Vec<String>>,
    pub(crate) client_registry: Arc<dyn ClientRegistry>,
    pub(crate) code_store: Arc<dyn CodeStore>,
    pub(crate) token_store: Arc<dyn TokenStore>,
    pub(crate) rate_limiter: Arc<RateLimiter>,
    resource: Arc<String>,
    resource_authorization_servers: Arc<Vec<String>>,
}

impl AuthorizationServer {
    /// Build an authorization server backed by the in-memory stores, with
    /// the rate limits named in §4.6. The protected resource identifier
    /// defaults to `issuer` itself, delegating to `issuer` as its own
    /// authorization server; override with [`Self::with_resource`] when
    /// the resource server is a distinct URL.
    pub fn in_memory(issuer: impl Into<String>, scopes_supported: Vec<String>) -> Self {
        let issuer = issuer.into();
        Self {
            resource: Arc::new(issuer.clone()),
            resource_authorization_servers: Arc::new(vec![issuer.clone()]),
            issuer: Arc::new(issuer),
            scopes_supported: Arc::new(scopes_supported),
            client_registry: InMemoryClientRegistry::new(),
            code_store: InMemoryCodeStore::new(std::time::Duration::from_secs(600)),
            token_store: InMemoryTokenStore::new(),
            rate_limiter: Arc::new(RateLimiter::for_oauth_server()),
        }
    }

    /// Build with explicit store implementations, e.g. to back the
    /// authorization server with a persistent database.
    pub fn new(
        issuer: impl Into<String>,
        scopes_supported: Vec<String>,
        client_registry: Arc<dyn ClientRegistry>,
        code_store: Arc<dyn CodeStore>,
        token_store: Arc<dyn TokenStore>,
    ) -> Self {
        let issuer = issuer.into();
        Self {
            resource: Arc::new(issuer.clone()),
            resource_authorization_servers: Arc::new(vec![issuer.clone()]),
            issuer: Arc::new(issuer),
            scopes_supported: Arc::new(scopes_supported),
            client_registry,
            code_store,
            token_store,
            rate_limiter: Arc::new(RateLimiter::for_oauth_server()),
        }
    }

    /// Override the protected-resource identifier and the authorization
    /// servers it delegates to, when they differ from `issuer`.
    pub fn with_resource(mut self, resource: impl Into<String>, authorization_servers: Vec<String>) -> Self {
        self.resource = Arc::new(resource.into());
        self.resource_authorization_servers = Arc::new(authorization_servers);
        self
    }

    fn metadata(&self) -> AuthorizationServerMetadata {
        AuthorizationServerMetadata::new(self.issuer.as_str(), self.scopes_supported.as_ref().clone())
    }

    fn protected_resource_metadata(&self) -> ProtectedResourceMetadata {
        ProtectedResourceMetadata::new(
            self.resource.as_str(),
            self.resource_authorization_servers.as_ref().clone(),
            self.scopes_supported.as_ref().clone(),
        )
    }
}

async fn authorization_server_metadata(
    axum::extract::State(state): axum::extract::State<AuthorizationServer>,
) -> axum::Json<AuthorizationServerMetadata> {
    axum::Json(state.metadata())
}

async fn protected_resource_metadata(
    axum::extract::State(state): axum::extract::State<AuthorizationServer>,
) -> axum::Json<ProtectedResourceMetadata> {
    axum::Json(state.protected_resource_metadata())
}

/// Build the `/register`, `/authorize`, `/token`, `/revoke`, and
/// `/.well-known/*` routes, ready to `.merge()` into the MCP server's
/// router.
pub fn router(state: AuthorizationServer) -> Router {
    Router::new()
        .route("/.well-known/oauth-authorization-server", get(authorization_server_metadata))
        .route("/.well-known/oauth-protected-resource", get(protected_resource_metadata))
        .route("/register", post(register))
        .route("/authorize", get(authorize_get).post(authorize_post))
        .route("/token", post(token))
        .route("/revoke", post(revoke))
        .with_state(state)
}
