//! Bearer auth middleware for protected MCP endpoints (§4.8).
//!
//! An axum `from_fn_with_state` handler: parses the `Authorization`
//! header, verifies the token through a real [`OAuthTokenVerifier`] trait
//! object, and inserts the resulting [`TokenClaims`] into the request
//! extensions. A token minted by [`crate::server`]'s `/token` handler
//! round-trips through this middleware via `StoreBackedVerifier`.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use serde::{Deserialize, Serialize};

/// What a verified bearer token tells the server about its bearer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// The OAuth client this token was issued to.
    pub client_id: String,
    /// Scopes granted to this token.
    pub scopes: Vec<String>,
    /// Unix timestamp the token expires at.
    pub expires_at: i64,
    /// The resource (RFC 8707) this token is bound to, if any.
    pub resource: Option<String>,
}

impl TokenClaims {
    /// Whether `required` is a subset of this token's granted scopes.
    pub fn has_scopes(&self, required: &[String]) -> bool {
        required.iter().all(|s| self.scopes.iter().any(|g| g == s))
    }

    fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

/// Verifies an opaque bearer token string and yields its claims.
///
/// Implementations may check a local token store (access tokens minted by
/// [`crate::server::token`]) or an introspection endpoint for tokens from
/// an external AS.
#[async_trait]
pub trait OAuthTokenVerifier: Send + Sync {
    /// Verify `token`, returning its claims or `None` if it is unknown,
    /// revoked, or otherwise rejected at the verifier level (expiry is
    /// checked by the middleware itself, not the verifier).
    async fn verify(&self, token: &str) -> Option<TokenClaims>;
}

/// Shared configuration the middleware closes over.
#[derive(Clone)]
pub struct BearerAuthState {
    verifier: Arc<dyn OAuthTokenVerifier>,
    required_scopes: Arc<Vec<String>>,
    resource_metadata_url: Arc<String>,
}

impl BearerAuthState {
    /// Build middleware state. `resource_metadata_url` is echoed in the
    /// `WWW-Authenticate` challenge so a client's discovery flow (§4.7
    /// step 1) knows where to look next.
    pub fn new(
        verifier: Arc<dyn OAuthTokenVerifier>,
        required_scopes: Vec<String>,
        resource_metadata_url: impl Into<String>,
    ) -> Self {
        Self {
            verifier,
            required_scopes: Arc::new(required_scopes),
            resource_metadata_url: Arc::new(resource_metadata_url.into()),
        }
    }

    fn challenge(&self, error: &str) -> HeaderValue {
        let scope = self.required_scopes.join(" ");
        let value = format!(
            r#"Bearer error="{error}", scope="{scope}", resource_metadata="{}""#,
            self.resource_metadata_url
        );
        HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("Bearer"))
    }
}

/// `axum::middleware::from_fn_with_state`-compatible bearer check (§4.8
/// steps 1-5).
pub async fn require_bearer_auth(
    State(state): State<BearerAuthState>,
    mut request: Request,
    next: Next,
) -> Result<Response, Response> {
    let token = extract_bearer_token(&request).ok_or_else(|| unauthorized(&state, "invalid_token"))?;

    let claims = state
        .verifier
        .verify(token)
        .await
        .ok_or_else(|| unauthorized(&state, "invalid_token"))?;

    let now = chrono::Utc::now().timestamp();
    if claims.is_expired(now) {
        return Err(unauthorized(&state, "invalid_token"));
    }

    if !claims.has_scopes(&state.required_scopes) {
        return Err(forbidden(&state));
    }

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

fn extract_bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
}

fn unauthorized(state: &BearerAuthState, error: &str) -> Response {
    let mut response = Response::builder()
        .status(StatusCode::UNAUTHORIZED)
        .body(axum::body::Body::empty())
        .expect("static response is well-formed");
    response
        .headers_mut()
        .insert(axum::http::header::WWW_AUTHENTICATE, state.challenge(error));
    response
}

fn forbidden(state: &BearerAuthState) -> Response {
    let mut response = Response::builder()
        .status(StatusCode::FORBIDDEN)
        .body(axum::body::Body::empty())
        .expect("static response is well-formed");
    response
        .headers_mut()
        .insert(axum::http::header::WWW_AUTHENTICATE, state.challenge("insufficient_scope"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysValid(TokenClaims);

    #[async_trait]
    impl OAuthTokenVerifier for AlwaysValid {
        async fn verify(&self, _token: &str) -> Option<TokenClaims> {
            Some(self.0.clone())
        }
    }

    fn claims(scopes: &[&str], expires_at: i64) -> TokenClaims {
        TokenClaims {
            client_id: "client-1".to_string(),
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
            expires_at,
            resource: None,
        }
    }

    #[test]
    fn has_scopes_requires_every_scope_present() {
        let token = claims(&["tools:call", "resources:read"], i64::MAX);
        assert!(token.has_scopes(&["tools:call".to_string()]));
        assert!(!token.has_scopes(&["prompts:list".to_string()]));
    }

    #[test]
    fn expired_token_is_detected() {
        let token = claims(&["tools:call"], 0);
        assert!(token.is_expired(100));
        assert!(!token.is_expired(-100));
    }
}
