//! Authorization-server and protected-resource metadata documents
//! (RFC 8414 / RFC 9728), served from `/.well-known/*` (§4.6).

use serde::{Deserialize, Serialize};

/// `GET /.well-known/oauth-authorization-server` body (RFC 8414).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationServerMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub registration_endpoint: String,
    pub revocation_endpoint: String,
    pub scopes_supported: Vec<String>,
    pub response_types_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub code_challenge_methods_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
}

impl AuthorizationServerMetadata {
    /// Build the metadata document for an AS rooted at `issuer` (no
    /// trailing slash), advertising `scopes`.
    pub fn new(issuer: impl Into<String>, scopes: Vec<String>) -> Self {
        let issuer = issuer.into();
        Self {
            authorization_endpoint: format!("{issuer}/authorize"),
            token_endpoint: format!("{issuer}/token"),
            registration_endpoint: format!("{issuer}/register"),
            revocation_endpoint: format!("{issuer}/revoke"),
            issuer,
            scopes_supported: scopes,
            response_types_supported: vec!["code".to_string()],
            grant_types_supported: vec!["authorization_code".to_string(), "refresh_token".to_string()],
            code_challenge_methods_supported: vec![crate::pkce::CODE_CHALLENGE_METHOD.to_string()],
            token_endpoint_auth_methods_supported: vec![
                "client_secret_basic".to_string(),
                "client_secret_post".to_string(),
                "none".to_string(),
                "private_key_jwt".to_string(),
            ],
        }
    }
}

/// `GET /.well-known/oauth-protected-resource` body (RFC 9728).
#[derive(Debug, Clone, Serialize)]
pub struct ProtectedResourceMetadata {
    pub resource: String,
    pub authorization_servers: Vec<String>,
    pub scopes_supported: Vec<String>,
    pub bearer_methods_supported: Vec<String>,
}

impl ProtectedResourceMetadata {
    /// Build the metadata document for a resource server at `resource`,
    /// delegating authorization to `authorization_servers`.
    pub fn new(resource: impl Into<String>, authorization_servers: Vec<String>, scopes: Vec<String>) -> Self {
        Self {
            resource: resource.into(),
            authorization_servers,
            scopes_supported: scopes,
            bearer_methods_supported: vec!["header".to_string()],
        }
    }
}
