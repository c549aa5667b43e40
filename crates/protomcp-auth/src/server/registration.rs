//! `POST /register` — RFC 7591 Dynamic Client Registration.

use axum::extract::{ConnectInfo, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::error::{AuthError, AuthResult};
use crate::rate_limit::RateLimitKey;
use crate::server::registry::{now_unix, InMemoryClientRegistry, RegisteredClient};
use crate::server::AuthorizationServer;

/// Client metadata submitted to `/register` (RFC 7591 §2).
#[derive(Debug, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub redirect_uris: Vec<String>,
    #[serde(default)]
    pub token_endpoint_auth_method: Option<String>,
    #[serde(default)]
    pub grant_types: Option<Vec<String>>,
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub jwks_uri: Option<String>,
}

/// `/register` response (RFC 7591 §3.2).
#[derive(Debug, Serialize, Deserialize)]
pub struct RegistrationResponse {
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    pub client_id_issued_at: u64,
    pub redirect_uris: Vec<String>,
    pub token_endpoint_auth_method: String,
    pub grant_types: Vec<String>,
}

/// Handle `POST /register`. Rate-limited at 20/hour/IP (§4.6).
pub async fn register(
    State(state): State<AuthorizationServer>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(request): Json<RegistrationRequest>,
) -> Result<(axum::http::StatusCode, Json<RegistrationResponse>), AuthError> {
    state
        .rate_limiter
        .check(&RateLimitKey::ip(addr.ip().to_string()), "register")
        .map_err(|info| AuthError::RateLimited { retry_after_secs: info.retry_after.as_secs() })?;

    let response = register_client(&state, request).await?;
    Ok((axum::http::StatusCode::CREATED, Json(response)))
}

async fn register_client(
    state: &AuthorizationServer,
    request: RegistrationRequest,
) -> AuthResult<RegistrationResponse> {
    if request.redirect_uris.is_empty() {
        return Err(AuthError::InvalidRequest("redirect_uris must not be empty".to_string()));
    }

    let auth_method = request.token_endpoint_auth_method.unwrap_or_else(|| "client_secret_basic".to_string());
    let confidential = auth_method != "none";
    let (client_id, client_secret) = InMemoryClientRegistry::issue_credentials(confidential);

    let grant_types =
        request.grant_types.unwrap_or_else(|| vec!["authorization_code".to_string(), "refresh_token".to_string()]);

    let client = RegisteredClient {
        client_id: client_id.clone(),
        client_secret: client_secret.clone(),
        redirect_uris: request.redirect_uris.clone(),
        grant_types: grant_types.clone(),
        token_endpoint_auth_method: auth_method.clone(),
        scope: request.scope,
        client_name: request.client_name,
        jwks_uri: request.jwks_uri,
        client_id_issued_at: now_unix(),
    };
    let issued_at = client.client_id_issued_at;
    state.client_registry.register(client).await;

    Ok(RegistrationResponse {
        client_id,
        client_secret,
        client_id_issued_at: issued_at,
        redirect_uris: request.redirect_uris,
        token_endpoint_auth_method: auth_method,
        grant_types,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn confidential_registration_issues_a_secret() {
        let state = AuthorizationServer::in_memory("https://as.example", vec!["tools:call".to_string()]);
        let request = RegistrationRequest {
            redirect_uris: vec!["https://app.example/callback".to_string()],
            token_endpoint_auth_method: Some("client_secret_basic".to_string()),
            grant_types: None,
            client_name: Some("Test Client".to_string()),
            scope: None,
            jwks_uri: None,
        };

        let response = register_client(&state, request).await.expect("registration succeeds");
        assert!(response.client_secret.is_some());

        let stored = state.client_registry.get(&response.client_id).await.expect("client stored");
        assert!(stored.allows_redirect("https://app.example/callback"));
    }

    #[tokio::test]
    async fn public_client_gets_no_secret() {
        let state = AuthorizationServer::in_memory("https://as.example", vec!["tools:call".to_string()]);
        let request = RegistrationRequest {
            redirect_uris: vec!["myapp://callback".to_string()],
            token_endpoint_auth_method: Some("none".to_string()),
            grant_types: None,
            client_name: None,
            scope: None,
            jwks_uri: None,
        };

        let response = register_client(&state, request).await.expect("registration succeeds");
        assert!(response.client_secret.is_none());
    }

    #[tokio::test]
    async fn empty_redirect_uris_is_rejected() {
        let state = AuthorizationServer::in_memory("https://as.example", vec![]);
        let request = RegistrationRequest {
            redirect_uris: vec![],
            token_endpoint_auth_method: None,
            grant_types: None,
            client_name: None,
            scope: None,
            jwks_uri: None,
        };

        assert!(register_client(&state, request).await.is_err());
    }
}
