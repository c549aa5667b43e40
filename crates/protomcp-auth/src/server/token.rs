//! `POST /token` — code and refresh-token grants (§4.6).

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, AuthResult};
use crate::pkce;
use crate::rate_limit::RateLimitKey;
use crate::server::registry::RegisteredClient;
use crate::server::token_store::{expires_at, IssuedToken, ACCESS_TOKEN_TTL};
use crate::server::AuthorizationServer;

/// Form body accepted by `/token`. Fields are a union of both grant
/// types; which ones apply depends on `grant_type`.
#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub grant_type: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub code_verifier: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub client_assertion: Option<String>,
    #[serde(default)]
    pub client_assertion_type: Option<String>,
}

/// `{ access_token, token_type, expires_in, refresh_token?, scope? }`.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Handle `POST /token`. Rate-limited at 50/15min (§4.6).
pub async fn token(
    State(state): State<AuthorizationServer>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    axum::extract::Form(request): axum::extract::Form<TokenRequest>,
) -> Response {
    if let Err(info) = state.rate_limiter.check(&RateLimitKey::ip(addr.ip().to_string()), "token") {
        return AuthError::RateLimited { retry_after_secs: info.retry_after.as_secs() }.into_response();
    }

    let result = match request.grant_type.as_str() {
        "authorization_code" => exchange_code(&state, request).await,
        "refresh_token" => exchange_refresh_token(&state, request).await,
        other => Err(AuthError::InvalidRequest(format!("unsupported grant_type \"{other}\""))),
    };

    match result {
        Ok(body) => {
            let mut headers = HeaderMap::new();
            headers.insert(axum::http::header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
            (headers, Json(body)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

async fn authenticate_client(state: &AuthorizationServer, request: &TokenRequest) -> AuthResult<RegisteredClient> {
    let client_id = request
        .client_id
        .clone()
        .ok_or_else(|| AuthError::InvalidClient("client_id is required".to_string()))?;
    let client = state
        .client_registry
        .get(&client_id)
        .await
        .ok_or_else(|| AuthError::InvalidClient("unknown client_id".to_string()))?;

    if client.is_public() {
        return Ok(client);
    }

    match client.token_endpoint_auth_method.as_str() {
        "client_secret_basic" | "client_secret_post" => {
            let presented = request
                .client_secret
                .as_deref()
                .ok_or_else(|| AuthError::InvalidClient("client_secret is required".to_string()))?;
            let expected = client
                .client_secret
                .as_deref()
                .ok_or_else(|| AuthError::ServerError("registered client has no stored secret".to_string()))?;
            if !constant_time_eq(presented, expected) {
                return Err(AuthError::InvalidClient("client authentication failed".to_string()));
            }
            Ok(client)
        }
        "private_key_jwt" => {
            verify_private_key_jwt(&client, request)?;
            Ok(client)
        }
        other => Err(AuthError::InvalidClient(format!("unsupported token_endpoint_auth_method \"{other}\""))),
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    use subtle::ConstantTimeEq;
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Verify a `private_key_jwt` client assertion (RFC 7523).
///
/// This verifies the assertion's signature and standard claims (`exp`,
/// `aud=token_endpoint`) as `HS256` against the client's registered
/// `client_secret`. It does not fetch or cache a `jwks_uri` document over
/// HTTP, so clients authenticating this way must pre-share an HMAC secret
/// as their `client_secret` rather than registering an RSA/EC key.
fn verify_private_key_jwt(client: &RegisteredClient, request: &TokenRequest) -> AuthResult<()> {
    use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

    let assertion = request
        .client_assertion
        .as_deref()
        .ok_or_else(|| AuthError::InvalidClient("client_assertion is required".to_string()))?;
    let secret = client
        .client_secret
        .as_deref()
        .ok_or_else(|| AuthError::ServerError("private_key_jwt requires an HMAC secret in this crate".to_string()))?;

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&["token_endpoint"]);
    decode::<serde_json::Value>(assertion, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map_err(|e| AuthError::InvalidClient(format!("client assertion verification failed: {e}")))?;
    Ok(())
}

async fn exchange_code(state: &AuthorizationServer, request: TokenRequest) -> AuthResult<TokenResponse> {
    let client = authenticate_client(state, &request).await?;

    let code = request.code.ok_or_else(|| AuthError::InvalidRequest("code is required".to_string()))?;
    let record = state
        .code_store
        .consume(&code)
        .await
        .ok_or_else(|| AuthError::InvalidGrant("code is invalid, expired, or already used".to_string()))?;

    if record.client_id != client.client_id {
        return Err(AuthError::InvalidGrant("code was not issued to this client".to_string()));
    }
    if Some(record.redirect_uri.as_str()) != request.redirect_uri.as_deref() {
        return Err(AuthError::InvalidGrant("redirect_uri does not match the authorization request".to_string()));
    }

    let verifier = request
        .code_verifier
        .ok_or_else(|| AuthError::InvalidGrant("code_verifier is required".to_string()))?;
    if !pkce::verify(&verifier, &record.code_challenge) {
        return Err(AuthError::InvalidGrant("code_verifier does not match code_challenge".to_string()));
    }

    let scopes = record.scope.clone().map(|s| s.split(' ').map(str::to_string).collect()).unwrap_or_default();
    mint_token_pair(state, &client.client_id, scopes, record.scope, record.resource).await
}

async fn exchange_refresh_token(state: &AuthorizationServer, request: TokenRequest) -> AuthResult<TokenResponse> {
    let client = authenticate_client(state, &request).await?;

    let refresh_token = request
        .refresh_token
        .ok_or_else(|| AuthError::InvalidRequest("refresh_token is required".to_string()))?;
    let record = state
        .token_store
        .lookup_refresh_token(&refresh_token)
        .await
        .ok_or_else(|| AuthError::InvalidGrant("refresh_token is invalid or revoked".to_string()))?;

    if record.client_id != client.client_id {
        return Err(AuthError::InvalidGrant("refresh_token was not issued to this client".to_string()));
    }

    let scope = request.scope.or_else(|| Some(record.scopes.join(" ")));
    let scopes = scope.clone().map(|s| s.split(' ').map(str::to_string).collect()).unwrap_or_default();
    mint_token_pair(state, &client.client_id, scopes, scope, record.resource).await
}

async fn mint_token_pair(
    state: &AuthorizationServer,
    client_id: &str,
    scopes: Vec<String>,
    scope: Option<String>,
    resource: Option<String>,
) -> AuthResult<TokenResponse> {
    let access_token = state
        .token_store
        .issue_access_token(IssuedToken {
            client_id: client_id.to_string(),
            scopes: scopes.clone(),
            expires_at: expires_at(ACCESS_TOKEN_TTL),
            resource: resource.clone(),
        })
        .await;

    let refresh_token = state
        .token_store
        .issue_refresh_token(IssuedToken {
            client_id: client_id.to_string(),
            scopes,
            expires_at: i64::MAX,
            resource,
        })
        .await;

    Ok(TokenResponse {
        access_token,
        token_type: "bearer",
        expires_in: ACCESS_TOKEN_TTL.as_secs(),
        refresh_token: Some(refresh_token),
        scope,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::code_store::AuthorizationCodeRecord;
    use crate::server::registry::now_unix;
    use std::time::Instant;

    async fn state_with_public_client() -> AuthorizationServer {
        let state = AuthorizationServer::in_memory("https://as.example", vec!["tools:call".to_string()]);
        state
            .client_registry
            .register(RegisteredClient {
                client_id: "client-1".to_string(),
                client_secret: None,
                redirect_uris: vec!["https://app.example/callback".to_string()],
                grant_types: vec!["authorization_code".to_string(), "refresh_token".to_string()],
                token_endpoint_auth_method: "none".to_string(),
                scope: None,
                client_name: None,
                jwks_uri: None,
                client_id_issued_at: now_unix(),
            })
            .await;
        state
    }

    #[tokio::test]
    async fn code_exchange_succeeds_with_matching_verifier() {
        let state = state_with_public_client().await;
        let pkce_pair = pkce::generate();
        let code = state
            .code_store
            .issue(AuthorizationCodeRecord {
                client_id: "client-1".to_string(),
                redirect_uri: "https://app.example/callback".to_string(),
                code_challenge: pkce_pair.challenge.clone(),
                scope: Some("tools:call".to_string()),
                resource: None,
                expires_at: Instant::now(),
            })
            .await;

        let request = TokenRequest {
            grant_type: "authorization_code".to_string(),
            code: Some(code),
            redirect_uri: Some("https://app.example/callback".to_string()),
            code_verifier: Some(pkce_pair.verifier),
            refresh_token: None,
            scope: None,
            client_id: Some("client-1".to_string()),
            client_secret: None,
            client_assertion: None,
            client_assertion_type: None,
        };

        let response = exchange_code(&state, request).await.expect("exchange succeeds");
        assert_eq!(response.token_type, "bearer");
        assert!(response.refresh_token.is_some());
    }

    #[tokio::test]
    async fn wrong_verifier_is_rejected() {
        let state = state_with_public_client().await;
        let pkce_pair = pkce::generate();
        let code = state
            .code_store
            .issue(AuthorizationCodeRecord {
                client_id: "client-1".to_string(),
                redirect_uri: "https://app.example/callback".to_string(),
                code_challenge: pkce_pair.challenge,
                scope: None,
                resource: None,
                expires_at: Instant::now(),
            })
            .await;

        let request = TokenRequest {
            grant_type: "authorization_code".to_string(),
            code: Some(code),
            redirect_uri: Some("https://app.example/callback".to_string()),
            code_verifier: Some("wrong-verifier".to_string()),
            refresh_token: None,
            scope: None,
            client_id: Some("client-1".to_string()),
            client_secret: None,
            client_assertion: None,
            client_assertion_type: None,
        };

        assert!(exchange_code(&state, request).await.is_err());
    }

    #[tokio::test]
    async fn refresh_token_mints_a_new_access_token() {
        let state = state_with_public_client().await;
        let refresh_token = state
            .token_store
            .issue_refresh_token(IssuedToken {
                client_id: "client-1".to_string(),
                scopes: vec!["tools:call".to_string()],
                expires_at: i64::MAX,
                resource: None,
            })
            .await;

        let request = TokenRequest {
            grant_type: "refresh_token".to_string(),
            code: None,
            redirect_uri: None,
            code_verifier: None,
            refresh_token: Some(refresh_token),
            scope: None,
            client_id: Some("client-1".to_string()),
            client_secret: None,
            client_assertion: None,
            client_assertion_type: None,
        };

        let response = exchange_refresh_token(&state, request).await.expect("refresh succeeds");
        assert!(!response.access_token.is_empty());
    }
}
