//! `GET|POST /authorize` — two-phase authorization request (§4.6).
//!
//! Phase 1 checks `client_id` and `redirect_uri` directly: we cannot
//! safely redirect the user-agent to a `redirect_uri` we haven't
//! validated, so failures here are a direct 400. Phase 2 validates
//! everything else and reports failure by redirecting back to
//! `redirect_uri` with an `error` query parameter, per RFC 6749 §4.1.2.1.
//! On success, phase 2 mints a one-time code bound to the PKCE challenge
//! and redirects with `code` and the caller's `state`.

use std::time::{Duration, Instant};

use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::error::AuthError;
use crate::pkce::CODE_CHALLENGE_METHOD;
use crate::server::code_store::AuthorizationCodeRecord;
use crate::server::AuthorizationServer;

/// Codes are valid for 10 minutes, per RFC 6749's recommendation.
const CODE_TTL: Duration = Duration::from_secs(600);

/// Query/form parameters accepted by `/authorize`.
#[derive(Debug, Deserialize, Clone)]
pub struct AuthorizeParams {
    pub response_type: Option<String>,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub resource: Option<String>,
}

/// `GET /authorize`.
pub async fn authorize_get(
    State(state): State<AuthorizationServer>,
    Query(params): Query<AuthorizeParams>,
) -> Response {
    authorize(&state, params).await
}

/// `POST /authorize`, same parameter set submitted as a form body.
pub async fn authorize_post(
    State(state): State<AuthorizationServer>,
    axum::extract::Form(params): axum::extract::Form<AuthorizeParams>,
) -> Response {
    authorize(&state, params).await
}

async fn authorize(state: &AuthorizationServer, params: AuthorizeParams) -> Response {
    // Phase 1: client_id and redirect_uri must be valid before we trust
    // redirect_uri enough to send errors there.
    let client = match state.client_registry.get(&params.client_id).await {
        Some(client) => client,
        None => return phase_one_error("unknown client_id"),
    };
    if !client.allows_redirect(&params.redirect_uri) {
        return phase_one_error("redirect_uri is not registered for this client");
    }

    // Phase 2: response_type and PKCE. Resource-owner consent is assumed
    // granted for the scopes requested — this crate has no interactive
    // consent UI, matching its role as protocol plumbing rather than a
    // full authorization-server product.
    match validate_phase_two(&params) {
        Ok(()) => match mint_code(state, &params).await {
            Ok(code) => redirect(&params.redirect_uri, &[("code", &code)], params.state.as_deref()),
            Err(err) => redirect_with_error(&params, &err),
        },
        Err(err) => redirect_with_error(&params, &err),
    }
}

fn validate_phase_two(params: &AuthorizeParams) -> Result<(), AuthError> {
    if params.response_type.as_deref() != Some("code") {
        return Err(AuthError::InvalidRequest("response_type must be \"code\"".to_string()));
    }
    if params.code_challenge.is_none() {
        return Err(AuthError::InvalidRequest("code_challenge is required".to_string()));
    }
    if params.code_challenge_method.as_deref() != Some(CODE_CHALLENGE_METHOD) {
        return Err(AuthError::InvalidRequest(format!(
            "code_challenge_method must be \"{CODE_CHALLENGE_METHOD}\""
        )));
    }
    Ok(())
}

async fn mint_code(state: &AuthorizationServer, params: &AuthorizeParams) -> Result<String, AuthError> {
    let code_challenge = params
        .code_challenge
        .clone()
        .ok_or_else(|| AuthError::InvalidRequest("code_challenge is required".to_string()))?;

    let code = state
        .code_store
        .issue(AuthorizationCodeRecord {
            client_id: params.client_id.clone(),
            redirect_uri: params.redirect_uri.clone(),
            code_challenge,
            scope: params.scope.clone(),
            resource: params.resource.clone(),
            expires_at: Instant::now() + CODE_TTL,
        })
        .await;
    Ok(code)
}

fn redirect_with_error(params: &AuthorizeParams, err: &AuthError) -> Response {
    redirect(
        &params.redirect_uri,
        &[("error", err.code()), ("error_description", &err.to_string())],
        params.state.as_deref(),
    )
}

fn redirect(redirect_uri: &str, pairs: &[(&str, &str)], state: Option<&str>) -> Response {
    let mut url =
        url::Url::parse(redirect_uri).unwrap_or_else(|_| url::Url::parse("about:blank").expect("always parses"));
    {
        let mut query = url.query_pairs_mut();
        for (key, value) in pairs {
            query.append_pair(key, value);
        }
        if let Some(state) = state {
            query.append_pair("state", state);
        }
    }

    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(url.as_str()) {
        headers.insert(axum::http::header::LOCATION, value);
    }
    (StatusCode::FOUND, headers).into_response()
}

fn phase_one_error(message: &str) -> Response {
    AuthError::InvalidRequest(message.to_string()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::registry::{now_unix, RegisteredClient};

    async fn state_with_client() -> AuthorizationServer {
        let state = AuthorizationServer::in_memory("https://as.example", vec!["tools:call".to_string()]);
        state
            .client_registry
            .register(RegisteredClient {
                client_id: "client-1".to_string(),
                client_secret: None,
                redirect_uris: vec!["https://app.example/callback".to_string()],
                grant_types: vec!["authorization_code".to_string()],
                token_endpoint_auth_method: "none".to_string(),
                scope: None,
                client_name: None,
                jwks_uri: None,
                client_id_issued_at: now_unix(),
            })
            .await;
        state
    }

    fn valid_params() -> AuthorizeParams {
        AuthorizeParams {
            response_type: Some("code".to_string()),
            client_id: "client-1".to_string(),
            redirect_uri: "https://app.example/callback".to_string(),
            scope: Some("tools:call".to_string()),
            state: Some("xyz".to_string()),
            code_challenge: Some("challenge".to_string()),
            code_challenge_method: Some("S256".to_string()),
            resource: None,
        }
    }

    #[tokio::test]
    async fn valid_request_mints_a_code_and_redirects() {
        let state = state_with_client().await;
        let response = authorize(&state, valid_params()).await;

        assert_eq!(response.status(), StatusCode::FOUND);
        let location =
            response.headers().get(axum::http::header::LOCATION).expect("redirect has Location").to_str().unwrap();
        assert!(location.contains("code="));
        assert!(location.contains("state=xyz"));
    }

    #[tokio::test]
    async fn unknown_client_is_a_direct_400() {
        let state = state_with_client().await;
        let mut params = valid_params();
        params.client_id = "nope".to_string();

        let response = authorize(&state, params).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unregistered_redirect_uri_is_a_direct_400() {
        let state = state_with_client().await;
        let mut params = valid_params();
        params.redirect_uri = "https://evil.example/callback".to_string();

        let response = authorize(&state, params).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_code_challenge_redirects_with_error() {
        let state = state_with_client().await;
        let mut params = valid_params();
        params.code_challenge = None;

        let response = authorize(&state, params).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        let location =
            response.headers().get(axum::http::header::LOCATION).expect("redirect has Location").to_str().unwrap();
        assert!(location.contains("error=invalid_request"));
    }

    #[tokio::test]
    async fn wrong_response_type_redirects_with_error() {
        let state = state_with_client().await;
        let mut params = valid_params();
        params.response_type = Some("token".to_string());

        let response = authorize(&state, params).await;
        let location =
            response.headers().get(axum::http::header::LOCATION).expect("redirect has Location").to_str().unwrap();
        assert!(location.contains("error=invalid_request"));
    }
}
