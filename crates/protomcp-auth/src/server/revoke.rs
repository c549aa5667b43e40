//! `POST /revoke` — best-effort token revocation (RFC 7009).

use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;

use crate::server::AuthorizationServer;

/// `/revoke` form body. `token_type_hint`, if present, is advisory only —
/// we check both stores regardless, matching RFC 7009 §2.1's guidance
/// that servers SHOULD check the other store if the hinted one misses.
#[derive(Debug, Deserialize)]
pub struct RevokeRequest {
    pub token: String,
    #[serde(default)]
    pub token_type_hint: Option<String>,
}

/// Handle `POST /revoke`. Always returns 200, even for an unknown token
/// (RFC 7009 §2.2) — revocation must not leak whether a token exists.
pub async fn revoke(
    State(state): State<AuthorizationServer>,
    axum::extract::Form(request): axum::extract::Form<RevokeRequest>,
) -> StatusCode {
    state.token_store.revoke_access_token(&request.token).await;
    state.token_store.revoke_refresh_token(&request.token).await;
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::token_store::IssuedToken;
    use axum::extract::Form;

    #[tokio::test]
    async fn revoking_an_access_token_makes_it_unverifiable() {
        let state = AuthorizationServer::in_memory("https://as.example", vec!["tools:call".to_string()]);
        let token = state
            .token_store
            .issue_access_token(IssuedToken {
                client_id: "client-1".to_string(),
                scopes: vec!["tools:call".to_string()],
                expires_at: i64::MAX,
                resource: None,
            })
            .await;

        assert!(state.token_store.lookup_access_token(&token).await.is_some());

        revoke(State(state.clone()), Form(RevokeRequest { token: token.clone(), token_type_hint: None })).await;

        assert!(state.token_store.lookup_access_token(&token).await.is_none());
    }

    #[tokio::test]
    async fn revoking_an_unknown_token_still_returns_200() {
        let state = AuthorizationServer::in_memory("https://as.example", vec![]);
        let status =
            revoke(State(state), Form(RevokeRequest { token: "nope".to_string(), token_type_hint: None })).await;
        assert_eq!(status, StatusCode::OK);
    }
}
