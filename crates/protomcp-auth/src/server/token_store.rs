//! Issued access/refresh tokens and the [`OAuthTokenVerifier`] that lets
//! [`crate::bearer`] check them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use rand::RngCore;

use crate::bearer::{OAuthTokenVerifier, TokenClaims};
use crate::server::registry::now_unix;

/// One access token's metadata, plus the refresh token (if any) minted
/// alongside it.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The client this token was issued to.
    pub client_id: String,
    /// Granted scopes.
    pub scopes: Vec<String>,
    /// Unix timestamp of expiry.
    pub expires_at: i64,
    /// RFC 8707 resource indicator this token is bound to, if any.
    pub resource: Option<String>,
}

/// Persists minted access tokens (and their paired refresh tokens) so the
/// bearer middleware and the `/token` refresh grant can both look them up.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Mint and store a new access token, returning the opaque token
    /// string handed to the client.
    async fn issue_access_token(&self, record: IssuedToken) -> String;

    /// Look up an access token's record, if it exists (expiry is not
    /// checked here — callers enforce it, matching §4.8 step 3).
    async fn lookup_access_token(&self, token: &str) -> Option<IssuedToken>;

    /// Revoke an access token. Idempotent (RFC 7009).
    async fn revoke_access_token(&self, token: &str);

    /// Mint a refresh token bound to the same client/scope/resource,
    /// returning the opaque refresh token string.
    async fn issue_refresh_token(&self, record: IssuedToken) -> String;

    /// Redeem a refresh token for its record without consuming it —
    /// refresh tokens in this store are reusable until revoked.
    async fn lookup_refresh_token(&self, token: &str) -> Option<IssuedToken>;

    /// Revoke a refresh token. Idempotent (RFC 7009).
    async fn revoke_refresh_token(&self, token: &str);
}

/// In-memory [`TokenStore`].
#[derive(Default)]
pub struct InMemoryTokenStore {
    access_tokens: DashMap<String, IssuedToken>,
    refresh_tokens: DashMap<String, IssuedToken>,
}

impl InMemoryTokenStore {
    /// Build an empty store.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn generate_token() -> String {
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;
        use base64::Engine;

        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn issue_access_token(&self, record: IssuedToken) -> String {
        let token = Self::generate_token();
        self.access_tokens.insert(token.clone(), record);
        token
    }

    async fn lookup_access_token(&self, token: &str) -> Option<IssuedToken> {
        self.access_tokens.get(token).map(|entry| entry.clone())
    }

    async fn revoke_access_token(&self, token: &str) {
        self.access_tokens.remove(token);
    }

    async fn issue_refresh_token(&self, record: IssuedToken) -> String {
        let token = Self::generate_token();
        self.refresh_tokens.insert(token.clone(), record);
        token
    }

    async fn lookup_refresh_token(&self, token: &str) -> Option<IssuedToken> {
        self.refresh_tokens.get(token).map(|entry| entry.clone())
    }

    async fn revoke_refresh_token(&self, token: &str) {
        self.refresh_tokens.remove(token);
    }
}

/// Standard access token lifetime (§4.6 `expires_in`), one hour.
pub const ACCESS_TOKEN_TTL: Duration = Duration::from_secs(3600);

/// Bridges a [`TokenStore`] into the [`OAuthTokenVerifier`] the bearer
/// middleware expects, so a token minted here round-trips through it.
pub struct StoreBackedVerifier {
    store: Arc<dyn TokenStore>,
}

impl StoreBackedVerifier {
    /// Wrap `store` as a verifier.
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl OAuthTokenVerifier for StoreBackedVerifier {
    async fn verify(&self, token: &str) -> Option<TokenClaims> {
        let record = self.store.lookup_access_token(token).await?;
        Some(TokenClaims {
            client_id: record.client_id,
            scopes: record.scopes,
            expires_at: record.expires_at,
            resource: record.resource,
        })
    }
}

/// `expires_at` for a token minted now with lifetime `ttl`.
pub fn expires_at(ttl: Duration) -> i64 {
    now_unix() as i64 + ttl.as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> IssuedToken {
        IssuedToken {
            client_id: "client-1".to_string(),
            scopes: vec!["tools:call".to_string()],
            expires_at: expires_at(ACCESS_TOKEN_TTL),
            resource: None,
        }
    }

    #[tokio::test]
    async fn issued_access_token_is_verifiable() {
        let store = InMemoryTokenStore::new();
        let token = store.issue_access_token(record()).await;

        let verifier = StoreBackedVerifier::new(store.clone());
        let claims = verifier.verify(&token).await.expect("token present");
        assert_eq!(claims.client_id, "client-1");
    }

    #[tokio::test]
    async fn revoked_access_token_is_not_verifiable() {
        let store = InMemoryTokenStore::new();
        let token = store.issue_access_token(record()).await;
        store.revoke_access_token(&token).await;

        let verifier = StoreBackedVerifier::new(store.clone());
        assert!(verifier.verify(&token).await.is_none());
    }

    #[tokio::test]
    async fn refresh_tokens_are_reusable_until_revoked() {
        let store = InMemoryTokenStore::new();
        let token = store.issue_refresh_token(record()).await;

        assert!(store.lookup_refresh_token(&token).await.is_some());
        assert!(store.lookup_refresh_token(&token).await.is_some());

        store.revoke_refresh_token(&token).await;
        assert!(store.lookup_refresh_token(&token).await.is_none());
    }
}
