//! One-time authorization codes (§4.6 `/authorize` → `/token` handoff).
//!
//! An opaque code mapped to a persisted record, consumed exactly once —
//! `consume` always removes the record, whether or not it had expired.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use rand::RngCore;

/// What a minted authorization code is bound to, checked again at
/// `/token` before the code is exchanged for tokens.
#[derive(Debug, Clone)]
pub struct AuthorizationCodeRecord {
    /// The client the code was issued to.
    pub client_id: String,
    /// Must match exactly at `/token` (RFC 6749 §4.1.3).
    pub redirect_uri: String,
    /// PKCE `S256` challenge presented at `/authorize`.
    pub code_challenge: String,
    /// Scopes granted by the resource owner.
    pub scope: Option<String>,
    /// RFC 8707 resource indicator, if the client requested one.
    pub resource: Option<String>,
    /// When this code expires; authorization codes are short-lived.
    pub expires_at: Instant,
}

impl AuthorizationCodeRecord {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Persists one-time authorization codes.
///
/// Implementations MUST remove a code on `consume`, even if its record is
/// expired — codes are single-use regardless of whether they were ever
/// valid at redemption time.
#[async_trait]
pub trait CodeStore: Send + Sync {
    /// Mint and store a fresh code for `record`, returning the code value.
    async fn issue(&self, record: AuthorizationCodeRecord) -> String;

    /// Redeem `code`, returning its record unless it was never issued,
    /// already consumed, or expired.
    async fn consume(&self, code: &str) -> Option<AuthorizationCodeRecord>;
}

/// In-memory [`CodeStore`] with a fixed validity window.
pub struct InMemoryCodeStore {
    codes: DashMap<String, AuthorizationCodeRecord>,
    ttl: Duration,
}

impl InMemoryCodeStore {
    /// Build a store whose codes expire after `ttl` (RFC 6749 recommends
    /// 10 minutes or less).
    pub fn new(ttl: Duration) -> Arc<Self> {
        Arc::new(Self { codes: DashMap::new(), ttl })
    }

    fn generate_code() -> String {
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;
        use base64::Engine;

        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }
}

#[async_trait]
impl CodeStore for InMemoryCodeStore {
    async fn issue(&self, mut record: AuthorizationCodeRecord) -> String {
        record.expires_at = Instant::now() + self.ttl;
        let code = Self::generate_code();
        self.codes.insert(code.clone(), record);
        code
    }

    async fn consume(&self, code: &str) -> Option<AuthorizationCodeRecord> {
        let (_, record) = self.codes.remove(code)?;
        if record.is_expired() {
            return None;
        }
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> AuthorizationCodeRecord {
        AuthorizationCodeRecord {
            client_id: "client-1".to_string(),
            redirect_uri: "https://app.example/callback".to_string(),
            code_challenge: "challenge".to_string(),
            scope: Some("tools:call".to_string()),
            resource: None,
            expires_at: Instant::now(),
        }
    }

    #[tokio::test]
    async fn issue_then_consume_round_trips_once() {
        let store = InMemoryCodeStore::new(Duration::from_secs(600));
        let code = store.issue(record()).await;

        let consumed = store.consume(&code).await.expect("code present");
        assert_eq!(consumed.client_id, "client-1");
        assert!(store.consume(&code).await.is_none());
    }

    #[tokio::test]
    async fn unknown_code_is_none() {
        let store = InMemoryCodeStore::new(Duration::from_secs(600));
        assert!(store.consume("nope").await.is_none());
    }

    #[tokio::test]
    async fn expired_code_is_rejected() {
        let store = InMemoryCodeStore::new(Duration::from_millis(5));
        let code = store.issue(record()).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(store.consume(&code).await.is_none());
    }
}
