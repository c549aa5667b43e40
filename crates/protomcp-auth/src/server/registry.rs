//! Registered OAuth clients (RFC 7591 client records).
//!
//! `RegisteredClient` mirrors the `RegistrationResponse` wire shape; this
//! module owns the server-side record a `ClientRegistry` persists and
//! an `/authorize`/`/token` handler looks up by `client_id`.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use dashmap::DashMap;
use rand::RngCore;

/// A client registered via `/register` (or pre-provisioned out of band).
#[derive(Debug, Clone)]
pub struct RegisteredClient {
    /// Opaque client identifier, returned to the caller at registration.
    pub client_id: String,
    /// Present for confidential clients; `None` for `none`/public clients.
    pub client_secret: Option<String>,
    /// Redirect URIs this client is allowed to use at `/authorize`.
    pub redirect_uris: Vec<String>,
    /// Grant types this client may use at `/token`.
    pub grant_types: Vec<String>,
    /// How this client authenticates at `/token`.
    pub token_endpoint_auth_method: String,
    /// Space-separated scopes this client may request.
    pub scope: Option<String>,
    /// Human-readable name, echoed back in registration responses.
    pub client_name: Option<String>,
    /// `jwks_uri` for `private_key_jwt` client authentication, if any.
    pub jwks_uri: Option<String>,
    /// Unix timestamp the client was registered at.
    pub client_id_issued_at: u64,
}

impl RegisteredClient {
    /// Whether `redirect_uri` is one this client registered.
    pub fn allows_redirect(&self, redirect_uri: &str) -> bool {
        self.redirect_uris.iter().any(|u| u == redirect_uri)
    }

    /// Whether this client is a public client (no secret, `auth_method =
    /// none`) and therefore exempt from client-secret checks at `/token`.
    pub fn is_public(&self) -> bool {
        self.token_endpoint_auth_method == "none"
    }
}

/// Persists [`RegisteredClient`]s keyed by `client_id`.
#[async_trait]
pub trait ClientRegistry: Send + Sync {
    /// Persist a newly registered client.
    async fn register(&self, client: RegisteredClient);

    /// Look up a client by id.
    async fn get(&self, client_id: &str) -> Option<RegisteredClient>;
}

/// In-memory [`ClientRegistry`], matching [`crate::rate_limit::RateLimiter`]'s
/// `DashMap`-backed shape.
#[derive(Default)]
pub struct InMemoryClientRegistry {
    clients: DashMap<String, RegisteredClient>,
}

impl InMemoryClientRegistry {
    /// Build an empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Mint a fresh `client_id` (and, for confidential clients, a
    /// `client_secret`), 24 random bytes each, base64url-encoded.
    pub fn issue_credentials(confidential: bool) -> (String, Option<String>) {
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;
        use base64::Engine;

        let mut id_bytes = [0u8; 24];
        rand::thread_rng().fill_bytes(&mut id_bytes);
        let client_id = URL_SAFE_NO_PAD.encode(id_bytes);

        let client_secret = confidential.then(|| {
            let mut secret_bytes = [0u8; 32];
            rand::thread_rng().fill_bytes(&mut secret_bytes);
            URL_SAFE_NO_PAD.encode(secret_bytes)
        });

        (client_id, client_secret)
    }
}

#[async_trait]
impl ClientRegistry for InMemoryClientRegistry {
    async fn register(&self, client: RegisteredClient) {
        self.clients.insert(client.client_id.clone(), client);
    }

    async fn get(&self, client_id: &str) -> Option<RegisteredClient> {
        self.clients.get(client_id).map(|entry| entry.clone())
    }
}

/// Seconds since the Unix epoch, for `client_id_issued_at`/`expires_at`
/// fields that the OAuth wire formats require as integers.
pub fn now_unix() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(redirect: &str) -> RegisteredClient {
        RegisteredClient {
            client_id: "client-1".to_string(),
            client_secret: Some("secret".to_string()),
            redirect_uris: vec![redirect.to_string()],
            grant_types: vec!["authorization_code".to_string()],
            token_endpoint_auth_method: "client_secret_basic".to_string(),
            scope: Some("tools:call".to_string()),
            client_name: None,
            jwks_uri: None,
            client_id_issued_at: now_unix(),
        }
    }

    #[tokio::test]
    async fn register_then_lookup_round_trips() {
        let registry = InMemoryClientRegistry::new();
        registry.register(client("https://app.example/callback")).await;

        let found = registry.get("client-1").await.expect("client present");
        assert!(found.allows_redirect("https://app.example/callback"));
        assert!(!found.allows_redirect("https://evil.example/callback"));
    }

    #[tokio::test]
    async fn unknown_client_is_none() {
        let registry = InMemoryClientRegistry::new();
        assert!(registry.get("nope").await.is_none());
    }

    #[test]
    fn issued_credentials_are_unique() {
        let (id_a, secret_a) = InMemoryClientRegistry::issue_credentials(true);
        let (id_b, secret_b) = InMemoryClientRegistry::issue_credentials(true);
        assert_ne!(id_a, id_b);
        assert_ne!(secret_a, secret_b);

        let (_, public_secret) = InMemoryClientRegistry::issue_credentials(false);
        assert!(public_secret.is_none());
    }
}
