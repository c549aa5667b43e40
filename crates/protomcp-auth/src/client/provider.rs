//! The persistence seam an [`crate::client::state_machine::OAuthClientStateMachine`]
//! drives (§4.7 "Rust shape").

use async_trait::async_trait;

/// Tokens held by a client after a successful exchange or refresh.
#[derive(Debug, Clone)]
pub struct TokenSet {
    /// Bearer token sent on subsequent requests.
    pub access_token: String,
    /// Used to mint a new `access_token` without re-authorizing.
    pub refresh_token: Option<String>,
    /// Unix timestamp the access token expires at.
    pub expires_at: i64,
    /// Scopes actually granted (may be narrower than requested).
    pub scope: Option<String>,
}

impl TokenSet {
    /// Whether the access token is expired or within `skew` seconds of
    /// expiring — the client should refresh proactively in that window.
    pub fn needs_refresh(&self, now: i64, skew_secs: i64) -> bool {
        self.expires_at - skew_secs <= now
    }
}

/// Credentials a client registered (or was pre-provisioned) with.
#[derive(Debug, Clone)]
pub struct ClientInformation {
    /// Client identifier issued by the authorization server.
    pub client_id: String,
    /// Present for confidential clients.
    pub client_secret: Option<String>,
    /// The redirect URI this client registered.
    pub redirect_uri: String,
}

/// The state a [`crate::client::state_machine::OAuthClientStateMachine`]
/// reads and writes as it drives the discovery → registration →
/// authorization → exchange chain (§4.7). Implementations own durability
/// (disk, keychain, database); the state machine only calls through this
/// seam.
#[async_trait]
pub trait OAuthClientProvider: Send + Sync {
    /// Currently stored tokens for this resource, if any.
    async fn tokens(&self) -> Option<TokenSet>;

    /// Persist a freshly exchanged or refreshed token set.
    async fn save_tokens(&self, tokens: TokenSet);

    /// Currently stored client credentials for this authorization server,
    /// if this client has already registered (or been pre-provisioned).
    async fn client_information(&self) -> Option<ClientInformation>;

    /// Persist credentials obtained via dynamic registration.
    async fn save_client_information(&self, info: ClientInformation);

    /// The PKCE verifier for the in-flight authorization attempt, if one
    /// is pending.
    async fn code_verifier(&self) -> Option<String>;

    /// Persist the PKCE verifier generated for a new authorization
    /// attempt, replacing any previous one.
    async fn save_code_verifier(&self, verifier: String);

    /// Hand the authorization URL to whatever can open it for the
    /// resource owner — a browser launch, a printed link, a deep link on
    /// mobile. The state machine does not wait for this to return;
    /// callback delivery is a separate step (§4.7 step 6).
    async fn redirect_to_authorization(&self, authorization_url: &str);
}

/// In-memory [`OAuthClientProvider`], suitable for tests and short-lived
/// processes. Production embedders implement the trait against their own
/// storage.
#[derive(Default)]
pub struct InMemoryClientProvider {
    state: parking_lot::Mutex<InMemoryState>,
}

#[derive(Default)]
struct InMemoryState {
    tokens: Option<TokenSet>,
    client_information: Option<ClientInformation>,
    code_verifier: Option<String>,
    redirected_to: Vec<String>,
}

impl InMemoryClientProvider {
    /// Build an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// URLs previously handed to [`OAuthClientProvider::redirect_to_authorization`],
    /// for tests that assert on the redirect flow without a real browser.
    pub fn redirected_urls(&self) -> Vec<String> {
        self.state.lock().redirected_to.clone()
    }
}

#[async_trait]
impl OAuthClientProvider for InMemoryClientProvider {
    async fn tokens(&self) -> Option<TokenSet> {
        self.state.lock().tokens.clone()
    }

    async fn save_tokens(&self, tokens: TokenSet) {
        self.state.lock().tokens = Some(tokens);
    }

    async fn client_information(&self) -> Option<ClientInformation> {
        self.state.lock().client_information.clone()
    }

    async fn save_client_information(&self, info: ClientInformation) {
        self.state.lock().client_information = Some(info);
    }

    async fn code_verifier(&self) -> Option<String> {
        self.state.lock().code_verifier.clone()
    }

    async fn save_code_verifier(&self, verifier: String) {
        self.state.lock().code_verifier = Some(verifier);
    }

    async fn redirect_to_authorization(&self, authorization_url: &str) {
        self.state.lock().redirected_to.push(authorization_url.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn needs_refresh_honors_skew() {
        let tokens =
            TokenSet { access_token: "t".to_string(), refresh_token: None, expires_at: 1000, scope: None };
        assert!(tokens.needs_refresh(995, 10));
        assert!(!tokens.needs_refresh(900, 10));
    }

    #[tokio::test]
    async fn provider_round_trips_tokens_and_verifier() {
        let provider = InMemoryClientProvider::new();
        assert!(provider.tokens().await.is_none());

        provider
            .save_tokens(TokenSet {
                access_token: "at".to_string(),
                refresh_token: Some("rt".to_string()),
                expires_at: i64::MAX,
                scope: None,
            })
            .await;
        assert_eq!(provider.tokens().await.unwrap().access_token, "at");

        provider.save_code_verifier("verifier".to_string()).await;
        assert_eq!(provider.code_verifier().await.unwrap(), "verifier");

        provider.redirect_to_authorization("https://as.example/authorize?x=1").await;
        assert_eq!(provider.redirected_urls().len(), 1);
    }
}
