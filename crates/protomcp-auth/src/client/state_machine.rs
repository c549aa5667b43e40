//! Client-side OAuth 2.1 state machine (§4.7): discovery, registration,
//! and the PKCE authorization-code flow, modeled as an explicit
//! `enum AuthState` rather than a compile-time typestate client, since the
//! chain starts from a protected-resource 401 and needs to branch at
//! runtime (registered vs. unregistered client, escalate-scope retry).

use std::sync::Arc;

use tracing::debug;

use crate::client::discovery::DiscoveryClient;
use crate::client::provider::{ClientInformation, OAuthClientProvider, TokenSet};
use crate::error::{AuthError, AuthResult};
use crate::pkce;
use crate::server::{RegistrationRequest, RegistrationResponse};

/// The 401 challenge that kicks off authorization (§4.7 "Trigger").
#[derive(Debug, Clone)]
pub struct UnauthorizedChallenge {
    /// `resource_metadata` URL from the `WWW-Authenticate` header.
    pub resource_metadata: String,
    /// `scope` from the `WWW-Authenticate` header, if present.
    pub scope: Option<String>,
}

/// Parse a `WWW-Authenticate: Bearer ...` header value into its
/// challenge parameters.
pub fn parse_www_authenticate(header: &str) -> Option<UnauthorizedChallenge> {
    let rest = header.strip_prefix("Bearer ")?;
    let mut resource_metadata = None;
    let mut scope = None;
    for part in rest.split(',') {
        let part = part.trim();
        if let Some(value) = part.strip_prefix("resource_metadata=") {
            resource_metadata = Some(value.trim_matches('"').to_string());
        } else if let Some(value) = part.strip_prefix("scope=") {
            scope = Some(value.trim_matches('"').to_string());
        }
    }
    resource_metadata.map(|resource_metadata| UnauthorizedChallenge { resource_metadata, scope })
}

/// Where a client is in the authorization lifecycle (§4.7 "States").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// No authorization attempt in progress.
    Idle,
    /// Fetching protected-resource metadata from the 401's challenge.
    DiscoveringResource,
    /// Fetching the authorization server's own metadata.
    DiscoveringAuthServer,
    /// Performing dynamic client registration (skipped if credentials
    /// are already stored).
    Registering,
    /// Building the authorization URL and handing it to the provider.
    Authorizing,
    /// Authorization URL has been presented; waiting for the callback
    /// with `code`/`state`.
    WaitingForCode,
    /// Exchanging the authorization code for tokens.
    Exchanging,
    /// Tokens obtained and ready to use.
    Authorized,
    /// Using a refresh token to mint a new access token.
    Refreshing,
}

/// Drives one resource's authorization lifecycle against an
/// [`OAuthClientProvider`] for persistence.
pub struct OAuthClientStateMachine {
    provider: Arc<dyn OAuthClientProvider>,
    discovery: DiscoveryClient,
    redirect_uri: String,
    client_name: String,
    state: AuthState,
    /// Bounded scope step-up retries (§4.7 "Scope step-up").
    scope_escalations: u32,
}

/// Bounds runaway scope step-up loops (a misbehaving AS that keeps
/// demanding a broader scope every time).
const MAX_SCOPE_ESCALATIONS: u32 = 3;

impl OAuthClientStateMachine {
    /// Build a state machine for one client identity.
    pub fn new(provider: Arc<dyn OAuthClientProvider>, redirect_uri: impl Into<String>, client_name: impl Into<String>) -> Self {
        Self {
            provider,
            discovery: DiscoveryClient::new(),
            redirect_uri: redirect_uri.into(),
            client_name: client_name.into(),
            state: AuthState::Idle,
            scope_escalations: 0,
        }
    }

    /// Current state, for logging/tests.
    pub fn state(&self) -> &AuthState {
        &self.state
    }

    /// Drive steps 1-5 of §4.7: discover the resource and AS, register if
    /// needed, and produce the URL the caller should send the resource
    /// owner to. The returned URL has already been handed to
    /// [`OAuthClientProvider::redirect_to_authorization`].
    pub async fn begin_authorization(&mut self, challenge: &UnauthorizedChallenge) -> AuthResult<String> {
        self.state = AuthState::DiscoveringResource;
        let resource_metadata = self.discovery.protected_resource_metadata(&challenge.resource_metadata).await?;

        let issuer = resource_metadata
            .authorization_servers
            .first()
            .ok_or_else(|| AuthError::ServerError("protected resource advertises no authorization server".to_string()))?
            .clone();

        self.state = AuthState::DiscoveringAuthServer;
        let as_metadata = self.discovery.authorization_server_metadata(&issuer).await?;

        let scope = challenge
            .scope
            .clone()
            .or_else(|| (!resource_metadata.scopes_supported.is_empty()).then(|| resource_metadata.scopes_supported.join(" ")))
            .or_else(|| (!as_metadata.scopes_supported.is_empty()).then(|| as_metadata.scopes_supported.join(" ")));

        let client_info = match self.provider.client_information().await {
            Some(info) => info,
            None => {
                self.state = AuthState::Registering;
                self.register(&as_metadata.registration_endpoint).await?
            }
        };

        self.state = AuthState::Authorizing;
        let pkce_pair = pkce::generate();
        self.provider.save_code_verifier(pkce_pair.verifier).await;

        let state_token = uuid::Uuid::new_v4().simple().to_string();
        let mut url = url::Url::parse(&as_metadata.authorization_endpoint)
            .map_err(|e| AuthError::ServerError(format!("invalid authorization_endpoint: {e}")))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("response_type", "code");
            query.append_pair("client_id", &client_info.client_id);
            query.append_pair("redirect_uri", &client_info.redirect_uri);
            query.append_pair("code_challenge", &pkce_pair.challenge);
            query.append_pair("code_challenge_method", pkce::CODE_CHALLENGE_METHOD);
            query.append_pair("state", &state_token);
            if let Some(scope) = &scope {
                query.append_pair("scope", scope);
            }
        }

        self.state = AuthState::WaitingForCode;
        self.provider.redirect_to_authorization(url.as_str()).await;
        debug!(state = %state_token, "awaiting authorization callback");
        Ok(url.to_string())
    }

    async fn register(&self, registration_endpoint: &str) -> AuthResult<ClientInformation> {
        let request = RegistrationRequest {
            redirect_uris: vec![self.redirect_uri.clone()],
            token_endpoint_auth_method: Some("none".to_string()),
            grant_types: Some(vec!["authorization_code".to_string(), "refresh_token".to_string()]),
            client_name: Some(self.client_name.clone()),
            scope: None,
            jwks_uri: None,
        };

        let http = reqwest::Client::new();
        let response: RegistrationResponse = http
            .post(registration_endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| AuthError::ServerError(format!("registration request failed: {e}")))?
            .json()
            .await
            .map_err(|e| AuthError::ServerError(format!("registration response was not valid JSON: {e}")))?;

        let info = ClientInformation {
            client_id: response.client_id,
            client_secret: response.client_secret,
            redirect_uri: self.redirect_uri.clone(),
        };
        self.provider.save_client_information(info.clone()).await;
        Ok(info)
    }

    /// Step 6-7: exchange the authorization code delivered on the
    /// callback for tokens, using the PKCE verifier stashed during
    /// [`begin_authorization`].
    pub async fn complete_authorization(&mut self, token_endpoint: &str, code: &str) -> AuthResult<TokenSet> {
        let verifier = self
            .provider
            .code_verifier()
            .await
            .ok_or_else(|| AuthError::ServerError("no authorization attempt is pending".to_string()))?;
        let client_info = self
            .provider
            .client_information()
            .await
            .ok_or_else(|| AuthError::ServerError("no client credentials stored".to_string()))?;

        self.state = AuthState::Exchanging;
        let tokens = exchange_code_for_tokens(token_endpoint, &client_info, code, &verifier).await?;
        self.provider.save_tokens(tokens.clone()).await;
        self.state = AuthState::Authorized;
        Ok(tokens)
    }

    /// Refresh cycle: `Authorized →(401 or near-expiry)→ Refreshing →
    /// Authorized`, falling back to re-authorizing (returning the error
    /// so the caller can restart at [`begin_authorization`]) if the
    /// refresh token itself has been revoked.
    pub async fn refresh(&mut self, token_endpoint: &str) -> AuthResult<TokenSet> {
        let current = self.provider.tokens().await.ok_or_else(|| AuthError::ServerError("no tokens stored".to_string()))?;
        let refresh_token = current
            .refresh_token
            .ok_or_else(|| AuthError::InvalidGrant("no refresh_token available".to_string()))?;
        let client_info = self
            .provider
            .client_information()
            .await
            .ok_or_else(|| AuthError::ServerError("no client credentials stored".to_string()))?;

        self.state = AuthState::Refreshing;
        let tokens = refresh_tokens(token_endpoint, &client_info, &refresh_token).await?;
        self.provider.save_tokens(tokens.clone()).await;
        self.state = AuthState::Authorized;
        Ok(tokens)
    }

    /// Whether another scope step-up attempt is allowed (§4.7
    /// "Scope step-up").
    pub fn can_escalate_scope(&self) -> bool {
        self.scope_escalations < MAX_SCOPE_ESCALATIONS
    }

    /// Record a scope step-up attempt before looping back to
    /// [`begin_authorization`] with a broader requested scope.
    pub fn record_scope_escalation(&mut self) {
        self.scope_escalations += 1;
    }
}

#[derive(serde::Deserialize)]
struct TokenWire {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: i64,
    #[serde(default)]
    scope: Option<String>,
}

async fn exchange_code_for_tokens(
    token_endpoint: &str,
    client_info: &ClientInformation,
    code: &str,
    verifier: &str,
) -> AuthResult<TokenSet> {
    let http = reqwest::Client::new();
    let mut form = vec![
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", &client_info.redirect_uri),
        ("code_verifier", verifier),
        ("client_id", &client_info.client_id),
    ];
    if let Some(secret) = &client_info.client_secret {
        form.push(("client_secret", secret));
    }

    let wire: TokenWire = http
        .post(token_endpoint)
        .form(&form)
        .send()
        .await
        .map_err(|e| AuthError::ServerError(format!("token request failed: {e}")))?
        .json()
        .await
        .map_err(|e| AuthError::ServerError(format!("token response was not valid JSON: {e}")))?;

    Ok(TokenSet {
        access_token: wire.access_token,
        refresh_token: wire.refresh_token,
        expires_at: crate::server::now_unix() as i64 + wire.expires_in,
        scope: wire.scope,
    })
}

async fn refresh_tokens(
    token_endpoint: &str,
    client_info: &ClientInformation,
    refresh_token: &str,
) -> AuthResult<TokenSet> {
    let http = reqwest::Client::new();
    let mut form = vec![
        ("grant_type", "refresh_token"),
        ("refresh_token", refresh_token),
        ("client_id", &client_info.client_id),
    ];
    if let Some(secret) = &client_info.client_secret {
        form.push(("client_secret", secret));
    }

    let wire: TokenWire = http
        .post(token_endpoint)
        .form(&form)
        .send()
        .await
        .map_err(|e| AuthError::ServerError(format!("refresh request failed: {e}")))?
        .json()
        .await
        .map_err(|e| AuthError::ServerError(format!("refresh response was not valid JSON: {e}")))?;

    Ok(TokenSet {
        access_token: wire.access_token,
        refresh_token: wire.refresh_token.or_else(|| Some(refresh_token.to_string())),
        expires_at: crate::server::now_unix() as i64 + wire.expires_in,
        scope: wire.scope,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_resource_metadata_and_scope_from_challenge() {
        let header = r#"Bearer error="invalid_token", scope="tools:call resources:read", resource_metadata="https://res.example/.well-known/oauth-protected-resource""#;
        let challenge = parse_www_authenticate(header).expect("parses");
        assert_eq!(challenge.resource_metadata, "https://res.example/.well-known/oauth-protected-resource");
        assert_eq!(challenge.scope.as_deref(), Some("tools:call resources:read"));
    }

    #[test]
    fn non_bearer_challenge_is_none() {
        assert!(parse_www_authenticate(r#"Basic realm="x""#).is_none());
    }

    #[test]
    fn escalation_budget_is_bounded() {
        let provider = Arc::new(crate::client::provider::InMemoryClientProvider::new());
        let mut machine = OAuthClientStateMachine::new(provider, "https://app.example/callback", "Test Client");
        for _ in 0..MAX_SCOPE_ESCALATIONS {
            assert!(machine.can_escalate_scope());
            machine.record_scope_escalation();
        }
        assert!(!machine.can_escalate_scope());
    }
}
