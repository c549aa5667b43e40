//! Resource and authorization-server metadata discovery (§4.7 steps 1-2).
//!
//! `rejects_obviously_unsafe_host` below is a deliberately narrow SSRF
//! guard (loopback/link-local only, no private-range or cloud-metadata
//! blocking, no response-size caps) — see this crate's design notes for
//! the scoping rationale.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Deserialize;

use crate::error::{AuthError, AuthResult};
use crate::metadata::{AuthorizationServerMetadata, ProtectedResourceMetadata};

/// Caches metadata documents keyed by the URL they were fetched from, so
/// repeated discovery attempts within a process don't refetch on every
/// 401.
#[derive(Default)]
pub struct DiscoveryCache {
    resource: Mutex<HashMap<String, ProtectedResourceMetadata>>,
    authorization_server: Mutex<HashMap<String, AuthorizationServerMetadata>>,
}

/// Fetches and caches OAuth discovery documents over HTTP.
pub struct DiscoveryClient {
    http: reqwest::Client,
    cache: Arc<DiscoveryCache>,
}

impl DiscoveryClient {
    /// Build a discovery client with a bounded request timeout and no
    /// automatic redirect following (redirects on a metadata fetch are a
    /// classic SSRF vector).
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("static client configuration is always valid");
        Self { http, cache: Arc::new(DiscoveryCache::default()) }
    }

    /// Fetch `<resource>/.well-known/oauth-protected-resource`, caching
    /// the result.
    pub async fn protected_resource_metadata(&self, resource: &str) -> AuthResult<ProtectedResourceMetadata> {
        let url = format!("{}/.well-known/oauth-protected-resource", resource.trim_end_matches('/'));
        if let Some(cached) = self.cache.resource.lock().get(&url).cloned() {
            return Ok(cached);
        }
        rejects_obviously_unsafe_host(&url)?;

        let metadata: ProtectedResourceMetadataWire = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| AuthError::ServerError(format!("fetching protected resource metadata: {e}")))?
            .json()
            .await
            .map_err(|e| AuthError::ServerError(format!("parsing protected resource metadata: {e}")))?;

        let metadata = ProtectedResourceMetadata::new(
            metadata.resource,
            metadata.authorization_servers,
            metadata.scopes_supported.unwrap_or_default(),
        );
        self.cache.resource.lock().insert(url, metadata.clone());
        Ok(metadata)
    }

    /// Fetch `<issuer>/.well-known/oauth-authorization-server`, caching
    /// the result.
    pub async fn authorization_server_metadata(&self, issuer: &str) -> AuthResult<AuthorizationServerMetadata> {
        let url = format!("{}/.well-known/oauth-authorization-server", issuer.trim_end_matches('/'));
        if let Some(cached) = self.cache.authorization_server.lock().get(&url).cloned() {
            return Ok(cached);
        }
        rejects_obviously_unsafe_host(&url)?;

        let metadata: AuthorizationServerMetadata = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| AuthError::ServerError(format!("fetching authorization server metadata: {e}")))?
            .json()
            .await
            .map_err(|e| AuthError::ServerError(format!("parsing authorization server metadata: {e}")))?;

        self.cache.authorization_server.lock().insert(url, metadata.clone());
        Ok(metadata)
    }
}

impl Default for DiscoveryClient {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
struct ProtectedResourceMetadataWire {
    resource: String,
    authorization_servers: Vec<String>,
    #[serde(default)]
    scopes_supported: Option<Vec<String>>,
}

fn rejects_obviously_unsafe_host(url: &str) -> AuthResult<()> {
    let parsed = url::Url::parse(url).map_err(|e| AuthError::InvalidRequest(format!("invalid metadata URL: {e}")))?;
    if parsed.scheme() != "https" && parsed.scheme() != "http" {
        return Err(AuthError::InvalidRequest("metadata URL must be http(s)".to_string()));
    }

    if let Some(host) = parsed.host_str() {
        if let Ok(ip) = host.parse::<IpAddr>() {
            if is_loopback_or_link_local(ip) {
                return Err(AuthError::InvalidRequest("metadata URL resolves to a disallowed address".to_string()));
            }
        }
    }
    Ok(())
}

fn is_loopback_or_link_local(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_link_local(),
        IpAddr::V6(v6) => v6.is_loopback(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_loopback_metadata_urls() {
        assert!(rejects_obviously_unsafe_host("http://127.0.0.1/.well-known/oauth-authorization-server").is_err());
    }

    #[test]
    fn rejects_non_http_schemes() {
        assert!(rejects_obviously_unsafe_host("file:///etc/passwd").is_err());
    }

    #[test]
    fn accepts_ordinary_https_urls() {
        assert!(rejects_obviously_unsafe_host("https://as.example.com/.well-known/oauth-authorization-server")
            .is_ok());
    }
}
