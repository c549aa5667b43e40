//! Server configuration for the streamable HTTP transport (§4.5).
//!
//! Origin-allowlist and bearer-auth enforcement live in `protomcp-auth`'s
//! middleware, which wraps this crate's router rather than being
//! configured through it, so this config only carries the knobs the
//! transport itself needs.

use std::time::Duration;

/// Whether the transport keeps per-client session state.
///
/// Stateless mode never issues an `Mcp-Session-Id` and never consults the
/// session store; every request is handled independently (§4.5 "Stateless
/// mode").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Issue and track session ids; requests after `initialize` must
    /// present one.
    Stateful,
    /// Never issue session ids; each request stands alone.
    Stateless,
}

/// Configuration for [`crate::router::create_router`].
#[derive(Debug, Clone)]
pub struct StreamableHttpConfig {
    /// The single MCP endpoint path, e.g. `/mcp`.
    pub endpoint_path: String,
    /// Stateful vs. stateless session handling.
    pub session_mode: SessionMode,
    /// Idle TTL before a session is evicted by the sweep task.
    pub session_ttl: Duration,
    /// Interval between SSE keep-alive comments on open streams.
    pub keep_alive_interval: Duration,
    /// How many trailing events `EventStore` retains per stream before
    /// `trim` is expected to be called; purely advisory to callers of
    /// this config, not enforced by the store itself.
    pub replay_buffer_size: usize,
    /// When set, `POST` responses that would otherwise stream over SSE
    /// are instead returned as a single JSON body (§4.5 "JSON mode …
    /// used when `enableJsonResponse` is set"). SSE remains the default
    /// response mode when this is unset, independent of what the
    /// request's `Accept` header allows.
    pub enable_json_response: bool,
}

impl Default for StreamableHttpConfig {
    fn default() -> Self {
        Self {
            endpoint_path: "/mcp".to_string(),
            session_mode: SessionMode::Stateful,
            session_ttl: Duration::from_secs(30 * 60),
            keep_alive_interval: Duration::from_secs(15),
            replay_buffer_size: 256,
            enable_json_response: false,
        }
    }
}

/// Builder for [`StreamableHttpConfig`]: chainable `with_*` setters plus
/// `build`.
#[derive(Debug, Clone)]
pub struct StreamableHttpConfigBuilder {
    config: StreamableHttpConfig,
}

impl StreamableHttpConfigBuilder {
    /// Start from the default configuration.
    pub fn new() -> Self {
        Self {
            config: StreamableHttpConfig::default(),
        }
    }

    /// Override the endpoint path.
    pub fn with_endpoint_path(mut self, path: impl Into<String>) -> Self {
        self.config.endpoint_path = path.into();
        self
    }

    /// Switch to stateless mode.
    pub fn stateless(mut self) -> Self {
        self.config.session_mode = SessionMode::Stateless;
        self
    }

    /// Override the session idle TTL.
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.config.session_ttl = ttl;
        self
    }

    /// Override the SSE keep-alive interval.
    pub fn with_keep_alive(mut self, interval: Duration) -> Self {
        self.config.keep_alive_interval = interval;
        self
    }

    /// Override the advisory replay buffer size.
    pub fn with_replay_buffer_size(mut self, size: usize) -> Self {
        self.config.replay_buffer_size = size;
        self
    }

    /// Force JSON-body responses instead of SSE for `POST` requests.
    pub fn enable_json_response(mut self) -> Self {
        self.config.enable_json_response = true;
        self
    }

    /// Finish building.
    pub fn build(self) -> StreamableHttpConfig {
        self.config
    }
}

impl Default for StreamableHttpConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
