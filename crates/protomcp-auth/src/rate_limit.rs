//! Sliding-window rate limiting for the OAuth endpoints (§4.6: 20/hour on
//! `/register`, 50/15min on `/token`).
//!
//! Uses `parking_lot::Mutex` rather than an async lock: the critical
//! section only trims a timestamp window and pushes one entry, so it
//! never awaits while held.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Per-endpoint request allowance.
#[derive(Debug, Clone, Copy)]
pub struct EndpointLimit {
    /// Requests allowed per `window`.
    pub requests: u32,
    /// The sliding window's length.
    pub window: Duration,
    /// Extra requests tolerated above `requests` before rejecting.
    pub burst: u32,
}

/// Identifies who is being rate-limited — an IP address, client id, etc.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey(String);

impl RateLimitKey {
    /// Key by remote IP address.
    pub fn ip(addr: impl Into<String>) -> Self {
        Self(format!("ip:{}", addr.into()))
    }

    /// Key by OAuth `client_id`.
    pub fn client(client_id: impl Into<String>) -> Self {
        Self(format!("client:{}", client_id.into()))
    }
}

/// Why a request was rejected, for building a `Retry-After` response.
#[derive(Debug, Clone)]
pub struct RateLimitInfo {
    /// Seconds until the caller may retry.
    pub retry_after: Duration,
    /// Requests already recorded in the current window.
    pub current_count: u32,
    /// The configured limit that was exceeded.
    pub limit: u32,
}

#[derive(Default)]
struct Tracker {
    timestamps: Vec<Instant>,
}

/// Sliding-window limiter, one tracker per `(key, endpoint)` pair.
pub struct RateLimiter {
    default_limit: EndpointLimit,
    endpoint_limits: HashMap<String, EndpointLimit>,
    state: Arc<Mutex<HashMap<(RateLimitKey, String), Tracker>>>,
}

impl RateLimiter {
    /// Build a limiter with an explicit default and per-endpoint overrides.
    pub fn new(default_limit: EndpointLimit, endpoint_limits: HashMap<String, EndpointLimit>) -> Self {
        Self {
            default_limit,
            endpoint_limits,
            state: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The limits named in §4.6: 20/hour on registration, 50/15min on
    /// token issuance, a permissive default elsewhere.
    pub fn for_oauth_server() -> Self {
        let mut endpoint_limits = HashMap::new();
        endpoint_limits.insert(
            "register".to_string(),
            EndpointLimit { requests: 20, window: Duration::from_secs(3600), burst: 2 },
        );
        endpoint_limits.insert(
            "token".to_string(),
            EndpointLimit { requests: 50, window: Duration::from_secs(15 * 60), burst: 5 },
        );
        endpoint_limits.insert(
            "authorize".to_string(),
            EndpointLimit { requests: 30, window: Duration::from_secs(60), burst: 5 },
        );
        Self::new(
            EndpointLimit { requests: 100, window: Duration::from_secs(60), burst: 10 },
            endpoint_limits,
        )
    }

    /// Check and, if allowed, record one request for `key` against
    /// `endpoint`.
    pub fn check(&self, key: &RateLimitKey, endpoint: &str) -> Result<(), RateLimitInfo> {
        let limit = self.endpoint_limits.get(endpoint).copied().unwrap_or(self.default_limit);
        let now = Instant::now();
        let mut state = self.state.lock();
        let tracker = state.entry((key.clone(), endpoint.to_string())).or_default();

        let window_start = now - limit.window;
        tracker.timestamps.retain(|&t| t > window_start);

        let current_count = tracker.timestamps.len() as u32;
        let effective_limit = limit.requests + limit.burst;
        if current_count >= effective_limit {
            let oldest = tracker.timestamps.first().copied().unwrap_or(now);
            return Err(RateLimitInfo {
                retry_after: limit.window.saturating_sub(now - oldest),
                current_count,
                limit: limit.requests,
            });
        }

        tracker.timestamps.push(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tight_limiter() -> RateLimiter {
        RateLimiter::new(
            EndpointLimit { requests: 2, window: Duration::from_secs(60), burst: 0 },
            HashMap::new(),
        )
    }

    #[test]
    fn allows_requests_up_to_the_limit() {
        let limiter = tight_limiter();
        let key = RateLimitKey::ip("1.2.3.4");
        assert!(limiter.check(&key, "token").is_ok());
        assert!(limiter.check(&key, "token").is_ok());
    }

    #[test]
    fn rejects_past_the_limit() {
        let limiter = tight_limiter();
        let key = RateLimitKey::ip("1.2.3.4");
        limiter.check(&key, "token").unwrap();
        limiter.check(&key, "token").unwrap();
        assert!(limiter.check(&key, "token").is_err());
    }

    #[test]
    fn different_keys_are_independent() {
        let limiter = tight_limiter();
        limiter.check(&RateLimitKey::ip("1.2.3.4"), "token").unwrap();
        limiter.check(&RateLimitKey::ip("1.2.3.4"), "token").unwrap();
        assert!(limiter.check(&RateLimitKey::ip("5.6.7.8"), "token").is_ok());
    }

    #[test]
    fn different_endpoints_are_independent() {
        let limiter = tight_limiter();
        let key = RateLimitKey::ip("1.2.3.4");
        limiter.check(&key, "token").unwrap();
        limiter.check(&key, "token").unwrap();
        assert!(limiter.check(&key, "register").is_ok());
    }
}
