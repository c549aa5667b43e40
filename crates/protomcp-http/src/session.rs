//! Session store: per-session metadata keyed by an opaque session id.
//!
//! Carries the fields §3 names (id, initialized flag, timestamps,
//! negotiated protocol version, metadata) with no IP binding or
//! user-agent fingerprinting — this store isn't asked to own those.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;

/// An opaque, cryptographically random session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a new random session id, prefixed for easy log grepping.
    pub fn generate() -> Self {
        Self(format!("mcp_session_{}", uuid::Uuid::new_v4().simple()))
    }

    /// Borrow the id as a plain string, e.g. for the `Mcp-Session-Id`
    /// header value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// The persisted record for one session (§3 "Session").
#[derive(Debug, Clone)]
pub struct SessionRecord {
    /// The session's own id, duplicated here for convenience when a
    /// record is passed around without its key.
    pub id: SessionId,
    /// Set once the `initialize` handshake completes.
    pub initialized: bool,
    /// When the session was created.
    pub created_at: Instant,
    /// Refreshed on every request that touches this session.
    pub last_activity: Instant,
    /// The `protocolVersion` negotiated during `initialize`, if any.
    pub protocol_version: Option<String>,
    /// Arbitrary session-scoped metadata.
    pub metadata: Option<Value>,
}

impl SessionRecord {
    fn new(id: SessionId) -> Self {
        let now = Instant::now();
        Self {
            id,
            initialized: false,
            created_at: now,
            last_activity: now,
            protocol_version: None,
            metadata: None,
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.last_activity.elapsed() >= ttl
    }
}

/// Persists [`SessionRecord`]s keyed by [`SessionId`].
///
/// Implementations MUST NOT return an expired record from `get_session`;
/// expiry is a store-internal concern (§4.4).
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Upsert a session record.
    async fn store_session(&self, record: SessionRecord);

    /// Fetch a session, or `None` if missing or expired.
    async fn get_session(&self, id: &SessionId) -> Option<SessionRecord>;

    /// Refresh `last_activity` (and therefore the TTL clock). No-op if
    /// the session is missing.
    async fn update_session_activity(&self, id: &SessionId);

    /// Remove a session. Idempotent.
    async fn delete_session(&self, id: &SessionId);

    /// Cheap existence check that still honors expiry.
    async fn session_exists(&self, id: &SessionId) -> bool {
        self.get_session(id).await.is_some()
    }
}

/// In-memory [`SessionStore`] with a background TTL sweep. IP-binding
/// and rate-limiting are out of scope for this store — rate limiting
/// lives in `protomcp-auth`.
pub struct InMemorySessionStore {
    sessions: Arc<DashMap<SessionId, SessionRecord>>,
    ttl: Duration,
}

impl InMemorySessionStore {
    /// Build a store with the given idle TTL and spawn its sweep task.
    ///
    /// The sweep task holds only a weak-free `Arc` clone of the session
    /// map; it runs for the lifetime of the process (or until the
    /// returned store and all its clones are dropped and the runtime
    /// shuts down).
    pub fn new(ttl: Duration) -> Arc<Self> {
        let store = Arc::new(Self {
            sessions: Arc::new(DashMap::new()),
            ttl,
        });
        store.spawn_sweeper();
        store
    }

    fn spawn_sweeper(self: &Arc<Self>) {
        let sessions = self.sessions.clone();
        let ttl = self.ttl;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(30).min(ttl));
            loop {
                interval.tick().await;
                sessions.retain(|id, record| {
                    let expired = record.is_expired(ttl);
                    if expired {
                        debug!(session_id = %id, "evicting expired session");
                    }
                    !expired
                });
            }
        });
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn store_session(&self, record: SessionRecord) {
        self.sessions.insert(record.id.clone(), record);
    }

    async fn get_session(&self, id: &SessionId) -> Option<SessionRecord> {
        let record = self.sessions.get(id)?;
        if record.is_expired(self.ttl) {
            drop(record);
            self.sessions.remove(id);
            return None;
        }
        Some(record.clone())
    }

    async fn update_session_activity(&self, id: &SessionId) {
        if let Some(mut record) = self.sessions.get_mut(id) {
            record.last_activity = Instant::now();
        }
    }

    async fn delete_session(&self, id: &SessionId) {
        self.sessions.remove(id);
    }
}

/// Build a fresh, un-initialized [`SessionRecord`] for a newly minted id.
pub fn new_session_record(id: SessionId) -> SessionRecord {
    SessionRecord::new(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stores_and_fetches_a_session() {
        let store = InMemorySessionStore::new(Duration::from_secs(60));
        let id = SessionId::generate();
        store.store_session(new_session_record(id.clone())).await;

        let fetched = store.get_session(&id).await.expect("session present");
        assert_eq!(fetched.id, id);
        assert!(!fetched.initialized);
    }

    #[tokio::test]
    async fn missing_session_returns_none() {
        let store = InMemorySessionStore::new(Duration::from_secs(60));
        assert!(store.get_session(&SessionId::from("nope")).await.is_none());
    }

    #[tokio::test]
    async fn expired_session_is_not_returned() {
        let store = InMemorySessionStore::new(Duration::from_millis(5));
        let id = SessionId::generate();
        store.store_session(new_session_record(id.clone())).await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(store.get_session(&id).await.is_none());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = InMemorySessionStore::new(Duration::from_secs(60));
        let id = SessionId::generate();
        store.delete_session(&id).await;
        store.store_session(new_session_record(id.clone())).await;
        store.delete_session(&id).await;
        store.delete_session(&id).await;
        assert!(!store.session_exists(&id).await);
    }

    #[tokio::test]
    async fn update_activity_refreshes_ttl() {
        let store = InMemorySessionStore::new(Duration::from_millis(30));
        let id = SessionId::generate();
        store.store_session(new_session_record(id.clone())).await;

        tokio::time::sleep(Duration::from_millis(15)).await;
        store.update_session_activity(&id).await;
        tokio::time::sleep(Duration::from_millis(15)).await;

        assert!(store.get_session(&id).await.is_some());
    }
}
