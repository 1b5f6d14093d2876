//! Session store: short-lived authorization state.
//!
//! A [`Session`] correlates one authorization attempt. It is stored twice over
//! its life: first under the upstream OAuth `state` value while the user is at
//! the provider, then under the freshly minted authorization code handed back
//! to the downstream client.
//!
//! # Expiry
//!
//! Entries may carry a deadline. Expiry is **lazy**: `get` and `take` treat an
//! entry past its deadline as absent and evict it, and only the entry that is
//! actually expired is ever removed. A key that was overwritten with a fresh
//! entry is never deleted by an older deadline. A background reaper
//! ([`spawn_reaper`]) reclaims expired entries nobody reads again.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::clients::ClientDescriptor;

/// Parameters of the downstream authorization request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationParams {
    /// Where the downstream client wants the code delivered
    pub redirect_uri: String,
    /// Scopes requested by the downstream client
    #[serde(default)]
    pub scopes: Vec<String>,
    /// PKCE code challenge (S256)
    pub code_challenge: String,
    /// Opaque client state, echoed back on redirect
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// One authorization attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Client that started the flow
    pub client: ClientDescriptor,
    /// Downstream authorization parameters
    pub params: AuthorizationParams,
    /// Token Pair id, set once the upstream exchange succeeded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_id: Option<String>,
}

impl Session {
    /// A session for a flow that has not reached the provider yet.
    #[must_use]
    pub fn new(client: ClientDescriptor, params: AuthorizationParams) -> Self {
        Self {
            client,
            params,
            token_id: None,
        }
    }

    /// Copy of this session bound to a minted Token Pair.
    #[must_use]
    pub fn with_token_id(self, token_id: impl Into<String>) -> Self {
        Self {
            token_id: Some(token_id.into()),
            ..self
        }
    }
}

#[derive(Debug)]
struct SessionEntry {
    session: Session,
    expires_at: Option<Instant>,
}

impl SessionEntry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// In-memory session store keyed by opaque correlation tokens.
#[derive(Debug, Default)]
pub struct SessionStore {
    entries: DashMap<String, SessionEntry>,
}

impl SessionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `session` under `key`, replacing any existing entry.
    ///
    /// With `ttl`, the entry reads as absent once the interval has elapsed.
    pub fn put(&self, key: impl Into<String>, session: Session, ttl: Option<Duration>) {
        let expires_at = ttl.and_then(|ttl| Instant::now().checked_add(ttl));
        self.entries.insert(
            key.into(),
            SessionEntry {
                session,
                expires_at,
            },
        );
    }

    /// Look up a live session.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Session> {
        let entry = self.entries.get(key)?;
        if entry.is_expired() {
            drop(entry);
            self.evict_if_expired(key);
            return None;
        }
        Some(entry.session.clone())
    }

    /// Atomically remove and return a live session.
    ///
    /// Two concurrent callers for the same key never both receive it.
    #[must_use]
    pub fn take(&self, key: &str) -> Option<Session> {
        let (_, entry) = self.entries.remove(key)?;
        if entry.is_expired() {
            debug!("Took expired session, treating as absent");
            return None;
        }
        Some(entry.session)
    }

    /// Delete the entry at `key`. Missing keys are a no-op.
    pub fn clear(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Number of stored entries, including expired ones not yet evicted
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove all expired entries, returning how many were evicted.
    pub fn reap_expired(&self) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.value().is_expired())
            .map(|e| e.key().clone())
            .collect();

        expired
            .iter()
            .filter(|key| self.evict_if_expired(key))
            .count()
    }

    fn evict_if_expired(&self, key: &str) -> bool {
        self.entries
            .remove_if(key, |_, entry| entry.is_expired())
            .is_some()
    }
}

/// Spawn a background task that reaps expired sessions every `interval`.
///
/// The task exits when the `shutdown` receiver fires.
pub fn spawn_reaper(
    store: Arc<SessionStore>,
    interval: Duration,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let reaped = store.reap_expired();
                    if reaped > 0 {
                        debug!(count = reaped, "Reaped expired sessions");
                    }
                }
                _ = shutdown.recv() => {
                    debug!("Session reaper shutting down");
                    break;
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_session(redirect_uri: &str) -> Session {
        Session::new(
            ClientDescriptor::new("c1", vec![redirect_uri.to_string()]),
            AuthorizationParams {
                redirect_uri: redirect_uri.to_string(),
                scopes: vec!["r_basicprofile".to_string()],
                code_challenge: "abc".to_string(),
                state: None,
            },
        )
    }

    #[test]
    fn put_and_get_without_ttl() {
        // GIVEN: a session stored without a deadline
        let store = SessionStore::new();
        store.put("state-1", make_session("https://app/cb"), None);

        // THEN: only the exact key finds it
        assert!(store.get("state-1").is_some());
        assert!(store.get("state-2").is_none());
        assert!(store.get("state-").is_none());
    }

    #[test]
    fn put_replaces_existing_entry() {
        let store = SessionStore::new();
        store.put("k", make_session("https://a/cb"), None);
        store.put("k", make_session("https://b/cb"), None);

        assert_eq!(store.get("k").unwrap().params.redirect_uri, "https://b/cb");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn clear_is_idempotent() {
        // GIVEN: one stored session
        let store = SessionStore::new();
        store.put("k", make_session("https://app/cb"), None);

        // WHEN: cleared twice, plus a key that never existed
        store.clear("k");
        store.clear("k");
        store.clear("never-there");

        // THEN: gone, no panic
        assert!(store.get("k").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn expired_entry_reads_as_absent_and_is_evicted() {
        // GIVEN: a session whose deadline has already passed
        let store = SessionStore::new();
        store.put("code", make_session("https://app/cb"), Some(Duration::ZERO));

        // WHEN: read
        let found = store.get("code");

        // THEN: absent, and the entry has been removed
        assert!(found.is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn live_entry_survives_until_deadline() {
        let store = SessionStore::new();
        store.put("code", make_session("https://app/cb"), Some(Duration::from_secs(300)));

        assert!(store.get("code").is_some());
        assert_eq!(store.reap_expired(), 0);
        assert!(store.get("code").is_some());
    }

    #[test]
    fn ttl_elapses() {
        // GIVEN: a short-lived entry
        let store = SessionStore::new();
        store.put("code", make_session("https://app/cb"), Some(Duration::from_millis(20)));
        assert!(store.get("code").is_some());

        // WHEN: its interval passes
        std::thread::sleep(Duration::from_millis(40));

        // THEN: it disappears, and clearing it afterwards is still fine
        assert!(store.get("code").is_none());
        store.clear("code");
    }

    #[test]
    fn overwritten_key_is_not_deleted_by_old_deadline() {
        // GIVEN: a key first stored with a short TTL, then overwritten without one
        let store = SessionStore::new();
        store.put("k", make_session("https://old/cb"), Some(Duration::from_millis(10)));
        store.put("k", make_session("https://new/cb"), None);

        // WHEN: the first deadline passes
        std::thread::sleep(Duration::from_millis(25));

        // THEN: the replacement is still there
        assert_eq!(store.reap_expired(), 0);
        assert_eq!(store.get("k").unwrap().params.redirect_uri, "https://new/cb");
    }

    #[test]
    fn take_is_single_use() {
        // GIVEN: one session
        let store = SessionStore::new();
        store.put("state", make_session("https://app/cb"), None);

        // WHEN: taken twice
        let first = store.take("state");
        let second = store.take("state");

        // THEN: only the first caller gets it
        assert!(first.is_some());
        assert!(second.is_none());
        assert!(store.get("state").is_none());
    }

    #[test]
    fn take_ignores_expired_entries() {
        let store = SessionStore::new();
        store.put("code", make_session("https://app/cb"), Some(Duration::ZERO));

        assert!(store.take("code").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn reap_expired_removes_only_expired() {
        // GIVEN: one live and two expired entries
        let store = SessionStore::new();
        store.put("live", make_session("https://app/cb"), None);
        store.put("dead-1", make_session("https://app/cb"), Some(Duration::ZERO));
        store.put("dead-2", make_session("https://app/cb"), Some(Duration::ZERO));

        // WHEN: reaped
        let reaped = store.reap_expired();

        // THEN: two removed, one left
        assert_eq!(reaped, 2);
        assert_eq!(store.len(), 1);
        assert!(store.get("live").is_some());
    }

    #[test]
    fn with_token_id_keeps_client_and_params() {
        let session = make_session("https://app/cb");
        let bound = session.clone().with_token_id("tok-1");

        assert_eq!(bound.token_id.as_deref(), Some("tok-1"));
        assert_eq!(bound.client, session.client);
        assert_eq!(bound.params, session.params);
    }

    #[tokio::test]
    async fn reaper_stops_on_shutdown() {
        // GIVEN: a reaper on a fast interval
        let store = Arc::new(SessionStore::new());
        store.put("dead", make_session("https://app/cb"), Some(Duration::ZERO));
        let (tx, rx) = tokio::sync::broadcast::channel(1);
        spawn_reaper(Arc::clone(&store), Duration::from_millis(5), rx);

        // WHEN: it has had time to tick
        tokio::time::sleep(Duration::from_millis(30)).await;

        // THEN: the expired entry is gone and shutdown is accepted
        assert!(store.is_empty());
        assert!(tx.send(()).is_ok());
    }
}
