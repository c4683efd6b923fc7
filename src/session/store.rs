//! Thread-safe session map with lazy expiry and a periodic sweep.
//!
//! One coarse lock over a `HashMap` — webhook traffic per advisor is low
//! cardinality, so linearizable set/get/clear matters more than granular
//! locking. The sweep runs as a task owned by the store: spawned on
//! construction, aborted on [`SessionStore::shutdown`] or Drop.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::SessionConfig;

use super::model::Session;

struct Entry {
    session: Session,
    last_touched: Instant,
}

/// Concurrent phone-key → session map with time-based expiry.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Entry>>,
    expiration: Duration,
    sweep: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl SessionStore {
    /// Create the store and start its background expiry sweep.
    pub fn new(config: SessionConfig) -> Arc<Self> {
        let store = Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
            expiration: config.expiration,
            sweep: std::sync::Mutex::new(None),
        });

        let weak = Arc::downgrade(&store);
        let interval = config.sweep_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(store) = weak.upgrade() else {
                    break;
                };
                store.sweep_expired().await;
            }
        });
        *store.sweep.lock().expect("sweep handle lock poisoned") = Some(handle);

        store
    }

    /// Upsert a session, replacing any existing value and its timestamp.
    pub async fn set(&self, key: &str, session: Session) {
        let mut sessions = self.sessions.write().await;
        sessions.insert(
            key.to_string(),
            Entry {
                session,
                last_touched: Instant::now(),
            },
        );
    }

    /// Get the session for `key`, if present and not expired.
    ///
    /// An expired entry is deleted on the spot and reported as absent, so
    /// callers cannot distinguish "expired" from "never existed".
    pub async fn get(&self, key: &str) -> Option<Session> {
        let mut sessions = self.sessions.write().await;
        match sessions.get(key) {
            Some(entry) if entry.last_touched.elapsed() < self.expiration => {
                Some(entry.session.clone())
            }
            Some(_) => {
                sessions.remove(key);
                debug!(phone = %key, "Expired session removed on read");
                None
            }
            None => None,
        }
    }

    /// Remove the session for `key` unconditionally.
    pub async fn clear(&self, key: &str) {
        let mut sessions = self.sessions.write().await;
        sessions.remove(key);
    }

    /// Number of entries currently held, expired or not.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Delete every entry past its expiration.
    async fn sweep_expired(&self) {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| entry.last_touched.elapsed() < self.expiration);
        let removed = before - sessions.len();
        if removed > 0 {
            info!(removed, remaining = sessions.len(), "Session sweep");
        }
    }

    /// Stop the background sweep. Idempotent; also invoked by Drop.
    pub fn shutdown(&self) {
        if let Some(handle) = self
            .sweep
            .lock()
            .expect("sweep handle lock poisoned")
            .take()
        {
            handle.abort();
        }
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(expiration: Duration, sweep: Duration) -> SessionConfig {
        SessionConfig {
            expiration,
            sweep_interval: sweep,
        }
    }

    fn session(phone: &str) -> Session {
        Session::new(phone, 1, 10)
    }

    #[tokio::test]
    async fn set_then_get_returns_session() {
        let store = SessionStore::new(SessionConfig::default());
        store.set("+6591234567", session("+6591234567")).await;

        let got = store.get("+6591234567").await.unwrap();
        assert_eq!(got.advisor_id, 1);
        assert_eq!(got.current_step, None);
    }

    #[tokio::test]
    async fn set_replaces_existing_value() {
        let store = SessionStore::new(SessionConfig::default());
        let phone = "+6591234567";
        store.set(phone, session(phone)).await;
        store.set(phone, session(phone).at_step(3)).await;

        assert_eq!(store.get(phone).await.unwrap().current_step, Some(3));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn get_missing_key_is_none() {
        let store = SessionStore::new(SessionConfig::default());
        assert!(store.get("+6500000000").await.is_none());
    }

    #[tokio::test]
    async fn clear_removes_entry() {
        let store = SessionStore::new(SessionConfig::default());
        let phone = "+6591234567";
        store.set(phone, session(phone)).await;
        store.clear(phone).await;
        assert!(store.get(phone).await.is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn get_expired_entry_behaves_like_missing_and_deletes() {
        // Sweep interval far in the future so only lazy expiry applies.
        let store = SessionStore::new(config(
            Duration::from_secs(60),
            Duration::from_secs(1_000_000),
        ));
        let phone = "+6591234567";
        store.set(phone, session(phone)).await;

        tokio::time::advance(Duration::from_secs(61)).await;

        assert!(store.get(phone).await.is_none());
        // The entry is gone afterward, not just hidden.
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_entry_survives_within_expiration() {
        let store = SessionStore::new(config(
            Duration::from_secs(60),
            Duration::from_secs(1_000_000),
        ));
        let phone = "+6591234567";
        store.set(phone, session(phone)).await;

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(store.get(phone).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn set_refreshes_timestamp() {
        let store = SessionStore::new(config(
            Duration::from_secs(60),
            Duration::from_secs(1_000_000),
        ));
        let phone = "+6591234567";
        store.set(phone, session(phone)).await;

        tokio::time::advance(Duration::from_secs(40)).await;
        store.set(phone, session(phone).at_step(1)).await;
        tokio::time::advance(Duration::from_secs(40)).await;

        // 80s since creation, 40s since last write — still live.
        assert!(store.get(phone).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn background_sweep_removes_expired_entries() {
        let store = SessionStore::new(config(Duration::from_secs(60), Duration::from_secs(100)));
        store.set("+6591111111", session("+6591111111")).await;
        store.set("+6592222222", session("+6592222222")).await;

        // Yield first so the sweep task registers its interval before time
        // moves; then past expiration and past a sweep tick, yield again so
        // the sweep task runs.
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_secs(101)).await;
        tokio::task::yield_now().await;

        assert_eq!(store.len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_keeps_fresh_entries() {
        let store = SessionStore::new(config(Duration::from_secs(200), Duration::from_secs(100)));
        store.set("+6591111111", session("+6591111111")).await;

        tokio::time::advance(Duration::from_secs(101)).await;
        tokio::task::yield_now().await;

        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let store = SessionStore::new(SessionConfig::default());
        store.shutdown();
        store.shutdown();
    }
}
