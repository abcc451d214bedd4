//! Browser sessions.
//!
//! Each browser gets an opaque id in the `autobot_sid` cookie. The id maps
//! to who is logged in, which conversation is open and the guided-search
//! state. Conversation messages themselves live in the chat log table.
//! Sessions idle past the store's timeout are dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::header::COOKIE;
use axum::http::HeaderMap;
use car_search::{QueryContext, SearchOutcome};
use database::Identity;
use tokio::sync::RwLock;
use tracing::debug;

/// Session cookie name.
pub const COOKIE_NAME: &str = "autobot_sid";

/// Idle time after which a session is forgotten.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Per-browser state.
#[derive(Debug, Clone, Default)]
pub struct BrowserSession {
    pub identity: Option<Identity>,
    /// Open conversation id.
    pub conversation: Option<String>,
    pub context: QueryContext,
    /// Last search result, shown under the transcript.
    pub last_outcome: Option<SearchOutcome>,
    /// Digest of the last processed upload.
    pub last_upload: Option<String>,
    /// One-shot message for the next page render.
    pub flash: Option<String>,
}

impl BrowserSession {
    pub fn logged_in(identity: Identity) -> Self {
        Self {
            identity: Some(identity),
            ..Self::default()
        }
    }

    /// Open a conversation with a fresh search state.
    pub fn open_conversation(&mut self, session_id: String) {
        self.conversation = Some(session_id);
        self.clear_search();
        self.last_upload = None;
    }

    pub fn clear_search(&mut self) {
        self.context.reset();
        self.last_outcome = None;
    }
}

#[derive(Debug)]
struct Entry {
    session: BrowserSession,
    last_seen: Instant,
}

/// In-process session registry, shared by all handlers.
///
/// Every read or update counts as activity. Expired sessions are treated as
/// missing and are swept whenever a new session is created.
#[derive(Debug, Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, Entry>>>,
    idle_timeout: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_idle_timeout(DEFAULT_IDLE_TIMEOUT)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle_timeout(idle_timeout: Duration) -> Self {
        Self {
            sessions: Arc::default(),
            idle_timeout,
        }
    }

    /// Store a new session and return its id.
    pub async fn create(&self, session: BrowserSession) -> String {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;

        let before = sessions.len();
        sessions.retain(|_, entry| now.duration_since(entry.last_seen) <= self.idle_timeout);
        if sessions.len() < before {
            debug!(evicted = before - sessions.len(), "Dropped idle sessions");
        }

        sessions.insert(
            id.clone(),
            Entry {
                session,
                last_seen: now,
            },
        );
        id
    }

    pub async fn get(&self, id: &str) -> Option<BrowserSession> {
        let mut sessions = self.sessions.write().await;
        self.live(&mut sessions, id).cloned()
    }

    /// Apply `f` to an existing session. Returns `None` for unknown or
    /// expired ids.
    pub async fn update<F, R>(&self, id: &str, f: F) -> Option<R>
    where
        F: FnOnce(&mut BrowserSession) -> R,
    {
        let mut sessions = self.sessions.write().await;
        self.live(&mut sessions, id).map(f)
    }

    /// The session behind `id`, marked as seen, unless it has expired.
    fn live<'a>(
        &self,
        sessions: &'a mut HashMap<String, Entry>,
        id: &str,
    ) -> Option<&'a mut BrowserSession> {
        let now = Instant::now();
        if now.duration_since(sessions.get(id)?.last_seen) > self.idle_timeout {
            sessions.remove(id);
            return None;
        }
        let entry = sessions.get_mut(id)?;
        entry.last_seen = now;
        Some(&mut entry.session)
    }

    pub async fn remove(&self, id: &str) {
        self.sessions.write().await.remove(id);
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// Session id from the request's `Cookie` headers.
pub fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == COOKIE_NAME && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// `Set-Cookie` value for a session id.
pub fn session_cookie(id: &str) -> String {
    format!("{}={}; Path=/; HttpOnly; SameSite=Lax", COOKIE_NAME, id)
}

/// `Set-Cookie` value that deletes the session cookie.
pub fn expired_cookie() -> String {
    format!("{}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax", COOKIE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_session_id_from_cookies() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_id(&headers), None);

        headers.insert(COOKIE, HeaderValue::from_static("theme=dark; autobot_sid=abc123"));
        assert_eq!(session_id(&headers).as_deref(), Some("abc123"));

        headers.insert(COOKIE, HeaderValue::from_static("autobot_sid="));
        assert_eq!(session_id(&headers), None);
    }

    #[test]
    fn test_cookie_values() {
        assert_eq!(
            session_cookie("abc"),
            "autobot_sid=abc; Path=/; HttpOnly; SameSite=Lax"
        );
        assert!(expired_cookie().contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn test_store_lifecycle() {
        let store = SessionStore::new();
        let id = store
            .create(BrowserSession::logged_in(Identity::anonymous("anon-123")))
            .await;

        store
            .update(&id, |s| {
                s.open_conversation("a1b2c3d4".into());
                s.context.refine("bmw");
            })
            .await
            .unwrap();

        let session = store.get(&id).await.unwrap();
        assert_eq!(session.conversation.as_deref(), Some("a1b2c3d4"));
        assert_eq!(session.context.phrases(), ["bmw"]);

        assert!(store.update("missing", |_| ()).await.is_none());

        store.remove(&id).await;
        assert!(store.get(&id).await.is_none());
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_idle_sessions_expire() {
        let store = SessionStore::with_idle_timeout(Duration::from_millis(200));
        let idle = store.create(BrowserSession::default()).await;
        let active = store.create(BrowserSession::default()).await;

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(store.get(&active).await.is_some());
        tokio::time::sleep(Duration::from_millis(120)).await;

        // Only the untouched session has been idle past the timeout.
        assert!(store.update(&idle, |_| ()).await.is_none());
        assert!(store.get(&active).await.is_some());
    }

    #[tokio::test]
    async fn test_create_sweeps_expired_sessions() {
        let store = SessionStore::with_idle_timeout(Duration::from_millis(100));
        for _ in 0..3 {
            store
                .create(BrowserSession::logged_in(Identity::anonymous("anon-1")))
                .await;
        }
        assert_eq!(store.len().await, 3);

        tokio::time::sleep(Duration::from_millis(150)).await;
        let fresh = store.create(BrowserSession::default()).await;

        assert_eq!(store.len().await, 1);
        assert!(store.get(&fresh).await.is_some());
    }
}
