use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::models::Session;

/// Number of random bytes behind every token (hex encoded to twice as many characters).
pub const TOKEN_BYTES: usize = 32;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("token generation failed: {0}")]
    TokenGeneration(String),
}

/// SessionStore Trait
///
/// The sole owner of the token -> identity mapping. Handlers and the access guard only
/// reach it through this trait, so a persistent or distributed store can replace the
/// in-memory one without touching them.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Mints a fresh, unpredictable token bound to `identity_id`.
    async fn create(&self, identity_id: i64) -> Result<Session, SessionError>;

    /// Returns the identity bound to `token`, or `None` for unknown or expired tokens.
    async fn resolve(&self, token: &str) -> Option<i64>;

    /// Removes the mapping. Destroying an absent token is not an error.
    async fn destroy(&self, token: &str);
}

/// SessionState
///
/// The concrete type used to share the session store across the application state.
pub type SessionState = Arc<dyn SessionStore>;

/// generate_token
///
/// Draws `TOKEN_BYTES` from the operating system CSPRNG. The token carries no information
/// about the identity, the login or the time it was minted.
pub fn generate_token() -> Result<String, SessionError> {
    let mut bytes = [0u8; TOKEN_BYTES];
    getrandom::fill(&mut bytes).map_err(|e| SessionError::TokenGeneration(e.to_string()))?;
    Ok(bytes.iter().map(|b| format!("{b:02x}")).collect())
}

/// InMemorySessionStore
///
/// Process-wide sessions behind an async `RwLock`; lifetime is the process lifetime.
/// With a TTL configured, sessions older than the TTL resolve as absent and are evicted
/// lazily on lookup or eagerly via `purge_expired`.
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    ttl: Option<Duration>,
}

impl InMemorySessionStore {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    fn is_expired(&self, session: &Session, now: DateTime<Utc>) -> bool {
        self.ttl
            .is_some_and(|ttl| now.signed_duration_since(session.created_at) >= ttl)
    }

    /// Drops every expired session and returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !self.is_expired(session, now));
        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

/// spawn_purge_task
///
/// Calls `purge_expired` on `store` every `every`, so sessions nobody presents again are
/// still reclaimed. The task runs until the returned handle is aborted or the runtime stops.
pub fn spawn_purge_task(
    store: Arc<InMemorySessionStore>,
    every: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticks = tokio::time::interval(every);
        loop {
            ticks.tick().await;
            let removed = store.purge_expired().await;
            if removed > 0 {
                tracing::debug!(removed, "expired sessions purged");
            }
        }
    })
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, identity_id: i64) -> Result<Session, SessionError> {
        let mut sessions = self.sessions.write().await;

        // A collision on 256 random bits means the generator is broken; redraw regardless.
        let token = loop {
            let candidate = generate_token()?;
            if !sessions.contains_key(&candidate) {
                break candidate;
            }
        };

        let session = Session {
            token: token.clone(),
            identity_id,
            created_at: Utc::now(),
        };
        sessions.insert(token, session.clone());
        tracing::debug!(identity_id, active = sessions.len(), "session created");
        Ok(session)
    }

    async fn resolve(&self, token: &str) -> Option<i64> {
        let now = Utc::now();
        {
            let sessions = self.sessions.read().await;
            match sessions.get(token) {
                None => return None,
                Some(session) if !self.is_expired(session, now) => {
                    return Some(session.identity_id);
                }
                Some(_) => {}
            }
        }

        // Expired: evict under the write lock, re-checking in case it was replaced meanwhile.
        let mut sessions = self.sessions.write().await;
        if sessions
            .get(token)
            .is_some_and(|session| self.is_expired(session, now))
        {
            sessions.remove(token);
            tracing::debug!("expired session evicted");
        }
        None
    }

    async fn destroy(&self, token: &str) {
        let removed = self.sessions.write().await.remove(token).is_some();
        tracing::debug!(removed, "session destroyed");
    }
}
