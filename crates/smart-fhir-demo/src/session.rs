//! Cookie-keyed session state store.
//!
//! The browser carries only an opaque session id; the serialized
//! [`ClientState`] lives server-side behind the [`SessionStore`] trait.
//! Reads and writes are not locked: concurrent requests on one session race
//! and the last save wins.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use moka::future::Cache;

use crate::error::SessionError;
use crate::smart::ClientState;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "smart_session";

/// Opaque session identifier carried in the cookie.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Mint a new random id.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Accept a cookie value only if it has the syntax of a minted id.
    ///
    /// Syntax is all that is checked; a well-formed id may still have been
    /// chosen by the client, which is why [`Session::rotate`] exists.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        uuid::Uuid::parse_str(value).ok().map(|u| Self(u.simple().to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Server-side storage of serialized client state.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Blob previously saved for this session.
    async fn load(&self, id: &SessionId) -> Option<Vec<u8>>;

    /// Replace the blob for this session.
    async fn save(&self, id: &SessionId, blob: Vec<u8>);

    /// Forget this session's blob.
    async fn remove(&self, id: &SessionId);
}

/// In-memory store with idle expiry.
#[derive(Clone)]
pub struct MemorySessionStore {
    cache: Cache<SessionId, Arc<Vec<u8>>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new(max_capacity: u64, time_to_idle: Duration) -> Self {
        let cache = Cache::builder().max_capacity(max_capacity).time_to_idle(time_to_idle).build();
        Self { cache }
    }

    /// Number of sessions currently stored (approximate).
    #[must_use]
    pub fn session_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, id: &SessionId) -> Option<Vec<u8>> {
        self.cache.get(id).await.map(|blob| blob.as_ref().clone())
    }

    async fn save(&self, id: &SessionId, blob: Vec<u8>) {
        self.cache.insert(id.clone(), Arc::new(blob)).await;
    }

    async fn remove(&self, id: &SessionId) {
        self.cache.invalidate(id).await;
    }
}

impl std::fmt::Debug for MemorySessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySessionStore").field("sessions", &self.session_count()).finish()
    }
}

/// The current request's session.
pub struct Session {
    id: SessionId,
    store: Arc<dyn SessionStore>,
}

impl Session {
    /// Bind to the session named by the request cookie, minting one if absent.
    ///
    /// The returned jar carries the `Set-Cookie` for a new id and must be
    /// part of the response.
    pub fn from_cookies(jar: CookieJar, store: Arc<dyn SessionStore>) -> (CookieJar, Self) {
        if let Some(id) = jar.get(SESSION_COOKIE).and_then(|c| SessionId::parse(c.value())) {
            return (jar, Self { id, store });
        }

        let id = SessionId::generate();
        tracing::debug!(session_id = %id, "New session");
        (jar.add(session_cookie(&id)), Self { id, store })
    }

    /// Move to a freshly minted id, dropping whatever the old id held.
    ///
    /// Called whenever a session starts or gains an authorization, so an id
    /// planted in the browser beforehand never ends up holding a token.
    pub async fn rotate(self, jar: CookieJar) -> (CookieJar, Self) {
        self.store.remove(&self.id).await;
        let id = SessionId::generate();
        tracing::debug!(old_session_id = %self.id, session_id = %id, "Rotated session id");
        (jar.add(session_cookie(&id)), Self { id, store: self.store })
    }

    /// Bind to a known session id.
    #[must_use]
    pub fn new(id: SessionId, store: Arc<dyn SessionStore>) -> Self {
        Self { id, store }
    }

    #[must_use]
    pub const fn id(&self) -> &SessionId {
        &self.id
    }

    /// Saved client state, if any.
    ///
    /// # Errors
    ///
    /// Returns error if the stored blob does not deserialize.
    pub async fn load(&self) -> Result<Option<ClientState>, SessionError> {
        match self.store.load(&self.id).await {
            Some(blob) => ClientState::from_bytes(&blob).map(Some),
            None => Ok(None),
        }
    }

    /// Persist client state.
    ///
    /// # Errors
    ///
    /// Returns error if the state does not serialize.
    pub async fn save(&self, state: &ClientState) -> Result<(), SessionError> {
        let blob = state.to_bytes()?;
        self.store.save(&self.id, blob).await;
        tracing::debug!(session_id = %self.id, "Saved session state");
        Ok(())
    }

    /// Delete saved client state.
    pub async fn reset(&self) {
        self.store.remove(&self.id).await;
        tracing::debug!(session_id = %self.id, "Reset session state");
    }
}

fn session_cookie(id: &SessionId) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, id.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("id", &self.id).finish()
    }
}
