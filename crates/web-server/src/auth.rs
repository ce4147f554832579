use crate::AppState;
use crate::error::AppError;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockWriteGuard};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Idle time after which a session stops authenticating.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(12 * 60 * 60);

#[derive(Debug, Clone, Copy)]
struct Session {
    user_id: i64,
    last_seen: Instant,
}

/// In-memory bearer sessions: token -> user id. A session expires once it
/// has been idle for longer than the store's timeout.
#[derive(Debug)]
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, Session>>,
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
            sessions: RwLock::new(HashMap::new()),
            idle_timeout,
        }
    }

    pub fn open(&self, user_id: i64) -> Uuid {
        let token = Uuid::new_v4();
        let now = Instant::now();
        let mut sessions = self.write();
        sessions.retain(|_, s| now.duration_since(s.last_seen) <= self.idle_timeout);
        sessions.insert(
            token,
            Session {
                user_id,
                last_seen: now,
            },
        );
        token
    }

    /// Resolves a token and refreshes its idle clock. Expired tokens are dropped.
    pub fn user_for(&self, token: &Uuid) -> Option<i64> {
        let now = Instant::now();
        let mut sessions = self.write();
        let session = sessions.get_mut(token)?;
        if now.duration_since(session.last_seen) > self.idle_timeout {
            sessions.remove(token);
            return None;
        }
        session.last_seen = now;
        Some(session.user_id)
    }

    pub fn close(&self, token: &Uuid) -> bool {
        self.write().remove(token).is_some()
    }

    /// Drops every session, e.g. after the user table was replaced.
    pub fn clear(&self) -> usize {
        let mut sessions = self.write();
        let count = sessions.len();
        sessions.clear();
        count
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Uuid, Session>> {
        self.sessions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn bearer_token(parts: &Parts) -> Option<Uuid> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?;
    Uuid::parse_str(token.trim()).ok()
}

/// The authenticated caller, resolved from the `Authorization` header.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser {
    pub user_id: i64,
    pub token: Uuid,
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(AppError::Unauthorized)?;
        let user_id = state
            .sessions
            .user_for(&token)
            .ok_or(AppError::Unauthorized)?;
        Ok(CurrentUser { user_id, token })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sessions_open_close_and_clear() {
        let store = SessionStore::new();
        let a = store.open(1);
        let b = store.open(2);
        assert_eq!(store.user_for(&a), Some(1));
        assert!(store.close(&a));
        assert!(!store.close(&a));
        assert_eq!(store.user_for(&a), None);
        assert_eq!(store.clear(), 1);
        assert_eq!(store.user_for(&b), None);
    }

    #[test]
    fn idle_sessions_expire_and_active_ones_are_refreshed() {
        let store = SessionStore::with_idle_timeout(Duration::from_millis(500));
        let idle = store.open(1);
        let active = store.open(2);

        for _ in 0..4 {
            std::thread::sleep(Duration::from_millis(200));
            assert_eq!(store.user_for(&active), Some(2));
        }
        assert_eq!(store.user_for(&idle), None);
        assert!(!store.close(&idle));
        assert_eq!(store.user_for(&active), Some(2));
    }

    #[test]
    fn opening_a_session_prunes_expired_ones() {
        let store = SessionStore::with_idle_timeout(Duration::from_millis(10));
        store.open(1);
        store.open(1);
        std::thread::sleep(Duration::from_millis(30));
        store.open(1);
        assert_eq!(store.clear(), 1);
    }
}
