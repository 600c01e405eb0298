use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use dashmap::DashMap;
use rand::{rngs::OsRng, RngCore};
use tracing::{debug, info};

use crate::config::SESSION_REAPER_INTERVAL_SECS;

#[derive(Debug, Clone)]
struct Session {
    user_id: i64,
    expires_at: Instant,
}

/// Login sessions keyed by bearer token. Lives in memory only: a restart
/// logs everyone out.
pub struct SessionStore {
    sessions: DashMap<String, Session>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            sessions: DashMap::new(),
            ttl,
        })
    }

    /// Open a session for `user_id` and return its token (256 random bits, URL-safe base64).
    pub fn create(&self, user_id: i64) -> String {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        let token = URL_SAFE_NO_PAD.encode(bytes);
        self.sessions.insert(
            token.clone(),
            Session {
                user_id,
                expires_at: Instant::now() + self.ttl,
            },
        );
        debug!(user_id, "Session opened");
        token
    }

    /// User behind a live token. Expired tokens are dropped on sight.
    pub fn resolve(&self, token: &str) -> Option<i64> {
        let session = self.sessions.get(token)?;
        if session.expires_at > Instant::now() {
            return Some(session.user_id);
        }
        drop(session);
        self.sessions.remove(token);
        None
    }

    pub fn revoke(&self, token: &str) {
        self.sessions.remove(token);
    }

    /// Drop every session belonging to `user_id`. Returns how many were removed.
    pub fn revoke_user(&self, user_id: i64) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.user_id != user_id);
        before.saturating_sub(self.sessions.len())
    }

    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.expires_at > now);
        before.saturating_sub(self.sessions.len())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Background task that sweeps expired sessions on a fixed interval.
    pub async fn run_reaper(self: Arc<Self>) {
        let mut interval = tokio::time::interval(Duration::from_secs(SESSION_REAPER_INTERVAL_SECS));
        interval.tick().await; // consume immediate first tick

        loop {
            interval.tick().await;
            let purged = self.purge_expired();
            if purged > 0 {
                info!(purged, active = self.len(), "Expired sessions purged");
            }
        }
    }
}
