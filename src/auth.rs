use async_trait::async_trait;
use dashmap::DashMap;
use log::debug;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::constants::DEFAULT_SESSION_TTL_MINUTES;
use crate::error::Result;

/// Identity of a signed-in admin, passed explicitly to every operation that needs it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub user_id: String,
    pub email: String,
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Email/password sign-in. Failures carry a human-readable `AdminError::Auth` message.
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session>;
}

struct Issued {
    session: Session,
    at: Instant,
}

/// Sessions of the admin server keyed by opaque bearer token.
///
/// A token stops resolving once it is older than the store's ttl.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<DashMap<String, Issued>>,
    ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_ttl(Duration::from_secs(DEFAULT_SESSION_TTL_MINUTES * 60))
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Store a session and return its new bearer token; expired sessions are dropped first
    pub fn open(&self, session: Session) -> String {
        self.prune();
        let token = uuid::Uuid::new_v4().simple().to_string();
        self.sessions.insert(
            token.clone(),
            Issued {
                session,
                at: Instant::now(),
            },
        );
        token
    }

    pub fn get(&self, token: &str) -> Option<Session> {
        {
            let issued = self.sessions.get(token)?;
            if issued.at.elapsed() < self.ttl {
                return Some(issued.session.clone());
            }
        }
        // the read guard is released above; removing while holding it would deadlock
        self.sessions
            .remove_if(token, |_, issued| issued.at.elapsed() >= self.ttl);
        None
    }

    /// Forget a token; returns whether it existed
    pub fn close(&self, token: &str) -> bool {
        self.sessions.remove(token).is_some()
    }

    /// Drop every expired session; returns how many were dropped
    pub fn prune(&self) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, issued| issued.at.elapsed() < self.ttl);
        let dropped = before.saturating_sub(self.sessions.len());
        if dropped > 0 {
            debug!("Dropped {} expired session(s)", dropped);
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
