//! ---
//! warden_section: "02-credential-auth"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Credential verification, tokens, sessions and role permissions."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use warden_common::principal::PrincipalId;

use crate::error::SessionError;

/// Bytes of entropy in a session id.
pub const SESSION_ID_BYTES: usize = 32;

/// Opaque per-session data owned by the host.
pub type SessionData = BTreeMap<String, serde_json::Value>;

/// Server-side session with a sliding expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// 256-bit random id, hex encoded.
    pub id: String,
    pub principal_id: PrincipalId,
    #[serde(default)]
    pub data: SessionData,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Log-safe prefix of a session id.
pub(crate) fn id_prefix(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn new_session_id() -> String {
    let mut bytes = [0u8; SESSION_ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Concurrent session map. Expired entries are removed when read or swept.
#[derive(Debug, Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    timeout: Duration,
}

impl SessionStore {
    pub fn new(timeout: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn create(&self, principal_id: &str, data: SessionData) -> Session {
        let now = Utc::now();
        let session = Session {
            id: new_session_id(),
            principal_id: principal_id.to_owned(),
            data,
            created_at: now,
            last_activity: now,
            expires_at: now + self.timeout,
        };
        self.sessions
            .write()
            .insert(session.id.clone(), session.clone());
        info!(
            session = id_prefix(&session.id),
            principal_id,
            "session created"
        );
        session
    }

    /// Return a live session and push its expiry to `now + timeout`.
    pub fn get(&self, session_id: &str) -> Result<Session, SessionError> {
        self.touch(session_id, |_| {})
    }

    /// Replace a live session's data; counts as activity.
    pub fn update_data(&self, session_id: &str, data: SessionData) -> Result<Session, SessionError> {
        self.touch(session_id, move |session| session.data = data)
    }

    fn touch(
        &self,
        session_id: &str,
        apply: impl FnOnce(&mut Session),
    ) -> Result<Session, SessionError> {
        let now = Utc::now();
        let mut sessions = self.sessions.write();
        let Some(session) = sessions.get_mut(session_id) else {
            return Err(SessionError::NotFound);
        };
        if session.is_expired_at(now) {
            sessions.remove(session_id);
            debug!(session = id_prefix(session_id), "expired session purged on read");
            return Err(SessionError::NotFound);
        }
        apply(session);
        session.last_activity = now;
        session.expires_at = now + self.timeout;
        Ok(session.clone())
    }

    pub fn remove(&self, session_id: &str) -> Result<Session, SessionError> {
        let removed = self
            .sessions
            .write()
            .remove(session_id)
            .ok_or(SessionError::NotFound)?;
        info!(
            session = id_prefix(session_id),
            principal_id = %removed.principal_id,
            "session removed"
        );
        Ok(removed)
    }

    /// Remove every session belonging to `principal_id`; returns how many were removed.
    pub fn remove_for_principal(&self, principal_id: &str) -> usize {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, session| session.principal_id != principal_id);
        let removed = before - sessions.len();
        if removed > 0 {
            info!(principal_id, removed, "sessions revoked for principal");
        }
        removed
    }

    /// Sweep expired sessions; returns how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired_at(now));
        let removed = before - sessions.len();
        if removed > 0 {
            debug!(removed, "expired sessions swept");
        }
        removed
    }

    /// Sessions that have not yet expired.
    pub fn active_count(&self) -> usize {
        let now = Utc::now();
        self.sessions
            .read()
            .values()
            .filter(|session| !session.is_expired_at(now))
            .count()
    }
}
