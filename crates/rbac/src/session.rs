//! Session lifecycle (spec §4.4, §4.9 "session states")
//!
//! A session is persisted as an entity (`type:session`) so it survives a
//! restart and shows up in `GetEntityHistory`, but validation never goes
//! through the repository: [`SessionStore`] keeps a hot `token -> Session`
//! map behind its own latch (spec §5: "the session map uses its own
//! reader/writer latch"), so every authenticated request pays one
//! `DashMap` lookup, not an EBF read.

use base64::Engine;
use dashmap::DashMap;
use entitydb_core::{EntityId, Error, Tag, Timestamp};
use entitydb_engine::Repository;
use rand::rngs::OsRng;
use rand::RngCore;

const TOKEN_BYTES: usize = 32;

/// A live session: the user it authenticates as, their roles, and when it
/// expires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// The bearer token. Also the backing entity's id.
    pub token: String,
    /// The user this session authenticates.
    pub user_id: EntityId,
    /// Cached for `/auth/whoami` without a second entity fetch.
    pub username: String,
    /// Cached `rbac:` role/perm bare tags at mint time.
    pub roles: Vec<String>,
    /// Absolute expiry.
    pub expires_at: Timestamp,
}

impl Session {
    fn is_expired(&self, now: Timestamp) -> bool {
        now > self.expires_at
    }
}

fn mint_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Session lifecycle manager: mints tokens, persists session entities, and
/// serves fast in-memory lookups.
pub struct SessionStore {
    sessions: DashMap<String, Session>,
    ttl_nanos: i64,
}

impl SessionStore {
    /// Build a store whose sessions live for `ttl_seconds` from mint/refresh.
    pub fn new(ttl_seconds: i64) -> Self {
        SessionStore {
            sessions: DashMap::new(),
            ttl_nanos: ttl_seconds.saturating_mul(1_000_000_000),
        }
    }

    /// Mint a session for `user_id`, persist the backing entity, and cache
    /// it. Spec §12.3 decision: every mint draws fresh bytes from
    /// `OsRng` — no placeholder tokens.
    pub fn create_session(
        &self,
        repo: &Repository,
        user_id: &EntityId,
        username: &str,
        roles: Vec<String>,
    ) -> Result<Session, Error> {
        let now = Timestamp::now();
        let expires_at = Timestamp::from_nanos(now.as_nanos() + self.ttl_nanos);
        let token = mint_token();

        repo.create_with_id(
            EntityId::from(token.as_str()),
            vec![
                Tag::new(now, "type:session")?,
                Tag::new(now, "dataset:system")?,
                Tag::new(now, &format!("user:{user_id}"))?,
                Tag::new(now, &format!("expires:{}", expires_at.to_rfc3339()))?,
            ],
            Vec::new(),
        )?;

        let session = Session {
            token: token.clone(),
            user_id: user_id.clone(),
            username: username.to_string(),
            roles,
            expires_at,
        };
        self.sessions.insert(token, session.clone());
        Ok(session)
    }

    /// Look up a session by bearer token, rejecting missing or expired ones.
    pub fn get_session(&self, token: &str) -> Result<Session, Error> {
        let session = self
            .sessions
            .get(token)
            .ok_or_else(|| Error::Unauthorized("unknown session token".into()))?
            .clone();
        if session.is_expired(Timestamp::now()) {
            self.sessions.remove(token);
            return Err(Error::Unauthorized("session expired".into()));
        }
        Ok(session)
    }

    /// Extend `ExpiresAt` and mint a fresh token, persisting both changes
    /// (spec §4.9: `active -> refreshed`).
    pub fn refresh_session(&self, repo: &Repository, token: &str) -> Result<Session, Error> {
        let mut session = self.get_session(token)?;
        let now = Timestamp::now();
        session.expires_at = Timestamp::from_nanos(now.as_nanos() + self.ttl_nanos);
        let new_token = mint_token();

        repo.update(
            &EntityId::from(token),
            vec![Tag::new(now, &format!("expires:{}", session.expires_at.to_rfc3339()))?],
        )?;
        repo.create_with_id(
            EntityId::from(new_token.as_str()),
            vec![
                Tag::new(now, "type:session")?,
                Tag::new(now, "dataset:system")?,
                Tag::new(now, &format!("user:{}", session.user_id))?,
                Tag::new(now, &format!("expires:{}", session.expires_at.to_rfc3339()))?,
            ],
            Vec::new(),
        )?;

        self.sessions.remove(token);
        session.token = new_token.clone();
        self.sessions.insert(new_token, session.clone());
        Ok(session)
    }

    /// Remove a session from the hot map and soft-delete its backing entity.
    pub fn invalidate(&self, repo: &Repository, token: &str) -> Result<(), Error> {
        self.sessions.remove(token);
        repo.delete(&EntityId::from(token))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entitydb_engine::EngineConfig;
    use tempfile::TempDir;

    fn repo() -> Repository {
        let dir = TempDir::new().unwrap().into_path();
        let config = EngineConfig {
            data_path: dir,
            ..EngineConfig::default()
        };
        Repository::open(config).unwrap()
    }

    #[test]
    fn create_then_get_round_trips() {
        let repo = repo();
        let store = SessionStore::new(3600);
        let session = store
            .create_session(&repo, &EntityId::from("u1"), "alice", vec!["rbac:role:admin".into()])
            .unwrap();
        assert!(session.token.len() >= 32);

        let fetched = store.get_session(&session.token).unwrap();
        assert_eq!(fetched.username, "alice");
    }

    #[test]
    fn expired_sessions_are_rejected() {
        let repo = repo();
        let store = SessionStore::new(-1);
        let session = store
            .create_session(&repo, &EntityId::from("u1"), "alice", vec![])
            .unwrap();
        assert!(store.get_session(&session.token).is_err());
    }

    #[test]
    fn refresh_issues_a_new_token() {
        let repo = repo();
        let store = SessionStore::new(3600);
        let session = store
            .create_session(&repo, &EntityId::from("u1"), "alice", vec![])
            .unwrap();
        let refreshed = store.refresh_session(&repo, &session.token).unwrap();
        assert_ne!(refreshed.token, session.token);
        assert!(store.get_session(&session.token).is_err());
        assert!(store.get_session(&refreshed.token).is_ok());
    }

    #[test]
    fn invalidate_removes_from_map_and_soft_deletes_entity() {
        let repo = repo();
        let store = SessionStore::new(3600);
        let session = store
            .create_session(&repo, &EntityId::from("u1"), "alice", vec![])
            .unwrap();
        store.invalidate(&repo, &session.token).unwrap();
        assert!(store.get_session(&session.token).is_err());
        assert!(repo.get_by_id(&EntityId::from(session.token.as_str()), false).is_err());
    }
}
