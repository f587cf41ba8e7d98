//! In-process [`UserStore`] + [`SessionStore`].
//!
//! Mirrors the Postgres schema rules that the auth layer relies on: unique
//! email, unique external id, unique refresh token hash, and cascading session
//! removal when a user is deleted. Used by tests and for running the API
//! without a database.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use deepguard_core::types::{DbId, Timestamp};
use deepguard_core::users::INITIAL_TOKEN_VERSION;
use tokio::sync::Mutex;

use crate::models::session::{CreateSession, RotateSession, UserSession};
use crate::models::user::{CreateUser, UpdateUser, User};
use crate::store::{SessionStore, StoreError, UserStore};

#[derive(Default)]
struct Tables {
    users: BTreeMap<DbId, User>,
    sessions: BTreeMap<DbId, UserSession>,
    next_user_id: DbId,
    next_session_id: DbId,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with [`StoreError::Unavailable`]
    /// (or succeed again with `false`).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// All sessions currently held for a user.
    pub async fn sessions_for_user(&self, user_id: DbId) -> Vec<UserSession> {
        self.tables
            .lock()
            .await
            .sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect()
    }

    pub async fn session_count(&self) -> usize {
        self.tables.lock().await.sessions.len()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        self.check_available()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.check_available()?;
        let tables = self.tables.lock().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_id(&self, id: DbId) -> Result<Option<User>, StoreError> {
        self.check_available()?;
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn find_user_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<User>, StoreError> {
        self.check_available()?;
        let tables = self.tables.lock().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.google_id.as_deref() == Some(external_id))
            .cloned())
    }

    async fn insert_user(&self, input: &CreateUser) -> Result<User, StoreError> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;
        if tables.users.values().any(|u| u.email == input.email) {
            return Err(StoreError::Conflict("uq_users_email".into()));
        }
        if let Some(google_id) = &input.google_id {
            if tables
                .users
                .values()
                .any(|u| u.google_id.as_ref() == Some(google_id))
            {
                return Err(StoreError::Conflict("uq_users_google_id".into()));
            }
        }

        tables.next_user_id += 1;
        let now = Utc::now();
        let user = User {
            id: tables.next_user_id,
            email: input.email.clone(),
            name: input.name.clone(),
            password_hash: input.password_hash.clone(),
            google_id: input.google_id.clone(),
            avatar_url: input.avatar_url.clone(),
            token_version: INITIAL_TOKEN_VERSION,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_user(&self, id: DbId, input: &UpdateUser) -> Result<Option<User>, StoreError> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;
        if let Some(google_id) = &input.google_id {
            if tables
                .users
                .values()
                .any(|u| u.id != id && u.google_id.as_ref() == Some(google_id))
            {
                return Err(StoreError::Conflict("uq_users_google_id".into()));
            }
        }
        let Some(user) = tables.users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = &input.name {
            user.name = name.clone();
        }
        if let Some(hash) = &input.password_hash {
            user.password_hash = Some(hash.clone());
        }
        if let Some(google_id) = &input.google_id {
            user.google_id = Some(google_id.clone());
        }
        if let Some(avatar) = &input.avatar_url {
            user.avatar_url = Some(avatar.clone());
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn increment_token_version(&self, id: DbId) -> Result<Option<i32>, StoreError> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;
        Ok(tables.users.get_mut(&id).map(|user| {
            user.token_version += 1;
            user.updated_at = Utc::now();
            user.token_version
        }))
    }

    async fn delete_user(&self, id: DbId) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;
        let existed = tables.users.remove(&id).is_some();
        if existed {
            tables.sessions.retain(|_, s| s.user_id != id);
        }
        Ok(existed)
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert_session(&self, input: &CreateSession) -> Result<UserSession, StoreError> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;
        if tables
            .sessions
            .values()
            .any(|s| s.refresh_token_hash == input.refresh_token_hash)
        {
            return Err(StoreError::Conflict(
                "uq_user_sessions_refresh_token_hash".into(),
            ));
        }

        tables.next_session_id += 1;
        let now = Utc::now();
        let session = UserSession {
            id: tables.next_session_id,
            user_id: input.user_id,
            refresh_token_hash: input.refresh_token_hash.clone(),
            token_version_snapshot: input.token_version_snapshot,
            user_agent: input.user_agent.clone(),
            ip_address: input.ip_address.clone(),
            expires_at: input.expires_at,
            created_at: now,
            updated_at: now,
        };
        tables.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn find_session_by_hash(
        &self,
        hash: &str,
        user_id: Option<DbId>,
    ) -> Result<Option<UserSession>, StoreError> {
        self.check_available()?;
        let tables = self.tables.lock().await;
        Ok(tables
            .sessions
            .values()
            .find(|s| s.refresh_token_hash == hash && user_id.map_or(true, |id| s.user_id == id))
            .cloned())
    }

    async fn replace_session_token(
        &self,
        id: DbId,
        expected_hash: &str,
        input: &RotateSession,
    ) -> Result<Option<UserSession>, StoreError> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;
        let Some(session) = tables.sessions.get_mut(&id) else {
            return Ok(None);
        };
        if session.refresh_token_hash != expected_hash {
            return Ok(None);
        }
        session.refresh_token_hash = input.refresh_token_hash.clone();
        session.token_version_snapshot = input.token_version_snapshot;
        session.expires_at = input.expires_at;
        session.user_agent = input.user_agent.clone();
        session.ip_address = input.ip_address.clone();
        session.updated_at = Utc::now();
        Ok(Some(session.clone()))
    }

    async fn delete_session_by_id(&self, id: DbId) -> Result<bool, StoreError> {
        self.check_available()?;
        Ok(self.tables.lock().await.sessions.remove(&id).is_some())
    }

    async fn delete_sessions_by_user_id(&self, user_id: DbId) -> Result<u64, StoreError> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;
        let before = tables.sessions.len();
        tables.sessions.retain(|_, s| s.user_id != user_id);
        Ok((before - tables.sessions.len()) as u64)
    }

    async fn delete_session_by_hash(&self, hash: &str) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;
        let before = tables.sessions.len();
        tables.sessions.retain(|_, s| s.refresh_token_hash != hash);
        Ok(tables.sessions.len() < before)
    }

    async fn delete_expired_sessions(&self, now: Timestamp) -> Result<u64, StoreError> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;
        let before = tables.sessions.len();
        tables.sessions.retain(|_, s| !s.is_expired(now));
        Ok((before - tables.sessions.len()) as u64)
    }
}
