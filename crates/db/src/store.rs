//! Storage seams used by the auth layer.
//!
//! [`UserStore`] is the credential store (the `users` table) and
//! [`SessionStore`] the session store (the `user_sessions` table). Both return
//! `Ok(None)` / `Ok(false)` for "not found" and reserve `Err` for faults.

use async_trait::async_trait;
use deepguard_core::types::{DbId, Timestamp};

use crate::models::session::{CreateSession, RotateSession, UserSession};
use crate::models::user::{CreateUser, UpdateUser, User};
use crate::repositories::{SessionRepo, UserRepo};
use crate::DbPool;

/// PostgreSQL SQLSTATE for unique constraint violations.
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Any database failure other than a uniqueness conflict.
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// A unique constraint rejected the write; carries the constraint name.
    #[error("Duplicate value violates unique constraint: {0}")]
    Conflict(String),

    /// The backing store could not be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
                let constraint = db_err.constraint().unwrap_or("unknown").to_string();
                return StoreError::Conflict(constraint);
            }
        }
        StoreError::Database(err)
    }
}

/// Credential store: account lookup and single-row updates.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Cheap reachability probe for health reporting.
    async fn health_check(&self) -> Result<(), StoreError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_user_by_id(&self, id: DbId) -> Result<Option<User>, StoreError>;

    async fn find_user_by_external_id(&self, external_id: &str)
        -> Result<Option<User>, StoreError>;

    /// Insert a user with `token_version = 1`. Duplicate email or external id
    /// yields [`StoreError::Conflict`].
    async fn insert_user(&self, input: &CreateUser) -> Result<User, StoreError>;

    async fn update_user(&self, id: DbId, input: &UpdateUser) -> Result<Option<User>, StoreError>;

    /// Atomically increment `token_version`; returns the new value.
    async fn increment_token_version(&self, id: DbId) -> Result<Option<i32>, StoreError>;

    /// Delete a user and, with it, every session the user owns.
    async fn delete_user(&self, id: DbId) -> Result<bool, StoreError>;
}

/// Session store: one row per outstanding refresh token.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert_session(&self, input: &CreateSession) -> Result<UserSession, StoreError>;

    async fn find_session_by_hash(
        &self,
        hash: &str,
        user_id: Option<DbId>,
    ) -> Result<Option<UserSession>, StoreError>;

    /// Replace the token of session `id`, but only if it still holds
    /// `expected_hash`. `Ok(None)` means another writer got there first.
    async fn replace_session_token(
        &self,
        id: DbId,
        expected_hash: &str,
        input: &RotateSession,
    ) -> Result<Option<UserSession>, StoreError>;

    async fn delete_session_by_id(&self, id: DbId) -> Result<bool, StoreError>;

    async fn delete_sessions_by_user_id(&self, user_id: DbId) -> Result<u64, StoreError>;

    async fn delete_session_by_hash(&self, hash: &str) -> Result<bool, StoreError>;

    async fn delete_expired_sessions(&self, now: Timestamp) -> Result<u64, StoreError>;
}

/// Postgres-backed implementation of both stores.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        crate::health_check(&self.pool).await?;
        Ok(())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(UserRepo::find_by_email(&self.pool, email).await?)
    }

    async fn find_user_by_id(&self, id: DbId) -> Result<Option<User>, StoreError> {
        Ok(UserRepo::find_by_id(&self.pool, id).await?)
    }

    async fn find_user_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<User>, StoreError> {
        Ok(UserRepo::find_by_google_id(&self.pool, external_id).await?)
    }

    async fn insert_user(&self, input: &CreateUser) -> Result<User, StoreError> {
        Ok(UserRepo::create(&self.pool, input).await?)
    }

    async fn update_user(&self, id: DbId, input: &UpdateUser) -> Result<Option<User>, StoreError> {
        Ok(UserRepo::update(&self.pool, id, input).await?)
    }

    async fn increment_token_version(&self, id: DbId) -> Result<Option<i32>, StoreError> {
        Ok(UserRepo::increment_token_version(&self.pool, id).await?)
    }

    async fn delete_user(&self, id: DbId) -> Result<bool, StoreError> {
        Ok(UserRepo::delete(&self.pool, id).await?)
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn insert_session(&self, input: &CreateSession) -> Result<UserSession, StoreError> {
        Ok(SessionRepo::create(&self.pool, input).await?)
    }

    async fn find_session_by_hash(
        &self,
        hash: &str,
        user_id: Option<DbId>,
    ) -> Result<Option<UserSession>, StoreError> {
        Ok(SessionRepo::find_by_refresh_token_hash(&self.pool, hash, user_id).await?)
    }

    async fn replace_session_token(
        &self,
        id: DbId,
        expected_hash: &str,
        input: &RotateSession,
    ) -> Result<Option<UserSession>, StoreError> {
        Ok(SessionRepo::rotate(&self.pool, id, expected_hash, input).await?)
    }

    async fn delete_session_by_id(&self, id: DbId) -> Result<bool, StoreError> {
        Ok(SessionRepo::delete(&self.pool, id).await?)
    }

    async fn delete_sessions_by_user_id(&self, user_id: DbId) -> Result<u64, StoreError> {
        Ok(SessionRepo::delete_all_for_user(&self.pool, user_id).await?)
    }

    async fn delete_session_by_hash(&self, hash: &str) -> Result<bool, StoreError> {
        Ok(SessionRepo::delete_by_refresh_token_hash(&self.pool, hash).await?)
    }

    async fn delete_expired_sessions(&self, now: Timestamp) -> Result<u64, StoreError> {
        Ok(SessionRepo::cleanup_expired(&self.pool, now).await?)
    }
}
