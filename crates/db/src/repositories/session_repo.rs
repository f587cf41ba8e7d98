//! Repository for the `user_sessions` table.

use deepguard_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::session::{CreateSession, RotateSession, UserSession};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, user_id, refresh_token_hash, token_version_snapshot, \
                        user_agent, ip_address, expires_at, created_at, updated_at";

/// Provides CRUD operations for user sessions.
pub struct SessionRepo;

impl SessionRepo {
    /// Insert a new session, returning the created row.
    pub async fn create(pool: &PgPool, input: &CreateSession) -> Result<UserSession, sqlx::Error> {
        let query = format!(
            "INSERT INTO user_sessions
                (user_id, refresh_token_hash, token_version_snapshot, expires_at, user_agent, ip_address)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, UserSession>(&query)
            .bind(input.user_id)
            .bind(&input.refresh_token_hash)
            .bind(input.token_version_snapshot)
            .bind(input.expires_at)
            .bind(&input.user_agent)
            .bind(&input.ip_address)
            .fetch_one(pool)
            .await
    }

    /// Find a session by its refresh token hash, optionally scoped to a user.
    ///
    /// Expired rows are returned too; callers decide what to do with them.
    pub async fn find_by_refresh_token_hash(
        pool: &PgPool,
        hash: &str,
        user_id: Option<DbId>,
    ) -> Result<Option<UserSession>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM user_sessions
             WHERE refresh_token_hash = $1
               AND ($2::BIGINT IS NULL OR user_id = $2)"
        );
        sqlx::query_as::<_, UserSession>(&query)
            .bind(hash)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// Point a session at a new refresh token.
    ///
    /// The update only applies while the row still carries `expected_hash`, so
    /// of two concurrent rotations of the same token exactly one matches.
    /// Returns `None` for the loser (or if the row is gone).
    pub async fn rotate(
        pool: &PgPool,
        id: DbId,
        expected_hash: &str,
        input: &RotateSession,
    ) -> Result<Option<UserSession>, sqlx::Error> {
        let query = format!(
            "UPDATE user_sessions SET
                refresh_token_hash = $3,
                token_version_snapshot = $4,
                expires_at = $5,
                user_agent = $6,
                ip_address = $7
             WHERE id = $1 AND refresh_token_hash = $2
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, UserSession>(&query)
            .bind(id)
            .bind(expected_hash)
            .bind(&input.refresh_token_hash)
            .bind(input.token_version_snapshot)
            .bind(input.expires_at)
            .bind(&input.user_agent)
            .bind(&input.ip_address)
            .fetch_optional(pool)
            .await
    }

    /// Delete a single session. Returns `true` if the row existed.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM user_sessions WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete the session holding the given refresh token hash.
    pub async fn delete_by_refresh_token_hash(
        pool: &PgPool,
        hash: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM user_sessions WHERE refresh_token_hash = $1")
            .bind(hash)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete all sessions for a user. Returns the count of deleted sessions.
    pub async fn delete_all_for_user(pool: &PgPool, user_id: DbId) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM user_sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete sessions that expired before `now`. Returns the count of deleted rows.
    pub async fn cleanup_expired(pool: &PgPool, now: Timestamp) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM user_sessions WHERE expires_at < $1")
            .bind(now)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
