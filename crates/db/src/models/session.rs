//! User session model and DTOs.

use deepguard_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A user session row from the `user_sessions` table.
#[derive(Debug, Clone, FromRow)]
pub struct UserSession {
    pub id: DbId,
    pub user_id: DbId,
    /// SHA-256 hex digest of the raw refresh token.
    pub refresh_token_hash: String,
    /// `users.token_version` at the time the token was issued.
    pub token_version_snapshot: i32,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub expires_at: Timestamp,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl UserSession {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at < now
    }
}

/// DTO for creating a new user session.
#[derive(Debug, Clone)]
pub struct CreateSession {
    pub user_id: DbId,
    pub refresh_token_hash: String,
    pub token_version_snapshot: i32,
    pub expires_at: Timestamp,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

/// DTO for swapping a session over to a freshly rotated refresh token.
#[derive(Debug, Clone)]
pub struct RotateSession {
    pub refresh_token_hash: String,
    pub token_version_snapshot: i32,
    pub expires_at: Timestamp,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}
