//! User entity model and DTOs.

use deepguard_core::types::{DbId, Timestamp};
use deepguard_core::users::avatar_or_fallback;
use serde::Serialize;
use sqlx::FromRow;

/// Full user row from the `users` table.
///
/// Contains the password hash -- NEVER serialize this to API responses directly.
/// Use [`UserResponse`] for external-facing output.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: DbId,
    /// Normalized (trimmed, lowercase) and unique.
    pub email: String,
    pub name: String,
    /// `None` for accounts that only sign in through the identity provider.
    pub password_hash: Option<String>,
    /// Identity-provider subject id, unique when present.
    pub google_id: Option<String>,
    pub avatar_url: Option<String>,
    /// Bumped by revoke-all; tokens embedding an older value are dead.
    pub token_version: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Safe user representation for API responses (no password hash).
#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub id: DbId,
    pub name: String,
    pub email: String,
    /// Stored avatar or the generated fallback.
    #[serde(rename = "profilePicture")]
    pub profile_picture: String,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            profile_picture: avatar_or_fallback(user.avatar_url.as_deref(), &user.email),
        }
    }
}

/// DTO for creating a new user. `token_version` always starts at 1.
#[derive(Debug, Clone, Default)]
pub struct CreateUser {
    pub email: String,
    pub name: String,
    pub password_hash: Option<String>,
    pub google_id: Option<String>,
    pub avatar_url: Option<String>,
}

/// DTO for updating an existing user. Only `Some` fields are applied.
#[derive(Debug, Clone, Default)]
pub struct UpdateUser {
    pub name: Option<String>,
    pub password_hash: Option<String>,
    pub google_id: Option<String>,
    pub avatar_url: Option<String>,
}
