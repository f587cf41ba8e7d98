//! Session manager: creation, rotation and revocation of refresh-token sessions.
//!
//! One session row exists per outstanding refresh token, keyed by the token's
//! SHA-256 digest. Revoke-all is a `token_version` bump; deleting the rows is
//! cleanup that may lag behind without weakening the revocation.

use std::sync::Arc;

use deepguard_core::types::{DbId, Timestamp};
use deepguard_db::models::session::{CreateSession, RotateSession, UserSession};
use deepguard_db::models::user::User;
use deepguard_db::{SessionStore, StoreError, UserStore};

use crate::auth::jwt::{hash_refresh_token, TokenCodec, TokenSubject};

/// Request metadata recorded on sessions for audit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

/// A freshly minted token pair to hand back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Token signing failed: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    /// The session was rotated or deleted by someone else.
    #[error("Session not found")]
    NotFound,
}

pub struct SessionManager {
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn SessionStore>,
    codec: Arc<TokenCodec>,
}

impl SessionManager {
    pub fn new(
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionStore>,
        codec: Arc<TokenCodec>,
    ) -> Self {
        Self {
            users,
            sessions,
            codec,
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn users(&self) -> &dyn UserStore {
        self.users.as_ref()
    }

    pub fn sessions(&self) -> &dyn SessionStore {
        self.sessions.as_ref()
    }

    /// Issue an access + refresh pair for `user` and persist the session.
    pub async fn issue_for(
        &self,
        user: &User,
        ctx: &RequestContext,
        now: Timestamp,
    ) -> Result<IssuedTokens, SessionError> {
        let subject = subject_of(user);
        let access_token = self.codec.issue_access(&subject, now)?;
        let refresh_token = self.codec.issue_refresh(&subject, now)?;

        self.create_session(user, &refresh_token, ctx, now).await?;

        Ok(IssuedTokens {
            access_token,
            refresh_token,
        })
    }

    /// Persist a session for `raw_refresh_token`, snapshotting the user's
    /// current `token_version`.
    pub async fn create_session(
        &self,
        user: &User,
        raw_refresh_token: &str,
        ctx: &RequestContext,
        now: Timestamp,
    ) -> Result<UserSession, SessionError> {
        let input = CreateSession {
            user_id: user.id,
            refresh_token_hash: hash_refresh_token(raw_refresh_token),
            token_version_snapshot: user.token_version,
            expires_at: now + self.codec.config().refresh_ttl(),
            user_agent: ctx.user_agent.clone(),
            ip_address: ctx.ip_address.clone(),
        };
        let session = self.sessions.insert_session(&input).await?;

        tracing::info!(user_id = user.id, session_id = session.id, "Session created");
        Ok(session)
    }

    /// Swap `session` over to a new refresh token and mint a new access token.
    ///
    /// The swap only applies while the row still holds the digest of
    /// `old_raw_refresh_token`; if a concurrent request rotated it first this
    /// returns [`SessionError::NotFound`] and issues nothing.
    pub async fn rotate(
        &self,
        session: &UserSession,
        old_raw_refresh_token: &str,
        user: &User,
        ctx: &RequestContext,
        now: Timestamp,
    ) -> Result<IssuedTokens, SessionError> {
        let subject = subject_of(user);
        let refresh_token = self.codec.issue_refresh(&subject, now)?;

        let input = RotateSession {
            refresh_token_hash: hash_refresh_token(&refresh_token),
            token_version_snapshot: user.token_version,
            expires_at: now + self.codec.config().refresh_ttl(),
            user_agent: ctx.user_agent.clone(),
            ip_address: ctx.ip_address.clone(),
        };
        let expected = hash_refresh_token(old_raw_refresh_token);
        self.sessions
            .replace_session_token(session.id, &expected, &input)
            .await?
            .ok_or(SessionError::NotFound)?;

        let access_token = self.codec.issue_access(&subject, now)?;

        tracing::debug!(user_id = user.id, session_id = session.id, "Session rotated");
        Ok(IssuedTokens {
            access_token,
            refresh_token,
        })
    }

    /// Delete the session belonging to `raw_refresh_token`, if any.
    pub async fn revoke_one(&self, raw_refresh_token: &str) -> Result<bool, SessionError> {
        let removed = self
            .sessions
            .delete_session_by_hash(&hash_refresh_token(raw_refresh_token))
            .await?;
        Ok(removed)
    }

    /// Invalidate every outstanding token of `user_id`.
    ///
    /// Returns the new `token_version`, or `None` if the user does not exist.
    /// Once the bump succeeds the call succeeds; failing to delete the rows
    /// is only logged since stale rows no longer match the user's version.
    pub async fn revoke_all(&self, user_id: DbId) -> Result<Option<i32>, SessionError> {
        let Some(version) = self.users.increment_token_version(user_id).await? else {
            return Ok(None);
        };

        match self.sessions.delete_sessions_by_user_id(user_id).await {
            Ok(deleted) => {
                tracing::info!(user_id, token_version = version, deleted, "All sessions revoked");
            }
            Err(e) => {
                tracing::warn!(
                    user_id,
                    token_version = version,
                    error = %e,
                    "Token version bumped but session cleanup failed",
                );
            }
        }
        Ok(Some(version))
    }

    /// Delete every session row of `user_id`, logging instead of failing.
    pub async fn purge_user_sessions(&self, user_id: DbId) {
        if let Err(e) = self.sessions.delete_sessions_by_user_id(user_id).await {
            tracing::warn!(user_id, error = %e, "Failed to purge sessions");
        }
    }
}

/// The token subject for a user's current state.
pub fn subject_of(user: &User) -> TokenSubject {
    TokenSubject {
        user_id: user.id,
        email: user.email.clone(),
        token_version: user.token_version,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use deepguard_db::MemoryStore;

    use crate::auth::jwt::TokenKind;
    use crate::auth::testing::{context, insert_user, manager, now};

    #[tokio::test]
    async fn issue_for_persists_hashed_session_with_snapshot() {
        let store = Arc::new(MemoryStore::new());
        let sessions = manager(&store);
        let user = insert_user(&store, "a@b.com", None).await;
        let now = now();

        let tokens = sessions.issue_for(&user, &context(), now).await.unwrap();

        let rows = store.sessions_for_user(user.id).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].refresh_token_hash, hash_refresh_token(&tokens.refresh_token));
        assert_ne!(rows[0].refresh_token_hash, tokens.refresh_token);
        assert_eq!(rows[0].token_version_snapshot, 1);
        assert_eq!(rows[0].user_agent.as_deref(), Some("unit-test"));
        assert_eq!(rows[0].expires_at, now + chrono::Duration::days(30));

        let subject = sessions
            .codec()
            .verify(TokenKind::Access, &tokens.access_token, now)
            .unwrap();
        assert_eq!(subject.token_version, 1);
        assert_eq!(subject.user_id, user.id);
    }

    #[tokio::test]
    async fn rotate_replaces_digest_and_rejects_replay() {
        let store = Arc::new(MemoryStore::new());
        let sessions = manager(&store);
        let user = insert_user(&store, "a@b.com", None).await;
        let now = now();

        let first = sessions.issue_for(&user, &context(), now).await.unwrap();
        let session = store.sessions_for_user(user.id).await.remove(0);

        let second = sessions
            .rotate(&session, &first.refresh_token, &user, &context(), now)
            .await
            .unwrap();
        assert_ne!(first.refresh_token, second.refresh_token);

        let old = store
            .find_session_by_hash(&hash_refresh_token(&first.refresh_token), None)
            .await
            .unwrap();
        assert!(old.is_none());
        assert_eq!(store.session_count().await, 1);

        assert_matches!(
            sessions
                .rotate(&session, &first.refresh_token, &user, &context(), now)
                .await,
            Err(SessionError::NotFound)
        );
    }

    #[tokio::test]
    async fn revoke_one_removes_only_matching_session() {
        let store = Arc::new(MemoryStore::new());
        let sessions = manager(&store);
        let user = insert_user(&store, "a@b.com", None).await;

        let a = sessions.issue_for(&user, &context(), now()).await.unwrap();
        let _b = sessions.issue_for(&user, &context(), now()).await.unwrap();

        assert!(sessions.revoke_one(&a.refresh_token).await.unwrap());
        assert!(!sessions.revoke_one(&a.refresh_token).await.unwrap());
        assert_eq!(store.sessions_for_user(user.id).await.len(), 1);
    }

    #[tokio::test]
    async fn revoke_all_bumps_version_and_clears_rows() {
        let store = Arc::new(MemoryStore::new());
        let sessions = manager(&store);
        let user = insert_user(&store, "a@b.com", None).await;

        sessions.issue_for(&user, &context(), now()).await.unwrap();
        sessions.issue_for(&user, &context(), now()).await.unwrap();

        assert_eq!(sessions.revoke_all(user.id).await.unwrap(), Some(2));
        assert!(store.sessions_for_user(user.id).await.is_empty());
        assert_eq!(sessions.revoke_all(user.id + 99).await.unwrap(), None);
    }
}
