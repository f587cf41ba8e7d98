//! The authentication gate: per-request trust decision.
//!
//! [`AuthGate::evaluate`] is a function of the presented tokens, the clock and
//! persisted state. It either accepts with a resolved [`Identity`] or rejects
//! with a [`RejectCode`], and may hand back a rotated token pair for the
//! transport layer to deliver.
//!
//! ```text
//! no tokens                         -> NO_TOKENS
//! access valid                      -> resolve identity
//! access forged / malformed         -> INVALID_ACCESS   (never falls back to refresh)
//! access expired, no refresh        -> AUTH_FAILED
//! access absent or expired + refresh:
//!   refresh bad / expired           -> INVALID_REFRESH
//!   no session for (digest, user)   -> REFRESH_NOT_FOUND
//!   session past expires_at         -> SESSION_EXPIRED        (row deleted)
//!   user gone                       -> USER_NOT_FOUND
//!   version drift                   -> TOKEN_VERSION_MISMATCH (all rows deleted)
//!   otherwise                       -> rotate, accept
//! any store / signing fault         -> SERVER_ERROR
//! ```

use std::sync::Arc;

use deepguard_core::types::{DbId, Timestamp};
use deepguard_core::users::avatar_or_fallback;
use deepguard_db::models::user::User;
use deepguard_db::StoreError;

use crate::auth::jwt::{hash_refresh_token, TokenError, TokenKind, TokenSubject};
use crate::auth::session::{IssuedTokens, RequestContext, SessionError, SessionManager};
use crate::auth::RejectCode;

/// Tokens as presented by the client. Empty strings count as absent.
#[derive(Debug, Clone, Default)]
pub struct PresentedTokens {
    pub access: Option<String>,
    pub refresh: Option<String>,
}

/// The resolved caller, attached to the request on acceptance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: DbId,
    pub name: String,
    pub email: String,
    /// Stored avatar or the generated fallback.
    pub avatar_url: String,
    pub token_version: i32,
}

impl From<&User> for Identity {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            avatar_url: avatar_or_fallback(user.avatar_url.as_deref(), &user.email),
            token_version: user.token_version,
        }
    }
}

/// Result of one gate evaluation.
#[derive(Debug)]
pub struct GateOutcome {
    pub decision: Result<Identity, RejectCode>,
    /// Set only when the refresh path rotated the session.
    pub issued: Option<IssuedTokens>,
}

enum Denial {
    Reject(RejectCode),
    Fault(String),
}

impl From<RejectCode> for Denial {
    fn from(code: RejectCode) -> Self {
        Denial::Reject(code)
    }
}

impl From<StoreError> for Denial {
    fn from(err: StoreError) -> Self {
        Denial::Fault(err.to_string())
    }
}

impl From<SessionError> for Denial {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound => Denial::Reject(RejectCode::RefreshNotFound),
            other => Denial::Fault(other.to_string()),
        }
    }
}

pub struct AuthGate {
    sessions: Arc<SessionManager>,
}

impl AuthGate {
    pub fn new(sessions: Arc<SessionManager>) -> Self {
        Self { sessions }
    }

    pub async fn evaluate(
        &self,
        tokens: &PresentedTokens,
        ctx: &RequestContext,
        now: Timestamp,
    ) -> GateOutcome {
        match self.decide(tokens, ctx, now).await {
            Ok((identity, issued)) => GateOutcome {
                decision: Ok(identity),
                issued,
            },
            Err(Denial::Reject(code)) => {
                tracing::debug!(code = code.code(), "Request rejected by auth gate");
                GateOutcome {
                    decision: Err(code),
                    issued: None,
                }
            }
            Err(Denial::Fault(error)) => {
                tracing::error!(%error, "Auth gate failed closed");
                GateOutcome {
                    decision: Err(RejectCode::ServerError),
                    issued: None,
                }
            }
        }
    }

    async fn decide(
        &self,
        tokens: &PresentedTokens,
        ctx: &RequestContext,
        now: Timestamp,
    ) -> Result<(Identity, Option<IssuedTokens>), Denial> {
        let access = present(&tokens.access);
        let refresh = present(&tokens.refresh);

        match (access, refresh) {
            (None, None) => Err(RejectCode::NoTokens.into()),
            (Some(access), refresh) => {
                match self.sessions.codec().verify(TokenKind::Access, access, now) {
                    Ok(subject) => Ok((self.resolve(&subject).await?, None)),
                    Err(TokenError::Invalid) => Err(RejectCode::InvalidAccess.into()),
                    Err(TokenError::Expired) => match refresh {
                        Some(refresh) => self.refresh(refresh, ctx, now).await,
                        None => Err(RejectCode::AuthFailed.into()),
                    },
                }
            }
            (None, Some(refresh)) => self.refresh(refresh, ctx, now).await,
        }
    }

    async fn refresh(
        &self,
        raw_refresh: &str,
        ctx: &RequestContext,
        now: Timestamp,
    ) -> Result<(Identity, Option<IssuedTokens>), Denial> {
        let claims = self
            .sessions
            .codec()
            .verify(TokenKind::Refresh, raw_refresh, now)
            .map_err(|_| RejectCode::InvalidRefresh)?;

        let store = self.sessions.sessions();
        let session = store
            .find_session_by_hash(&hash_refresh_token(raw_refresh), Some(claims.user_id))
            .await?
            .ok_or(RejectCode::RefreshNotFound)?;

        if session.is_expired(now) {
            if let Err(e) = store.delete_session_by_id(session.id).await {
                tracing::warn!(session_id = session.id, error = %e, "Failed to delete expired session");
            }
            return Err(RejectCode::SessionExpired.into());
        }

        let user = self
            .sessions
            .users()
            .find_user_by_id(claims.user_id)
            .await?
            .ok_or(RejectCode::UserNotFound)?;

        if user.token_version != claims.token_version
            || user.token_version != session.token_version_snapshot
        {
            tracing::info!(
                user_id = user.id,
                presented = claims.token_version,
                current = user.token_version,
                "Stale refresh token, purging sessions",
            );
            self.sessions.purge_user_sessions(user.id).await;
            return Err(RejectCode::TokenVersionMismatch.into());
        }

        let issued = self
            .sessions
            .rotate(&session, raw_refresh, &user, ctx, now)
            .await?;

        Ok((Identity::from(&user), Some(issued)))
    }

    async fn resolve(&self, subject: &TokenSubject) -> Result<Identity, Denial> {
        let user = self
            .sessions
            .users()
            .find_user_by_id(subject.user_id)
            .await?
            .ok_or(RejectCode::UserNotFound)?;

        if user.token_version != subject.token_version {
            return Err(RejectCode::TokenVersionMismatch.into());
        }
        Ok(Identity::from(&user))
    }
}

fn present(token: &Option<String>) -> Option<&str> {
    token.as_deref().map(str::trim).filter(|t| !t.is_empty())
}
