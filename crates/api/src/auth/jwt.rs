//! Token codec: HS256 JWTs for access and refresh tokens.
//!
//! Both kinds carry the same subject (user id, email, token version) but are
//! signed with independent secrets, so leaking one secret never lets an
//! attacker mint the other kind. Refresh tokens are additionally tracked
//! server-side by their SHA-256 digest; the raw token is never stored.
//!
//! Expiry is checked against a caller-supplied `now` rather than the system
//! clock so the gate stays a function of its inputs.

use std::fmt;

use chrono::Duration;
use deepguard_core::types::{DbId, Timestamp};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Default access token expiry in minutes.
const DEFAULT_ACCESS_EXPIRY_MINS: i64 = 15;
/// Default refresh token expiry in days.
const DEFAULT_REFRESH_EXPIRY_DAYS: i64 = 30;

/// Which of the two token families a JWT belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT claims embedded in every token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject -- the user's internal database id.
    pub sub: DbId,
    pub email: String,
    /// `users.token_version` at issuance.
    #[serde(rename = "tokenVersion")]
    pub token_version: i32,
    pub typ: TokenKind,
    /// Expiration time (UTC Unix timestamp).
    pub exp: i64,
    /// Issued-at time (UTC Unix timestamp).
    pub iat: i64,
    /// Unique token identifier; keeps two tokens minted in the same second distinct.
    pub jti: String,
}

/// The identity a token vouches for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSubject {
    pub user_id: DbId,
    pub email: String,
    pub token_version: i32,
}

/// Why a token was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// Signature and structure are fine but `exp` has passed.
    #[error("token expired")]
    Expired,
    /// Bad signature, wrong kind, or malformed token.
    #[error("token invalid")]
    Invalid,
}

/// Configuration for JWT token generation and validation.
#[derive(Clone)]
pub struct JwtConfig {
    /// HMAC-SHA256 secret for access tokens.
    pub access_secret: String,
    /// HMAC-SHA256 secret for refresh tokens.
    pub refresh_secret: String,
    /// Access token lifetime in minutes (default: 15).
    pub access_token_expiry_mins: i64,
    /// Refresh token lifetime in days (default: 30).
    pub refresh_token_expiry_days: i64,
}

impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig")
            .field("access_secret", &"<redacted>")
            .field("refresh_secret", &"<redacted>")
            .field("access_token_expiry_mins", &self.access_token_expiry_mins)
            .field("refresh_token_expiry_days", &self.refresh_token_expiry_days)
            .finish()
    }
}

impl JwtConfig {
    /// Load JWT configuration from environment variables.
    ///
    /// | Env Var                    | Required | Default |
    /// |----------------------------|----------|---------|
    /// | `JWT_SECRET`               | **yes**  | --      |
    /// | `JWT_REFRESH_SECRET`       | **yes**  | --      |
    /// | `JWT_ACCESS_EXPIRY_MINS`   | no       | `15`    |
    /// | `JWT_REFRESH_EXPIRY_DAYS`  | no       | `30`    |
    ///
    /// # Panics
    ///
    /// Panics if either secret is missing or empty, or if both are equal.
    pub fn from_env() -> Self {
        let access_secret =
            std::env::var("JWT_SECRET").expect("JWT_SECRET must be set in the environment");
        assert!(!access_secret.is_empty(), "JWT_SECRET must not be empty");

        let refresh_secret = std::env::var("JWT_REFRESH_SECRET")
            .expect("JWT_REFRESH_SECRET must be set in the environment");
        assert!(!refresh_secret.is_empty(), "JWT_REFRESH_SECRET must not be empty");
        assert_ne!(
            access_secret, refresh_secret,
            "JWT_SECRET and JWT_REFRESH_SECRET must differ"
        );

        let access_token_expiry_mins: i64 = std::env::var("JWT_ACCESS_EXPIRY_MINS")
            .unwrap_or_else(|_| DEFAULT_ACCESS_EXPIRY_MINS.to_string())
            .parse()
            .expect("JWT_ACCESS_EXPIRY_MINS must be a valid i64");

        let refresh_token_expiry_days: i64 = std::env::var("JWT_REFRESH_EXPIRY_DAYS")
            .unwrap_or_else(|_| DEFAULT_REFRESH_EXPIRY_DAYS.to_string())
            .parse()
            .expect("JWT_REFRESH_EXPIRY_DAYS must be a valid i64");

        Self {
            access_secret,
            refresh_secret,
            access_token_expiry_mins,
            refresh_token_expiry_days,
        }
    }

    pub fn access_ttl(&self) -> Duration {
        Duration::minutes(self.access_token_expiry_mins)
    }

    pub fn refresh_ttl(&self) -> Duration {
        Duration::days(self.refresh_token_expiry_days)
    }
}

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Signs and verifies both token kinds.
pub struct TokenCodec {
    config: JwtConfig,
    access: KeyPair,
    refresh: KeyPair,
}

impl TokenCodec {
    pub fn new(config: JwtConfig) -> Self {
        let access = KeyPair::from_secret(&config.access_secret);
        let refresh = KeyPair::from_secret(&config.refresh_secret);
        Self {
            config,
            access,
            refresh,
        }
    }

    pub fn config(&self) -> &JwtConfig {
        &self.config
    }

    /// Lifetime of a token of the given kind.
    pub fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.config.access_ttl(),
            TokenKind::Refresh => self.config.refresh_ttl(),
        }
    }

    fn keys(&self, kind: TokenKind) -> &KeyPair {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    /// Sign a token of `kind` for `subject`, valid from `now` for the kind's TTL.
    pub fn issue(
        &self,
        kind: TokenKind,
        subject: &TokenSubject,
        now: Timestamp,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let iat = now.timestamp();
        let claims = Claims {
            sub: subject.user_id,
            email: subject.email.clone(),
            token_version: subject.token_version,
            typ: kind,
            exp: iat + self.ttl(kind).num_seconds(),
            iat,
            jti: Uuid::new_v4().to_string(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.keys(kind).encoding,
        )
    }

    pub fn issue_access(
        &self,
        subject: &TokenSubject,
        now: Timestamp,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        self.issue(TokenKind::Access, subject, now)
    }

    pub fn issue_refresh(
        &self,
        subject: &TokenSubject,
        now: Timestamp,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        self.issue(TokenKind::Refresh, subject, now)
    }

    /// Verify a token of `kind` at time `now`.
    ///
    /// Signature problems always win over expiry: a forged token that also
    /// happens to be past its `exp` is [`TokenError::Invalid`].
    pub fn verify(
        &self,
        kind: TokenKind,
        token: &str,
        now: Timestamp,
    ) -> Result<TokenSubject, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;

        let claims = decode::<Claims>(token, &self.keys(kind).decoding, &validation)
            .map_err(|_| TokenError::Invalid)?
            .claims;

        if claims.typ != kind {
            return Err(TokenError::Invalid);
        }
        if now.timestamp() >= claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(TokenSubject {
            user_id: claims.sub,
            email: claims.email,
            token_version: claims.token_version,
        })
    }
}

/// Compute the SHA-256 hex digest of a refresh token.
///
/// This digest is what the session store keys on.
pub fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}
