//! Authentication and session management.
//!
//! - [`jwt`] -- the token codec (access + refresh JWTs).
//! - [`session`] -- session creation, rotation and revocation.
//! - [`gate`] -- the per-request trust decision.
//! - [`credentials`] -- signup, login, provider login, password reset.
//! - [`otp`] -- one-time passcode issue / verify.
//! - [`identity`] -- external identity-provider token verification.
//! - [`cookies`] -- transport of the two tokens between client and server.

pub mod codes;
pub mod cookies;
pub mod credentials;
pub mod gate;
pub mod identity;
pub mod jwt;
pub mod otp;
pub mod password;
pub mod session;

pub use codes::{CredentialError, RejectCode};

use deepguard_core::error::CoreError;
use deepguard_core::otp::OtpStoreError;
use deepguard_db::StoreError;

use crate::auth::session::SessionError;

/// Failure of an auth-layer operation outside the gate.
///
/// [`AuthError::Credential`] carries a client-facing code; every other
/// variant is a fault and surfaces as a sanitized 500.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Otp(#[from] OtpStoreError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("{0}")]
    Internal(String),
}

impl From<argon2::password_hash::Error> for AuthError {
    fn from(err: argon2::password_hash::Error) -> Self {
        AuthError::Internal(format!("Password hashing error: {err}"))
    }
}
