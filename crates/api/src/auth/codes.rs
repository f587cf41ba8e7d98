//! Stable error vocabulary surfaced to clients.
//!
//! The `code` strings are part of the public contract: frontends switch on
//! them to decide whether to show a login screen, a retry, or a form error.

use axum::http::StatusCode;

/// Why the authentication gate refused a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RejectCode {
    #[error("Not authorized")]
    NoTokens,
    #[error("Invalid access token")]
    InvalidAccess,
    /// Access token expired and no refresh token was presented.
    #[error("Not authorized")]
    AuthFailed,
    #[error("Session expired")]
    InvalidRefresh,
    #[error("Session expired")]
    RefreshNotFound,
    #[error("Session expired")]
    SessionExpired,
    #[error("User not found")]
    UserNotFound,
    #[error("Session invalidated")]
    TokenVersionMismatch,
    #[error("Not authorized")]
    ServerError,
}

impl RejectCode {
    pub fn code(self) -> &'static str {
        match self {
            RejectCode::NoTokens => "NO_TOKENS",
            RejectCode::InvalidAccess => "INVALID_ACCESS",
            RejectCode::AuthFailed => "AUTH_FAILED",
            RejectCode::InvalidRefresh => "INVALID_REFRESH",
            RejectCode::RefreshNotFound => "REFRESH_NOT_FOUND",
            RejectCode::SessionExpired => "SESSION_EXPIRED",
            RejectCode::UserNotFound => "USER_NOT_FOUND",
            RejectCode::TokenVersionMismatch => "TOKEN_VERSION_MISMATCH",
            RejectCode::ServerError => "SERVER_ERROR",
        }
    }

    /// Whether the presented cookies can never succeed again and should be
    /// cleared from the client. Transient faults keep them.
    pub fn clears_credentials(self) -> bool {
        matches!(
            self,
            RejectCode::InvalidRefresh
                | RejectCode::RefreshNotFound
                | RejectCode::SessionExpired
                | RejectCode::UserNotFound
                | RejectCode::TokenVersionMismatch
        )
    }
}

/// Failures of the signup / login / reset flows.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    #[error("OTP not requested")]
    OtpNotRequested,
    #[error("OTP expired")]
    OtpExpired,
    #[error("Invalid OTP")]
    OtpInvalid,
    #[error("User already exists")]
    UserExists,
    #[error("Invalid credentials")]
    InvalidCredentials,
    /// The account exists but has no password (identity-provider only).
    #[error("Password login not enabled")]
    PasswordLoginDisabled,
    #[error("Email not found")]
    EmailNotFound,
    #[error("Invalid identity provider token")]
    InvalidIdentityToken,
    #[error("Identity provider login is not configured")]
    ProviderLoginDisabled,
    #[error("Failed to send email")]
    EmailDeliveryFailed,
    #[error("{0}")]
    WeakPassword(String),
}

impl CredentialError {
    pub fn code(&self) -> &'static str {
        match self {
            CredentialError::OtpNotRequested => "OTP_NOT_REQUESTED",
            CredentialError::OtpExpired => "OTP_EXPIRED",
            CredentialError::OtpInvalid => "OTP_INVALID",
            CredentialError::UserExists => "USER_EXISTS",
            CredentialError::InvalidCredentials => "INVALID_CREDENTIALS",
            CredentialError::PasswordLoginDisabled => "PASSWORD_LOGIN_DISABLED",
            CredentialError::EmailNotFound => "EMAIL_NOT_FOUND",
            CredentialError::InvalidIdentityToken => "INVALID_IDENTITY_TOKEN",
            CredentialError::ProviderLoginDisabled => "PROVIDER_LOGIN_DISABLED",
            CredentialError::EmailDeliveryFailed => "EMAIL_DELIVERY_FAILED",
            CredentialError::WeakPassword(_) => "WEAK_PASSWORD",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            CredentialError::OtpNotRequested
            | CredentialError::OtpExpired
            | CredentialError::OtpInvalid
            | CredentialError::PasswordLoginDisabled
            | CredentialError::EmailNotFound
            | CredentialError::WeakPassword(_) => StatusCode::BAD_REQUEST,
            CredentialError::UserExists => StatusCode::CONFLICT,
            CredentialError::InvalidCredentials | CredentialError::InvalidIdentityToken => {
                StatusCode::UNAUTHORIZED
            }
            CredentialError::ProviderLoginDisabled => StatusCode::NOT_IMPLEMENTED,
            CredentialError::EmailDeliveryFailed => StatusCode::BAD_GATEWAY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_failures_keep_cookies() {
        assert!(!RejectCode::ServerError.clears_credentials());
        assert!(!RejectCode::NoTokens.clears_credentials());
        assert!(RejectCode::TokenVersionMismatch.clears_credentials());
        assert!(RejectCode::RefreshNotFound.clears_credentials());
    }

    #[test]
    fn codes_are_screaming_snake_case() {
        for code in [
            RejectCode::NoTokens,
            RejectCode::InvalidAccess,
            RejectCode::InvalidRefresh,
            RejectCode::RefreshNotFound,
            RejectCode::SessionExpired,
            RejectCode::UserNotFound,
            RejectCode::TokenVersionMismatch,
            RejectCode::ServerError,
        ] {
            assert!(code
                .code()
                .chars()
                .all(|c| c.is_ascii_uppercase() || c == '_'));
        }
        assert_eq!(CredentialError::OtpNotRequested.code(), "OTP_NOT_REQUESTED");
        assert_eq!(CredentialError::UserExists.status(), StatusCode::CONFLICT);
    }
}
