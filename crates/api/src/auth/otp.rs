//! One-time passcode issue and verification on top of an [`OtpStore`].

use std::sync::Arc;

use chrono::Duration;
use deepguard_core::otp::{generate_otp_code, OtpEntry, OtpPurpose, OtpStore, MAX_OTP_ATTEMPTS};
use deepguard_core::types::Timestamp;

use crate::auth::password::{hash_password, verify_password};
use crate::auth::{AuthError, CredentialError};

pub struct OtpService {
    store: Arc<dyn OtpStore>,
    ttl: Duration,
}

impl OtpService {
    pub fn new(store: Arc<dyn OtpStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Generate a code for `email`, replacing any pending one, and return the
    /// plaintext so the caller can deliver it. Only the hash is kept.
    pub async fn issue(
        &self,
        purpose: OtpPurpose,
        email: &str,
        display_name: Option<String>,
        now: Timestamp,
    ) -> Result<String, AuthError> {
        let code = generate_otp_code();
        let entry = OtpEntry {
            email: email.to_string(),
            code_hash: hash_password(&code)?,
            expires_at: now + self.ttl,
            display_name,
            failed_attempts: 0,
        };
        self.store.put(purpose, entry).await?;

        tracing::debug!(purpose = purpose.as_str(), "OTP issued");
        Ok(code)
    }

    /// Check `code` against the pending entry and consume it on success.
    ///
    /// The entry is gone before this returns `Ok`, so a second call with the
    /// same code sees [`CredentialError::OtpNotRequested`].
    pub async fn verify(
        &self,
        purpose: OtpPurpose,
        email: &str,
        code: &str,
        now: Timestamp,
    ) -> Result<OtpEntry, AuthError> {
        let entry = self
            .store
            .get(purpose, email)
            .await?
            .ok_or(CredentialError::OtpNotRequested)?;

        if entry.is_expired(now) {
            self.store.remove(purpose, email).await?;
            return Err(CredentialError::OtpExpired.into());
        }

        if !verify_password(code.trim(), &entry.code_hash)? {
            let attempts = self.store.record_failure(purpose, email).await?;
            if attempts.is_some_and(|n| n >= MAX_OTP_ATTEMPTS) {
                self.store.remove(purpose, email).await?;
                tracing::warn!(purpose = purpose.as_str(), "OTP discarded after too many attempts");
            }
            return Err(CredentialError::OtpInvalid.into());
        }

        // A concurrent verify may have consumed it between get and remove.
        if !self.store.remove(purpose, email).await? {
            return Err(CredentialError::OtpNotRequested.into());
        }
        Ok(entry)
    }

    /// Drop a pending entry, e.g. when its delivery failed.
    pub async fn discard(&self, purpose: OtpPurpose, email: &str) -> Result<(), AuthError> {
        self.store.remove(purpose, email).await?;
        Ok(())
    }

    pub async fn purge_expired(&self, now: Timestamp) -> Result<usize, AuthError> {
        Ok(self.store.purge_expired(now).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Utc;
    use deepguard_core::otp::InMemoryOtpStore;

    fn service() -> (OtpService, Arc<InMemoryOtpStore>) {
        let store = Arc::new(InMemoryOtpStore::new());
        (OtpService::new(store.clone(), Duration::minutes(5)), store)
    }

    fn wrong_code(code: &str) -> String {
        if code == "123456" { "654321" } else { "123456" }.to_string()
    }

    #[tokio::test]
    async fn correct_code_verifies_once() {
        let (otp, _) = service();
        let now = Utc::now();
        let code = otp
            .issue(OtpPurpose::Signup, "a@b.com", Some("Ann".into()), now)
            .await
            .unwrap();

        let entry = otp.verify(OtpPurpose::Signup, "a@b.com", &code, now).await.unwrap();
        assert_eq!(entry.display_name.as_deref(), Some("Ann"));

        assert_matches!(
            otp.verify(OtpPurpose::Signup, "a@b.com", &code, now).await,
            Err(AuthError::Credential(CredentialError::OtpNotRequested))
        );
    }

    #[tokio::test]
    async fn unknown_email_is_not_requested() {
        let (otp, _) = service();
        assert_matches!(
            otp.verify(OtpPurpose::Signup, "x@y.com", "123456", Utc::now()).await,
            Err(AuthError::Credential(CredentialError::OtpNotRequested))
        );
    }

    #[tokio::test]
    async fn expired_code_is_rejected_and_removed() {
        let (otp, store) = service();
        let now = Utc::now();
        let code = otp.issue(OtpPurpose::Signup, "a@b.com", None, now).await.unwrap();

        let later = now + Duration::minutes(5) + Duration::seconds(1);
        assert_matches!(
            otp.verify(OtpPurpose::Signup, "a@b.com", &code, later).await,
            Err(AuthError::Credential(CredentialError::OtpExpired))
        );
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn wrong_code_keeps_entry_until_attempts_run_out() {
        let (otp, store) = service();
        let now = Utc::now();
        let code = otp.issue(OtpPurpose::Signup, "a@b.com", None, now).await.unwrap();
        let wrong = wrong_code(&code);

        for _ in 0..MAX_OTP_ATTEMPTS - 1 {
            assert_matches!(
                otp.verify(OtpPurpose::Signup, "a@b.com", &wrong, now).await,
                Err(AuthError::Credential(CredentialError::OtpInvalid))
            );
        }
        assert_eq!(store.len().await, 1);

        assert_matches!(
            otp.verify(OtpPurpose::Signup, "a@b.com", &wrong, now).await,
            Err(AuthError::Credential(CredentialError::OtpInvalid))
        );
        assert!(store.is_empty().await);
        assert_matches!(
            otp.verify(OtpPurpose::Signup, "a@b.com", &code, now).await,
            Err(AuthError::Credential(CredentialError::OtpNotRequested))
        );
    }

    #[tokio::test]
    async fn purposes_are_independent() {
        let (otp, _) = service();
        let now = Utc::now();
        let signup = otp.issue(OtpPurpose::Signup, "a@b.com", None, now).await.unwrap();

        assert_matches!(
            otp.verify(OtpPurpose::PasswordReset, "a@b.com", &signup, now).await,
            Err(AuthError::Credential(CredentialError::OtpNotRequested))
        );
        assert!(otp.verify(OtpPurpose::Signup, "a@b.com", &signup, now).await.is_ok());
    }

    #[tokio::test]
    async fn reissue_invalidates_previous_code() {
        let (otp, _) = service();
        let now = Utc::now();
        let first = otp.issue(OtpPurpose::Signup, "a@b.com", None, now).await.unwrap();
        let second = otp.issue(OtpPurpose::Signup, "a@b.com", None, now).await.unwrap();

        if first != second {
            assert_matches!(
                otp.verify(OtpPurpose::Signup, "a@b.com", &first, now).await,
                Err(AuthError::Credential(CredentialError::OtpInvalid))
            );
        }
        assert!(otp.verify(OtpPurpose::Signup, "a@b.com", &second, now).await.is_ok());
    }
}
