//! One-time passcode entries and the process-local cache that holds them.
//!
//! Entries are keyed by `(purpose, normalized email)`; at most one entry per
//! key exists and a new `put` replaces the old one. Only the hash of a code
//! is ever stored. Entries do not survive a restart, and the cache is not
//! shared between instances: running more than one replica requires an
//! [`OtpStore`] backed by a shared cache service.

use std::collections::HashMap;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::RwLock;

use crate::types::Timestamp;

/// Number of digits in a generated code.
pub const OTP_LENGTH: usize = 6;

/// Default lifetime of a code in minutes.
pub const DEFAULT_OTP_EXPIRY_MINS: i64 = 5;

/// Wrong submissions tolerated before an entry is discarded.
pub const MAX_OTP_ATTEMPTS: u32 = 5;

/// What a code was issued for. Signup and reset codes never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OtpPurpose {
    Signup,
    PasswordReset,
}

impl OtpPurpose {
    pub fn as_str(self) -> &'static str {
        match self {
            OtpPurpose::Signup => "signup",
            OtpPurpose::PasswordReset => "password_reset",
        }
    }
}

/// A pending code for one email address.
#[derive(Debug, Clone)]
pub struct OtpEntry {
    /// Normalized owning email.
    pub email: String,
    /// One-way hash of the code (PHC string).
    pub code_hash: String,
    pub expires_at: Timestamp,
    /// Display name carried from the signup request, if any.
    pub display_name: Option<String>,
    /// Wrong codes submitted so far.
    pub failed_attempts: u32,
}

impl OtpEntry {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now > self.expires_at
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OtpStoreError {
    #[error("OTP store unavailable: {0}")]
    Unavailable(String),
}

/// Key-value store with expiry semantics for pending codes.
#[async_trait]
pub trait OtpStore: Send + Sync {
    /// Insert or replace the entry for `(purpose, entry.email)`.
    async fn put(&self, purpose: OtpPurpose, entry: OtpEntry) -> Result<(), OtpStoreError>;

    async fn get(&self, purpose: OtpPurpose, email: &str)
        -> Result<Option<OtpEntry>, OtpStoreError>;

    /// Remove an entry. Returns `true` if one existed.
    async fn remove(&self, purpose: OtpPurpose, email: &str) -> Result<bool, OtpStoreError>;

    /// Count a wrong submission. Returns the new count, or `None` when the
    /// entry is gone.
    async fn record_failure(
        &self,
        purpose: OtpPurpose,
        email: &str,
    ) -> Result<Option<u32>, OtpStoreError>;

    /// Drop every entry that expired before `now`. Returns how many were dropped.
    async fn purge_expired(&self, now: Timestamp) -> Result<usize, OtpStoreError>;
}

/// [`OtpStore`] backed by a lock-guarded `HashMap` in this process.
#[derive(Default)]
pub struct InMemoryOtpStore {
    entries: RwLock<HashMap<(OtpPurpose, String), OtpEntry>>,
}

impl InMemoryOtpStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pending entries across all purposes.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl OtpStore for InMemoryOtpStore {
    async fn put(&self, purpose: OtpPurpose, entry: OtpEntry) -> Result<(), OtpStoreError> {
        self.entries
            .write()
            .await
            .insert((purpose, entry.email.clone()), entry);
        Ok(())
    }

    async fn get(
        &self,
        purpose: OtpPurpose,
        email: &str,
    ) -> Result<Option<OtpEntry>, OtpStoreError> {
        Ok(self
            .entries
            .read()
            .await
            .get(&(purpose, email.to_string()))
            .cloned())
    }

    async fn remove(&self, purpose: OtpPurpose, email: &str) -> Result<bool, OtpStoreError> {
        Ok(self
            .entries
            .write()
            .await
            .remove(&(purpose, email.to_string()))
            .is_some())
    }

    async fn record_failure(
        &self,
        purpose: OtpPurpose,
        email: &str,
    ) -> Result<Option<u32>, OtpStoreError> {
        let mut entries = self.entries.write().await;
        Ok(entries
            .get_mut(&(purpose, email.to_string()))
            .map(|entry| {
                entry.failed_attempts += 1;
                entry.failed_attempts
            }))
    }

    async fn purge_expired(&self, now: Timestamp) -> Result<usize, OtpStoreError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        Ok(before - entries.len())
    }
}

/// Generate a random 6-digit numeric code (never starts with zero).
pub fn generate_otp_code() -> String {
    let code: u32 = rand::rng().random_range(100_000..1_000_000);
    code.to_string()
}
