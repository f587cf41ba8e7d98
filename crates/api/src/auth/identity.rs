//! External identity-provider token verification.
//!
//! The contract is `verify(token) -> ProviderIdentity | error`. The Google
//! implementation delegates signature checking to Google's `tokeninfo`
//! endpoint and then enforces audience, issuer and email verification.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

/// Google's ID-token introspection endpoint.
const GOOGLE_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

/// Accepted `iss` values for Google ID tokens.
const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

/// HTTP timeout for a single verification call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Identity asserted by a verified provider token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderIdentity {
    /// Stable provider subject id.
    pub external_id: String,
    pub email: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// The token is forged, expired, for another audience, or lacks a
    /// verified email.
    #[error("Invalid identity token: {0}")]
    Invalid(String),

    /// The provider could not be reached.
    #[error("Identity provider unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<ProviderIdentity, IdentityError>;
}

/// Subset of the `tokeninfo` response we rely on.
#[derive(Debug, Deserialize)]
struct TokenInfo {
    aud: String,
    iss: String,
    sub: String,
    email: Option<String>,
    /// Google returns this as the string `"true"` / `"false"`.
    email_verified: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

pub struct GoogleIdentityVerifier {
    client: reqwest::Client,
    client_id: String,
    endpoint: String,
}

impl GoogleIdentityVerifier {
    pub fn new(client_id: String) -> Self {
        Self::with_endpoint(client_id, GOOGLE_TOKENINFO_URL.to_string())
    }

    pub fn with_endpoint(client_id: String, endpoint: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build reqwest HTTP client");
        Self {
            client,
            client_id,
            endpoint,
        }
    }

    fn check(&self, info: TokenInfo) -> Result<ProviderIdentity, IdentityError> {
        if info.aud != self.client_id {
            return Err(IdentityError::Invalid("audience mismatch".into()));
        }
        if !GOOGLE_ISSUERS.contains(&info.iss.as_str()) {
            return Err(IdentityError::Invalid(format!("unexpected issuer {}", info.iss)));
        }
        let email = info
            .email
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| IdentityError::Invalid("token carries no email".into()))?;
        if info.email_verified.as_deref() != Some("true") {
            return Err(IdentityError::Invalid("email not verified".into()));
        }

        Ok(ProviderIdentity {
            external_id: info.sub,
            email,
            name: info.name,
            avatar_url: info.picture,
        })
    }
}

#[async_trait]
impl IdentityVerifier for GoogleIdentityVerifier {
    async fn verify(&self, token: &str) -> Result<ProviderIdentity, IdentityError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("id_token", token)])
            .send()
            .await
            .map_err(|e| IdentityError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            return Err(IdentityError::Invalid(format!("provider returned HTTP {status}")));
        }
        if !status.is_success() {
            return Err(IdentityError::Unavailable(format!("provider returned HTTP {status}")));
        }

        let info: TokenInfo = response
            .json()
            .await
            .map_err(|e| IdentityError::Unavailable(e.to_string()))?;
        self.check(info)
    }
}
