//! Outbound email for the OTP flows.
//!
//! [`SmtpMailer`] wraps the `lettre` async SMTP transport. Configuration is
//! loaded from environment variables; if `SMTP_HOST` is not set,
//! [`EmailConfig::from_env`] returns `None` and [`DisabledMailer`] is used,
//! which fails every send so OTP requests surface a delivery error instead of
//! silently succeeding.

use std::fmt;

use async_trait::async_trait;
use chrono::Duration;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    /// SMTP transport-level failure (authentication, connection, etc.).
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    /// The recipient or sender address could not be parsed.
    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    /// The MIME message could not be assembled.
    #[error("Email build error: {0}")]
    Build(String),

    #[error("Email delivery is not configured")]
    NotConfigured,
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl OutgoingEmail {
    pub fn signup_otp(to: &str, code: &str, ttl: Duration) -> Self {
        Self {
            to: to.to_string(),
            subject: "Your DeepGuard verification code".to_string(),
            body: format!(
                "Your verification code is {code}.\nIt expires in {} minutes.",
                ttl.num_minutes()
            ),
        }
    }

    pub fn password_reset_otp(to: &str, code: &str, ttl: Duration) -> Self {
        Self {
            to: to.to_string(),
            subject: "Reset your DeepGuard password".to_string(),
            body: format!(
                "Your password reset code is {code}.\nIt expires in {} minutes.\n\
                 If you did not request a reset, you can ignore this email.",
                ttl.num_minutes()
            ),
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<(), EmailError>;
}

// ---------------------------------------------------------------------------
// EmailConfig
// ---------------------------------------------------------------------------

/// Default SMTP port (STARTTLS).
const DEFAULT_SMTP_PORT: u16 = 587;

/// Default sender address when `SMTP_FROM` is not set.
const DEFAULT_FROM_ADDRESS: &str = "noreply@deepguard.local";

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    /// RFC 5322 "From" address.
    pub from_address: String,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
}

impl EmailConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable        | Required | Default                    |
    /// |-----------------|----------|----------------------------|
    /// | `SMTP_HOST`     | yes      | --                         |
    /// | `SMTP_PORT`     | no       | `587`                      |
    /// | `SMTP_FROM`     | no       | `noreply@deepguard.local`  |
    /// | `SMTP_USER`     | no       | --                         |
    /// | `SMTP_PASSWORD` | no       | --                         |
    pub fn from_env() -> Option<Self> {
        let smtp_host = std::env::var("SMTP_HOST").ok()?;
        Some(Self {
            smtp_host,
            smtp_port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_SMTP_PORT),
            from_address: std::env::var("SMTP_FROM")
                .unwrap_or_else(|_| DEFAULT_FROM_ADDRESS.to_string()),
            smtp_user: std::env::var("SMTP_USER").ok(),
            smtp_password: std::env::var("SMTP_PASSWORD").ok(),
        })
    }
}

// ---------------------------------------------------------------------------
// SmtpMailer
// ---------------------------------------------------------------------------

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &EmailConfig) -> Result<Self, EmailError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port);

        if let (Some(user), Some(pass)) = (&config.smtp_user, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from: config.from_address.parse()?,
        })
    }
}

impl fmt::Debug for SmtpMailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpMailer")
            .field("from", &self.from.to_string())
            .field("transport", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), EmailError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(email.to.parse()?)
            .subject(email.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(email.body)
            .map_err(|e| EmailError::Build(e.to_string()))?;

        self.transport.send(message).await?;

        tracing::info!(to = %email.to, "Email sent");
        Ok(())
    }
}

/// Used when SMTP is not configured.
pub struct DisabledMailer;

#[async_trait]
impl Mailer for DisabledMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), EmailError> {
        tracing::warn!(to = %email.to, "Email requested but SMTP is not configured");
        Err(EmailError::NotConfigured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn otp_emails_mention_code_and_lifetime() {
        let email = OutgoingEmail::signup_otp("a@b.com", "123456", Duration::minutes(5));
        assert_eq!(email.to, "a@b.com");
        assert!(email.body.contains("123456"));
        assert!(email.body.contains("5 minutes"));

        let reset = OutgoingEmail::password_reset_otp("a@b.com", "654321", Duration::minutes(5));
        assert!(reset.subject.contains("Reset"));
        assert!(reset.body.contains("654321"));
    }

    #[tokio::test]
    async fn disabled_mailer_always_fails() {
        let result = DisabledMailer
            .send(OutgoingEmail::signup_otp("a@b.com", "1", Duration::minutes(5)))
            .await;
        assert_matches!(result, Err(EmailError::NotConfigured));
    }

    #[test]
    fn smtp_mailer_rejects_bad_sender() {
        let config = EmailConfig {
            smtp_host: "localhost".into(),
            smtp_port: 2525,
            from_address: "not an address".into(),
            smtp_user: None,
            smtp_password: None,
        };
        assert_matches!(SmtpMailer::new(&config), Err(EmailError::Address(_)));
    }

    #[test]
    fn smtp_mailer_debug_hides_credentials() {
        let config = EmailConfig {
            smtp_host: "localhost".into(),
            smtp_port: 2525,
            from_address: "noreply@example.com".into(),
            smtp_user: Some("mailer".into()),
            smtp_password: Some("hunter2-secret".into()),
        };
        let mailer = SmtpMailer::new(&config).expect("valid config");
        let debug = format!("{mailer:?}");
        assert!(debug.contains("noreply@example.com"));
        assert!(!debug.contains("hunter2-secret"));
    }
}
