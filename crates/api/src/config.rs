use chrono::Duration;
use deepguard_core::otp::DEFAULT_OTP_EXPIRY_MINS;

use crate::auth::cookies::{CookiePolicy, SameSite};
use crate::auth::jwt::JwtConfig;

/// Server configuration loaded from environment variables.
///
/// All fields except the JWT secrets have defaults suitable for local
/// development. In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `5000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// JWT token configuration (secrets, expiry durations).
    pub jwt: JwtConfig,
    /// `Secure` attribute on auth cookies (default: `true`).
    pub cookie_secure: bool,
    /// `SameSite` attribute on auth cookies (default: `None`).
    pub cookie_same_site: SameSite,
    /// OTP lifetime in minutes (default: `5`).
    pub otp_expiry_mins: i64,
    /// Audience for identity-provider tokens; provider login is off when unset.
    pub google_client_id: Option<String>,
    /// Period of the expired-session sweeper in seconds (default: `3600`).
    pub session_cleanup_interval_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                         | Default                    |
    /// |---------------------------------|----------------------------|
    /// | `HOST`                          | `0.0.0.0`                  |
    /// | `PORT`                          | `5000`                     |
    /// | `CORS_ORIGINS`                  | `http://localhost:3000`    |
    /// | `REQUEST_TIMEOUT_SECS`          | `30`                       |
    /// | `COOKIE_SECURE`                 | `true`                     |
    /// | `COOKIE_SAME_SITE`              | `None`                     |
    /// | `OTP_EXPIRY_MINS`               | `5`                        |
    /// | `GOOGLE_CLIENT_ID`              | unset                      |
    /// | `SESSION_CLEANUP_INTERVAL_SECS` | `3600`                     |
    ///
    /// JWT settings come from [`JwtConfig::from_env`].
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "5000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let cookie_secure: bool = std::env::var("COOKIE_SECURE")
            .unwrap_or_else(|_| "true".into())
            .parse()
            .expect("COOKIE_SECURE must be true or false");

        let cookie_same_site: SameSite = std::env::var("COOKIE_SAME_SITE")
            .unwrap_or_else(|_| "None".into())
            .parse()
            .unwrap_or_else(|e| panic!("COOKIE_SAME_SITE is invalid: {e}"));

        let otp_expiry_mins: i64 = std::env::var("OTP_EXPIRY_MINS")
            .unwrap_or_else(|_| DEFAULT_OTP_EXPIRY_MINS.to_string())
            .parse()
            .expect("OTP_EXPIRY_MINS must be a valid i64");

        let google_client_id = std::env::var("GOOGLE_CLIENT_ID")
            .ok()
            .filter(|id| !id.trim().is_empty());

        let session_cleanup_interval_secs = parse_cleanup_interval(
            &std::env::var("SESSION_CLEANUP_INTERVAL_SECS").unwrap_or_else(|_| "3600".into()),
        );

        let jwt = JwtConfig::from_env();

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            jwt,
            cookie_secure,
            cookie_same_site,
            otp_expiry_mins,
            google_client_id,
            session_cleanup_interval_secs,
        }
    }

    pub fn cookie_policy(&self) -> CookiePolicy {
        CookiePolicy::new(self.cookie_secure, self.cookie_same_site, &self.jwt)
    }

    pub fn otp_ttl(&self) -> Duration {
        Duration::minutes(self.otp_expiry_mins)
    }
}

/// A zero period would make the sweeper's ticker panic inside its task.
fn parse_cleanup_interval(raw: &str) -> u64 {
    let secs: u64 = raw
        .parse()
        .expect("SESSION_CLEANUP_INTERVAL_SECS must be a valid u64");
    assert!(secs > 0, "SESSION_CLEANUP_INTERVAL_SECS must be greater than zero");
    secs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleanup_interval_accepts_positive_seconds() {
        assert_eq!(parse_cleanup_interval("3600"), 3600);
        assert_eq!(parse_cleanup_interval("1"), 1);
    }

    #[test]
    #[should_panic(expected = "greater than zero")]
    fn cleanup_interval_rejects_zero() {
        parse_cleanup_interval("0");
    }

    #[test]
    #[should_panic(expected = "valid u64")]
    fn cleanup_interval_rejects_garbage() {
        parse_cleanup_interval("hourly");
    }
}
