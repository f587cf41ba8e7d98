//! Cookie transport for the access and refresh tokens.
//!
//! Both tokens travel as `HttpOnly` cookies scoped to `/`. The access token
//! may also arrive as an `Authorization: Bearer` header for non-browser
//! clients; the refresh token is only ever read from its cookie.

use std::fmt;
use std::str::FromStr;

use axum::http::header::{AUTHORIZATION, COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use axum::http::header::InvalidHeaderValue;

use crate::auth::gate::PresentedTokens;
use crate::auth::jwt::JwtConfig;
use crate::auth::session::IssuedTokens;

pub const ACCESS_COOKIE_NAME: &str = "accessToken";
pub const REFRESH_COOKIE_NAME: &str = "refreshToken";

/// `SameSite` attribute of the auth cookies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        };
        f.write_str(value)
    }
}

impl FromStr for SameSite {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(SameSite::Strict),
            "lax" => Ok(SameSite::Lax),
            "none" => Ok(SameSite::None),
            other => Err(format!("unknown SameSite policy '{other}'")),
        }
    }
}

/// Attributes applied to every auth cookie.
#[derive(Debug, Clone)]
pub struct CookiePolicy {
    pub secure: bool,
    pub same_site: SameSite,
    /// `Max-Age` of the access cookie, in seconds.
    pub access_max_age: i64,
    /// `Max-Age` of the refresh cookie, in seconds.
    pub refresh_max_age: i64,
}

impl CookiePolicy {
    /// Cookie lifetimes follow the token lifetimes.
    pub fn new(secure: bool, same_site: SameSite, jwt: &JwtConfig) -> Self {
        Self {
            secure,
            same_site,
            access_max_age: jwt.access_ttl().num_seconds(),
            refresh_max_age: jwt.refresh_ttl().num_seconds(),
        }
    }

    fn build(&self, name: &str, value: &str, max_age: i64) -> Result<HeaderValue, InvalidHeaderValue> {
        let mut cookie = format!(
            "{name}={value}; Path=/; HttpOnly; SameSite={}; Max-Age={max_age}",
            self.same_site
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie)
    }

    /// `Set-Cookie` values delivering both tokens.
    pub fn token_cookies(&self, tokens: &IssuedTokens) -> Result<[HeaderValue; 2], InvalidHeaderValue> {
        Ok([
            self.build(ACCESS_COOKIE_NAME, &tokens.access_token, self.access_max_age)?,
            self.build(REFRESH_COOKIE_NAME, &tokens.refresh_token, self.refresh_max_age)?,
        ])
    }

    /// `Set-Cookie` values expiring both tokens on the client.
    pub fn clear_cookies(&self) -> Result<[HeaderValue; 2], InvalidHeaderValue> {
        Ok([
            self.build(ACCESS_COOKIE_NAME, "", 0)?,
            self.build(REFRESH_COOKIE_NAME, "", 0)?,
        ])
    }
}

/// Append cookies to a response header map. Uses `append` so both survive.
pub fn append_cookies(headers: &mut HeaderMap, cookies: [HeaderValue; 2]) {
    for cookie in cookies {
        headers.append(SET_COOKIE, cookie);
    }
}

/// Read a cookie value from the `Cookie` header(s). Empty values count as absent.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, val)| val.trim().to_string())
        .filter(|val| !val.is_empty())
}

pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Collect the tokens a request carries.
pub fn presented_tokens(headers: &HeaderMap) -> PresentedTokens {
    PresentedTokens {
        access: read_cookie(headers, ACCESS_COOKIE_NAME).or_else(|| bearer_token(headers)),
        refresh: read_cookie(headers, REFRESH_COOKIE_NAME),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> CookiePolicy {
        CookiePolicy {
            secure: true,
            same_site: SameSite::None,
            access_max_age: 900,
            refresh_max_age: 2_592_000,
        }
    }

    #[test]
    fn token_cookies_carry_security_attributes() {
        let [access, refresh] = policy()
            .token_cookies(&IssuedTokens {
                access_token: "aaa".into(),
                refresh_token: "rrr".into(),
            })
            .unwrap();

        assert_eq!(
            access.to_str().unwrap(),
            "accessToken=aaa; Path=/; HttpOnly; SameSite=None; Max-Age=900; Secure"
        );
        assert_eq!(
            refresh.to_str().unwrap(),
            "refreshToken=rrr; Path=/; HttpOnly; SameSite=None; Max-Age=2592000; Secure"
        );
    }

    #[test]
    fn clear_cookies_expire_immediately() {
        let policy = CookiePolicy {
            secure: false,
            same_site: SameSite::Lax,
            ..policy()
        };
        let [access, refresh] = policy.clear_cookies().unwrap();
        assert_eq!(
            access.to_str().unwrap(),
            "accessToken=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"
        );
        assert!(refresh.to_str().unwrap().starts_with("refreshToken=;"));
    }

    #[test]
    fn reads_tokens_from_cookie_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; accessToken=a.b.c; refreshToken=r.s.t"),
        );
        let tokens = presented_tokens(&headers);
        assert_eq!(tokens.access.as_deref(), Some("a.b.c"));
        assert_eq!(tokens.refresh.as_deref(), Some("r.s.t"));
    }

    #[test]
    fn bearer_header_is_accepted_for_access_only() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer x.y.z"));
        let tokens = presented_tokens(&headers);
        assert_eq!(tokens.access.as_deref(), Some("x.y.z"));
        assert!(tokens.refresh.is_none());
    }

    #[test]
    fn empty_cookie_is_absent() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("accessToken=; refreshToken="));
        let tokens = presented_tokens(&headers);
        assert!(tokens.access.is_none());
        assert!(tokens.refresh.is_none());
    }

    #[test]
    fn same_site_parses_case_insensitively() {
        assert_eq!("none".parse::<SameSite>().unwrap(), SameSite::None);
        assert_eq!("Strict".parse::<SameSite>().unwrap(), SameSite::Strict);
        assert!("sometimes".parse::<SameSite>().is_err());
    }
}
