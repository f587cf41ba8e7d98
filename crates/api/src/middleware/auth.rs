//! Request-time authentication: the gate middleware and the extractors that
//! read its result.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts, Request, State};
use axum::http::header::{SET_COOKIE, USER_AGENT};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use deepguard_core::types::DbId;

use crate::auth::cookies::{append_cookies, presented_tokens};
use crate::auth::gate::Identity;
use crate::auth::session::RequestContext;
use crate::error::AppError;
use crate::state::AppState;

/// The caller accepted by the gate, as seen by handlers behind it.
///
/// ```ignore
/// async fn my_handler(user: AuthUser) -> AppResult<Json<()>> {
///     tracing::info!(user_id = user.user_id, "handling request");
///     Ok(Json(()))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: DbId,
    pub name: String,
    pub email: String,
    pub avatar_url: String,
    pub token_version: i32,
    /// The refresh token that is current after this request: the rotated one
    /// if the gate rotated, else the one presented (if any).
    pub refresh_token: Option<String>,
}

impl AuthUser {
    fn new(identity: Identity, refresh_token: Option<String>) -> Self {
        Self {
            user_id: identity.user_id,
            name: identity.name,
            email: identity.email,
            avatar_url: identity.avatar_url,
            token_version: identity.token_version,
            refresh_token,
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| AppError::InternalError("AuthUser requested on an ungated route".into()))
    }
}

impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());
        Ok(request_context(&parts.headers, peer))
    }
}

/// Build the audit context from headers, falling back to the socket peer.
pub fn request_context(headers: &HeaderMap, peer: Option<String>) -> RequestContext {
    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string);

    RequestContext {
        user_agent,
        ip_address: extract_client_ip(headers).or(peer),
    }
}

fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Gate middleware for protected routes.
///
/// On acceptance inserts [`AuthUser`] into the request extensions and, if the
/// gate rotated the session, delivers the new tokens as cookies (unless the
/// handler already set cookies itself, as logout does). On rejection responds
/// 401 and clears the cookies when they can never succeed again.
pub async fn require_auth(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let tokens = presented_tokens(request.headers());
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());
    let ctx = request_context(request.headers(), peer);

    let outcome = state.gate.evaluate(&tokens, &ctx, Utc::now()).await;

    let identity = match outcome.decision {
        Ok(identity) => identity,
        Err(code) => {
            let mut response = AppError::Rejected(code).into_response();
            if code.clears_credentials() {
                match state.cookies.clear_cookies() {
                    Ok(cookies) => append_cookies(response.headers_mut(), cookies),
                    Err(e) => tracing::error!(error = %e, "Failed to build clearing cookies"),
                }
            }
            return response;
        }
    };

    let refresh_token = outcome
        .issued
        .as_ref()
        .map(|issued| issued.refresh_token.clone())
        .or(tokens.refresh);
    request
        .extensions_mut()
        .insert(AuthUser::new(identity, refresh_token));

    let mut response = next.run(request).await;

    if let Some(issued) = outcome.issued {
        if !response.headers().contains_key(SET_COOKIE) {
            match state.cookies.token_cookies(&issued) {
                Ok(cookies) => append_cookies(response.headers_mut(), cookies),
                Err(e) => tracing::error!(error = %e, "Failed to build rotated token cookies"),
            }
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn client_ip_prefers_forwarded_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("1.2.3.4, 5.6.7.8"));
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        let ctx = request_context(&headers, Some("10.0.0.1".into()));
        assert_eq!(ctx.ip_address.as_deref(), Some("1.2.3.4"));
    }

    #[test]
    fn client_ip_falls_back_to_real_ip_then_peer() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        assert_eq!(
            request_context(&headers, None).ip_address.as_deref(),
            Some("9.9.9.9")
        );

        let ctx = request_context(&HeaderMap::new(), Some("10.0.0.1".into()));
        assert_eq!(ctx.ip_address.as_deref(), Some("10.0.0.1"));
        assert!(ctx.user_agent.is_none());
    }

    #[test]
    fn user_agent_is_recorded() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("Mozilla/5.0"));
        assert_eq!(
            request_context(&headers, None).user_agent.as_deref(),
            Some("Mozilla/5.0")
        );
    }
}
