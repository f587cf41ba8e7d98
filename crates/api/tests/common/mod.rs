#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use tokio::sync::Mutex;
use tower::ServiceExt;

use deepguard_api::auth::cookies::SameSite;
use deepguard_api::auth::identity::{IdentityError, IdentityVerifier, ProviderIdentity};
use deepguard_api::auth::jwt::JwtConfig;
use deepguard_api::config::ServerConfig;
use deepguard_api::email::{EmailError, Mailer, OutgoingEmail};
use deepguard_api::router::build_app_router;
use deepguard_api::state::{AppState, Backends};
use deepguard_core::otp::InMemoryOtpStore;
use deepguard_db::MemoryStore;

/// The only ID token [`StubIdentity`] accepts.
pub const GOOGLE_TOKEN: &str = "valid-google-id-token";
pub const GOOGLE_SUB: &str = "google-sub-42";
pub const GOOGLE_EMAIL: &str = "gina@example.com";

pub const PASSWORD: &str = "correct-horse-battery";

pub fn jwt_config() -> JwtConfig {
    JwtConfig {
        access_secret: "integration-access-secret".to_string(),
        refresh_secret: "integration-refresh-secret".to_string(),
        access_token_expiry_mins: 15,
        refresh_token_expiry_days: 30,
    }
}

/// Build a test `ServerConfig` with safe defaults.
///
/// Cookies are not marked `Secure` so they can be inspected over plain HTTP.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:3000".to_string()],
        request_timeout_secs: 30,
        jwt: jwt_config(),
        cookie_secure: false,
        cookie_same_site: SameSite::Lax,
        otp_expiry_mins: 5,
        google_client_id: Some("test-client-id".to_string()),
        session_cleanup_interval_secs: 3600,
    }
}

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

/// Mailer that keeps every message instead of sending it.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), EmailError> {
        self.sent.lock().await.push(email);
        Ok(())
    }
}

impl RecordingMailer {
    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    /// The six-digit code in the most recent message.
    pub async fn last_code(&self) -> String {
        let sent = self.sent.lock().await;
        let body = &sent.last().expect("an email should have been sent").body;
        body.split(|c: char| !c.is_ascii_digit())
            .find(|word| word.len() == 6)
            .expect("the email should contain a six-digit code")
            .to_string()
    }
}

/// Identity provider that accepts exactly [`GOOGLE_TOKEN`].
pub struct StubIdentity;

#[async_trait]
impl IdentityVerifier for StubIdentity {
    async fn verify(&self, token: &str) -> Result<ProviderIdentity, IdentityError> {
        if token != GOOGLE_TOKEN {
            return Err(IdentityError::Invalid("unknown token".into()));
        }
        Ok(ProviderIdentity {
            external_id: GOOGLE_SUB.to_string(),
            email: GOOGLE_EMAIL.to_string(),
            name: Some("Gina".to_string()),
            avatar_url: Some("https://example.com/gina.png".to_string()),
        })
    }
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

/// The full router plus handles on its in-memory backends.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub mailer: Arc<RecordingMailer>,
}

impl TestApp {
    pub fn app(&self) -> Router {
        self.router.clone()
    }
}

/// Build the application router exactly as `main.rs` does, over in-memory
/// stores.
pub fn build_test_app() -> TestApp {
    let config = test_config();
    let store = Arc::new(MemoryStore::new());
    let mailer = Arc::new(RecordingMailer::default());

    let state = AppState::new(
        config.clone(),
        Backends {
            users: store.clone(),
            sessions: store.clone(),
            otp: Arc::new(InMemoryOtpStore::new()),
            mailer: mailer.clone(),
            identity: Some(Arc::new(StubIdentity)),
        },
    );

    TestApp {
        router: build_app_router(state.clone(), &config),
        state,
        store,
        mailer,
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response {
    send(app, Method::GET, uri, None, None).await
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response {
    send(app, Method::POST, uri, None, Some(body)).await
}

/// Issue a request with an optional `Cookie` header and JSON body.
pub async fn send(
    app: Router,
    method: Method,
    uri: &str,
    cookies: Option<&str>,
    body: Option<serde_json::Value>,
) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookies) = cookies {
        builder = builder.header(COOKIE, cookies);
    }
    let request = match body {
        Some(json) => builder
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&json).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// ---------------------------------------------------------------------------
// Cookie helpers
// ---------------------------------------------------------------------------

/// Every `Set-Cookie` header on the response.
pub fn set_cookies(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .map(str::to_string)
        .collect()
}

/// The value the response sets for cookie `name`, if it sets one.
pub fn cookie_value(response: &Response, name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    set_cookies(response).into_iter().find_map(|cookie| {
        cookie
            .strip_prefix(&prefix)
            .map(|rest| rest.split(';').next().unwrap_or_default().to_string())
    })
}

/// A `Cookie` header carrying the given tokens.
pub fn cookie_header(access: Option<&str>, refresh: Option<&str>) -> String {
    let mut parts = Vec::new();
    if let Some(access) = access {
        parts.push(format!("accessToken={access}"));
    }
    if let Some(refresh) = refresh {
        parts.push(format!("refreshToken={refresh}"));
    }
    parts.join("; ")
}

/// Tokens handed out by a sign-in response.
pub struct SignedIn {
    pub access: String,
    pub refresh: String,
    pub body: serde_json::Value,
}

impl SignedIn {
    pub fn cookies(&self) -> String {
        cookie_header(Some(&self.access), Some(&self.refresh))
    }
}

pub async fn signed_in(response: Response) -> SignedIn {
    assert_eq!(response.status(), axum::http::StatusCode::OK);
    let access = cookie_value(&response, "accessToken").expect("access cookie set");
    let refresh = cookie_value(&response, "refreshToken").expect("refresh cookie set");
    SignedIn {
        access,
        refresh,
        body: body_json(response).await,
    }
}

/// Run the OTP signup flow end to end and return the new session.
pub async fn sign_up(test: &TestApp, email: &str, name: &str) -> SignedIn {
    let response = post_json(
        test.app(),
        "/auth/signup/send-otp",
        serde_json::json!({ "email": email, "name": name }),
    )
    .await;
    assert_eq!(response.status(), axum::http::StatusCode::OK);
    let otp = test.mailer.last_code().await;

    let response = post_json(
        test.app(),
        "/auth/signup",
        serde_json::json!({ "email": email, "password": PASSWORD, "name": name, "otp": otp }),
    )
    .await;
    signed_in(response).await
}

pub async fn log_in(test: &TestApp, email: &str, password: &str) -> SignedIn {
    let response = post_json(
        test.app(),
        "/auth/login",
        serde_json::json!({ "email": email, "password": password }),
    )
    .await;
    signed_in(response).await
}
