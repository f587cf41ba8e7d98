use std::sync::Arc;

use deepguard_core::otp::OtpStore;
use deepguard_db::{SessionStore, UserStore};

use crate::auth::cookies::CookiePolicy;
use crate::auth::credentials::CredentialService;
use crate::auth::gate::AuthGate;
use crate::auth::identity::IdentityVerifier;
use crate::auth::jwt::TokenCodec;
use crate::auth::otp::OtpService;
use crate::auth::session::SessionManager;
use crate::config::ServerConfig;
use crate::email::Mailer;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Credential store, also used for health reporting.
    pub users: Arc<dyn UserStore>,
    pub sessions: Arc<SessionManager>,
    pub gate: Arc<AuthGate>,
    pub credentials: Arc<CredentialService>,
    pub cookies: Arc<CookiePolicy>,
}

/// External collaborators the auth layer is built from.
pub struct Backends {
    pub users: Arc<dyn UserStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub otp: Arc<dyn OtpStore>,
    pub mailer: Arc<dyn Mailer>,
    pub identity: Option<Arc<dyn IdentityVerifier>>,
}

impl AppState {
    /// Wire the auth services together over the given backends.
    pub fn new(config: ServerConfig, backends: Backends) -> Self {
        let codec = Arc::new(TokenCodec::new(config.jwt.clone()));
        let sessions = Arc::new(SessionManager::new(
            Arc::clone(&backends.users),
            backends.sessions,
            codec,
        ));
        let gate = Arc::new(AuthGate::new(Arc::clone(&sessions)));
        let credentials = Arc::new(CredentialService::new(
            Arc::clone(&backends.users),
            Arc::clone(&sessions),
            OtpService::new(backends.otp, config.otp_ttl()),
            backends.mailer,
            backends.identity,
        ));
        let cookies = Arc::new(config.cookie_policy());

        Self {
            config: Arc::new(config),
            users: backends.users,
            sessions,
            gate,
            credentials,
            cookies,
        }
    }
}
