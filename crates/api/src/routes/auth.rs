//! Route definitions for the `/auth` resource.

use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;

use crate::handlers::auth;
use crate::middleware::auth::require_auth;
use crate::state::AppState;

/// Routes mounted at `/auth`.
///
/// ```text
/// POST /signup/send-otp  -> send_signup_otp
/// POST /signup           -> signup
/// POST /login            -> login
/// POST /google           -> provider_login
/// POST /send-reset-otp   -> send_reset_otp
/// POST /reset-password   -> reset_password
/// GET  /me               -> me          (requires auth)
/// POST /logout           -> logout      (requires auth)
/// POST /logout-all       -> logout_all  (requires auth)
/// ```
pub fn router(state: &AppState) -> Router<AppState> {
    let gated = Router::new()
        .route("/me", get(auth::me))
        .route("/logout", post(auth::logout))
        .route("/logout-all", post(auth::logout_all))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/signup/send-otp", post(auth::send_signup_otp))
        .route("/signup", post(auth::signup))
        .route("/login", post(auth::login))
        .route("/google", post(auth::provider_login))
        .route("/send-reset-otp", post(auth::send_reset_otp))
        .route("/reset-password", post(auth::reset_password))
        .merge(gated)
}
