pub mod account;
pub mod auth;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the application route tree (health is mounted separately).
///
/// Route hierarchy:
///
/// ```text
/// /auth/signup/send-otp            send signup OTP (public)
/// /auth/signup                     verify OTP + create account (public)
/// /auth/login                      password login (public)
/// /auth/google                     identity-provider login (public)
/// /auth/send-reset-otp             send password reset OTP (public)
/// /auth/reset-password             verify OTP + set password (public)
/// /auth/me                         current user (requires auth)
/// /auth/logout                     revoke current session (requires auth)
/// /auth/logout-all                 revoke every session (requires auth)
///
/// /api/account/me                  stored profile (requires auth)
/// /api/account/update-profile      PUT name / picture (requires auth)
/// /api/account/change-password     change password (requires auth)
/// /api/account/logout-all          revoke every session (requires auth)
/// /api/account/delete-account      DELETE account (requires auth)
/// ```
pub fn app_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router(state))
        .nest("/api/account", account::router(state))
}
