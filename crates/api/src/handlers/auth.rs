//! Handlers for the `/auth` resource (signup, login, provider login,
//! password reset, current user, logout).

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use deepguard_db::models::user::UserResponse;
use serde::Deserialize;
use validator::Validate;

use crate::auth::cookies::append_cookies;
use crate::auth::credentials::{Authenticated, SignupInput};
use crate::auth::session::RequestContext;
use crate::auth::AuthError;
use crate::error::{AppError, AppResult};
use crate::handlers::validate_body;
use crate::middleware::auth::AuthUser;
use crate::response::{SuccessResponse, UserEnvelope};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// Request body for `POST /auth/signup/send-otp`.
#[derive(Debug, Deserialize, Validate)]
pub struct SendSignupOtpRequest {
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
    pub name: Option<String>,
}

/// Request body for `POST /auth/signup`.
#[derive(Debug, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
    pub password: String,
    pub name: Option<String>,
    #[validate(length(min = 1, message = "OTP is required"))]
    pub otp: String,
}

/// Request body for `POST /auth/login`.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
    pub password: String,
}

/// Request body for `POST /auth/google`.
#[derive(Debug, Deserialize, Validate)]
pub struct ProviderLoginRequest {
    /// The provider-issued ID token.
    #[validate(length(min = 1, message = "credentials are required"))]
    pub credentials: String,
}

/// Request body for `POST /auth/send-reset-otp`.
#[derive(Debug, Deserialize, Validate)]
pub struct SendResetOtpRequest {
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
}

/// Request body for `POST /auth/reset-password`.
#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "OTP is required"))]
    pub otp: String,
    #[serde(alias = "newPassword")]
    pub new_password: String,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /auth/signup/send-otp
pub async fn send_signup_otp(
    State(state): State<AppState>,
    Json(input): Json<SendSignupOtpRequest>,
) -> AppResult<Json<SuccessResponse>> {
    validate_body(&input)?;
    state
        .credentials
        .send_signup_otp(&input.email, input.name, Utc::now())
        .await?;
    Ok(Json(SuccessResponse::ok()))
}

/// POST /auth/signup
///
/// Verify the OTP, create the account, and sign it in.
pub async fn signup(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(input): Json<SignupRequest>,
) -> AppResult<Response> {
    validate_body(&input)?;
    let auth = state
        .credentials
        .signup(
            SignupInput {
                email: input.email,
                password: input.password,
                name: input.name,
                otp: input.otp,
            },
            &ctx,
            Utc::now(),
        )
        .await?;
    signed_in(&state, auth)
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(input): Json<LoginRequest>,
) -> AppResult<Response> {
    validate_body(&input)?;
    let auth = state
        .credentials
        .login(&input.email, &input.password, &ctx, Utc::now())
        .await?;
    signed_in(&state, auth)
}

/// POST /auth/google
pub async fn provider_login(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(input): Json<ProviderLoginRequest>,
) -> AppResult<Response> {
    validate_body(&input)?;
    let auth = state
        .credentials
        .provider_login(&input.credentials, &ctx, Utc::now())
        .await?;
    signed_in(&state, auth)
}

/// POST /auth/send-reset-otp
pub async fn send_reset_otp(
    State(state): State<AppState>,
    Json(input): Json<SendResetOtpRequest>,
) -> AppResult<Json<SuccessResponse>> {
    validate_body(&input)?;
    state
        .credentials
        .send_reset_otp(&input.email, Utc::now())
        .await?;
    Ok(Json(SuccessResponse::ok()))
}

/// POST /auth/reset-password
///
/// Sets the new password and signs the account out everywhere.
pub async fn reset_password(
    State(state): State<AppState>,
    Json(input): Json<ResetPasswordRequest>,
) -> AppResult<Json<SuccessResponse>> {
    validate_body(&input)?;
    state
        .credentials
        .reset_password(&input.email, &input.otp, &input.new_password, Utc::now())
        .await?;
    Ok(Json(SuccessResponse::with_message("Password reset successful")))
}

/// GET /auth/me (requires auth)
pub async fn me(user: AuthUser) -> Json<UserResponse> {
    Json(UserResponse {
        id: user.user_id,
        name: user.name,
        email: user.email,
        profile_picture: user.avatar_url,
    })
}

/// POST /auth/logout (requires auth)
///
/// Revokes the current session only.
pub async fn logout(State(state): State<AppState>, user: AuthUser) -> AppResult<Response> {
    if let Some(refresh_token) = user.refresh_token.as_deref() {
        state
            .sessions
            .revoke_one(refresh_token)
            .await
            .map_err(AuthError::from)?;
    }
    tracing::info!(user_id = user.user_id, "User logged out");
    cleared(&state, SuccessResponse::ok())
}

/// POST /auth/logout-all (requires auth)
///
/// Revokes every session of the caller by bumping `token_version`.
pub async fn logout_all(State(state): State<AppState>, user: AuthUser) -> AppResult<Response> {
    state
        .sessions
        .revoke_all(user.user_id)
        .await
        .map_err(AuthError::from)?;
    cleared(&state, SuccessResponse::ok())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// `{ "user": ... }` plus the token cookies.
fn signed_in(state: &AppState, auth: Authenticated) -> AppResult<Response> {
    let cookies = state
        .cookies
        .token_cookies(&auth.tokens)
        .map_err(|e| AppError::InternalError(format!("Cookie build error: {e}")))?;
    let mut headers = HeaderMap::new();
    append_cookies(&mut headers, cookies);

    let body = UserEnvelope {
        user: UserResponse::from(&auth.user),
    };
    Ok((headers, Json(body)).into_response())
}

/// `body` plus cookies that expire both tokens.
pub(crate) fn cleared(state: &AppState, body: SuccessResponse) -> AppResult<Response> {
    let cookies = state
        .cookies
        .clear_cookies()
        .map_err(|e| AppError::InternalError(format!("Cookie build error: {e}")))?;
    let mut headers = HeaderMap::new();
    append_cookies(&mut headers, cookies);
    Ok((headers, Json(body)).into_response())
}
