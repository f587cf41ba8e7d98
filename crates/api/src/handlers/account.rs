//! Handlers for the `/api/account` resource. All routes require auth.

use axum::extract::State;
use axum::response::Response;
use axum::Json;
use deepguard_core::types::DbId;
use deepguard_db::models::user::User;
use serde::{Deserialize, Serialize};

use crate::auth::AuthError;
use crate::error::{AppError, AppResult};
use crate::handlers::auth::cleared;
use crate::middleware::auth::AuthUser;
use crate::response::SuccessResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Stored profile. Unlike the sign-in payload, the picture has no fallback.
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub id: DbId,
    pub name: String,
    pub email: String,
    pub profile_pic: Option<String>,
}

impl From<User> for ProfileResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            profile_pic: user.avatar_url,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProfileUpdated {
    pub success: bool,
    pub user: ProfileResponse,
}

/// Request body for `PUT /api/account/update-profile`.
#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub profile_pic: Option<String>,
}

/// Request body for `POST /api/account/change-password`.
#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/account/me
pub async fn get_profile(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ProfileResponse>> {
    let user = state.credentials.require_user(user.user_id).await?;
    Ok(Json(ProfileResponse::from(user)))
}

/// PUT /api/account/update-profile
pub async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    Json(input): Json<UpdateProfileRequest>,
) -> AppResult<Json<ProfileUpdated>> {
    let updated = state
        .credentials
        .update_profile(user.user_id, input.name, input.profile_pic)
        .await?;
    Ok(Json(ProfileUpdated {
        success: true,
        user: ProfileResponse::from(updated),
    }))
}

/// POST /api/account/change-password
///
/// Other sessions stay signed in.
pub async fn change_password(
    State(state): State<AppState>,
    user: AuthUser,
    Json(input): Json<ChangePasswordRequest>,
) -> AppResult<Json<SuccessResponse>> {
    if input.current_password.is_empty() || input.new_password.is_empty() {
        return Err(AppError::BadRequest(
            "current_password and new_password are required".into(),
        ));
    }
    state
        .credentials
        .change_password(user.user_id, &input.current_password, &input.new_password)
        .await?;
    Ok(Json(SuccessResponse::with_message("Password updated successfully")))
}

/// POST /api/account/logout-all
pub async fn logout_all(State(state): State<AppState>, user: AuthUser) -> AppResult<Response> {
    state
        .sessions
        .revoke_all(user.user_id)
        .await
        .map_err(AuthError::from)?;
    cleared(&state, SuccessResponse::with_message("Logged out from all devices"))
}

/// DELETE /api/account/delete-account
pub async fn delete_account(State(state): State<AppState>, user: AuthUser) -> AppResult<Response> {
    state.credentials.delete_account(user.user_id).await?;
    cleared(&state, SuccessResponse::with_message("Account deleted."))
}
