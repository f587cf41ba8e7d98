//! Route definitions for the `/api/account` resource.

use axum::middleware::from_fn_with_state;
use axum::routing::{delete, get, post, put};
use axum::Router;

use crate::handlers::account;
use crate::middleware::auth::require_auth;
use crate::state::AppState;

/// Routes mounted at `/api/account`. Every route requires auth.
///
/// ```text
/// GET    /me               -> get_profile
/// PUT    /update-profile   -> update_profile
/// POST   /change-password  -> change_password
/// POST   /logout-all       -> logout_all
/// DELETE /delete-account   -> delete_account
/// ```
pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/me", get(account::get_profile))
        .route("/update-profile", put(account::update_profile))
        .route("/change-password", post(account::change_password))
        .route("/logout-all", post(account::logout_all))
        .route("/delete-account", delete(account::delete_account))
        .route_layer(from_fn_with_state(state.clone(), require_auth))
}
