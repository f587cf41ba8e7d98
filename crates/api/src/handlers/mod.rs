//! Request handlers.
//!
//! Handlers decode the request, delegate to the auth services on
//! [`AppState`](crate::state::AppState) and map errors via
//! [`AppError`](crate::error::AppError).

pub mod account;
pub mod auth;

use deepguard_core::error::CoreError;
use validator::Validate;

use crate::error::{AppError, AppResult};

/// Run `validator` rules on a decoded request body.
pub(crate) fn validate_body<T: Validate>(input: &T) -> AppResult<()> {
    input
        .validate()
        .map_err(|errors| AppError::Core(CoreError::Validation(errors.to_string())))
}
