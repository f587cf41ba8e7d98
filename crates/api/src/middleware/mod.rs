//! Request authentication.
//!
//! - [`auth::require_auth`] -- Runs the auth gate in front of protected routes.
//! - [`auth::AuthUser`] -- Extracts the caller the gate accepted.

pub mod auth;
