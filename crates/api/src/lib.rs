//! Deepguard authentication server library.
//!
//! Exposes the building blocks (config, state, the auth core, routes, the
//! shared router) so integration tests and the binary entrypoint can both
//! access them.

pub mod auth;
pub mod background;
pub mod config;
pub mod email;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
