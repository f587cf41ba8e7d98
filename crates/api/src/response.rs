//! Shared response body types for API handlers.
//!
//! Use these instead of ad-hoc `serde_json::json!` payloads to get
//! compile-time type safety and consistent serialization.

use serde::Serialize;

/// `{ "user": T }` returned by every flow that signs a user in.
#[derive(Debug, Serialize)]
pub struct UserEnvelope<T: Serialize> {
    pub user: T,
}

/// `{ "success": true, "message": ... }` acknowledgement.
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
        }
    }
}
