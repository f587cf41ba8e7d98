//! Integration tests for error response shape across the API.

mod common;

use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{Request, StatusCode};
use common::{body_json, post_json};
use tower::ServiceExt;

#[tokio::test]
async fn credential_errors_use_error_and_code_fields() {
    let test = common::build_test_app();
    let response = post_json(
        test.app(),
        "/auth/login",
        serde_json::json!({ "email": "nobody@example.com", "password": "whatever-pw" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()["cache-control"], "no-store");
    let json = body_json(response).await;
    assert!(json["error"].is_string());
    assert_eq!(json["code"], "INVALID_CREDENTIALS");
}

#[tokio::test]
async fn malformed_json_is_a_client_error() {
    let test = common::build_test_app();
    let request = Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let response = test.app().oneshot(request).await.unwrap();

    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn missing_fields_are_a_client_error() {
    let test = common::build_test_app();
    let response = post_json(
        test.app(),
        "/auth/signup",
        serde_json::json!({ "email": "someone@example.com" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn store_outage_is_sanitized() {
    let test = common::build_test_app();
    test.store.set_unavailable(true);

    let response = post_json(
        test.app(),
        "/auth/login",
        serde_json::json!({ "email": "someone@example.com", "password": "whatever-pw" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert_eq!(json["code"], "INTERNAL_ERROR");
    assert_eq!(json["error"], "An internal error occurred");
}
