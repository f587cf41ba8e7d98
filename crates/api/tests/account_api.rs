//! HTTP-level integration tests for the `/api/account` endpoints.

mod common;

use axum::http::{Method, StatusCode};
use common::{body_json, cookie_value, get, log_in, post_json, send, sign_up, PASSWORD};

#[tokio::test]
async fn account_routes_require_auth() {
    let test = common::build_test_app();

    let response = get(test.app(), "/api/account/me").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(
        test.app(),
        Method::DELETE,
        "/api/account/delete-account",
        None,
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], "NO_TOKENS");
}

#[tokio::test]
async fn profile_returns_stored_picture_without_fallback() {
    let test = common::build_test_app();
    let session = sign_up(&test, "uma@example.com", "Uma").await;

    let response = send(
        test.app(),
        Method::GET,
        "/api/account/me",
        Some(&session.cookies()),
        None,
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["email"], "uma@example.com");
    assert_eq!(json["name"], "Uma");
    assert!(json["profile_pic"].is_null());
}

#[tokio::test]
async fn update_profile_changes_name_and_picture() {
    let test = common::build_test_app();
    let session = sign_up(&test, "vic@example.com", "Vic").await;

    let response = send(
        test.app(),
        Method::PUT,
        "/api/account/update-profile",
        Some(&session.cookies()),
        Some(serde_json::json!({ "name": "Victor", "profile_pic": "https://example.com/v.png" })),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["user"]["name"], "Victor");
    assert_eq!(json["user"]["profile_pic"], "https://example.com/v.png");

    let response = send(test.app(), Method::GET, "/auth/me", Some(&session.cookies()), None).await;
    let json = body_json(response).await;
    assert_eq!(json["name"], "Victor");
    assert_eq!(json["profilePicture"], "https://example.com/v.png");
}

#[tokio::test]
async fn update_profile_with_nothing_to_change_is_rejected() {
    let test = common::build_test_app();
    let session = sign_up(&test, "wes@example.com", "Wes").await;

    let response = send(
        test.app(),
        Method::PUT,
        "/api/account/update-profile",
        Some(&session.cookies()),
        Some(serde_json::json!({ "name": "   " })),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn change_password_keeps_other_sessions() {
    let test = common::build_test_app();
    let first = sign_up(&test, "xan@example.com", "Xan").await;
    let second = log_in(&test, "xan@example.com", PASSWORD).await;

    let response = send(
        test.app(),
        Method::POST,
        "/api/account/change-password",
        Some(&first.cookies()),
        Some(serde_json::json!({ "current_password": PASSWORD, "new_password": "another-good-secret" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["success"], true);

    let response = send(test.app(), Method::GET, "/auth/me", Some(&second.cookies()), None).await;
    assert_eq!(response.status(), StatusCode::OK);

    log_in(&test, "xan@example.com", "another-good-secret").await;
}

#[tokio::test]
async fn change_password_with_wrong_current_password_is_rejected() {
    let test = common::build_test_app();
    let session = sign_up(&test, "yul@example.com", "Yul").await;

    let response = send(
        test.app(),
        Method::POST,
        "/api/account/change-password",
        Some(&session.cookies()),
        Some(serde_json::json!({ "current_password": "wrong-password", "new_password": "another-good-secret" })),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], "INVALID_CREDENTIALS");
}

#[tokio::test]
async fn change_password_requires_both_fields() {
    let test = common::build_test_app();
    let session = sign_up(&test, "zed@example.com", "Zed").await;

    let response = send(
        test.app(),
        Method::POST,
        "/api/account/change-password",
        Some(&session.cookies()),
        Some(serde_json::json!({ "current_password": "", "new_password": "" })),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn account_logout_all_clears_cookies() {
    let test = common::build_test_app();
    let session = sign_up(&test, "abe@example.com", "Abe").await;

    let response = send(
        test.app(),
        Method::POST,
        "/api/account/logout-all",
        Some(&session.cookies()),
        None,
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(cookie_value(&response, "accessToken").as_deref(), Some(""));
    assert_eq!(body_json(response).await["message"], "Logged out from all devices");
    assert_eq!(test.store.session_count().await, 0);
}

#[tokio::test]
async fn delete_account_removes_user_and_sessions() {
    let test = common::build_test_app();
    let session = sign_up(&test, "bea@example.com", "Bea").await;
    log_in(&test, "bea@example.com", PASSWORD).await;

    let response = send(
        test.app(),
        Method::DELETE,
        "/api/account/delete-account",
        Some(&session.cookies()),
        None,
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(cookie_value(&response, "refreshToken").as_deref(), Some(""));
    assert_eq!(body_json(response).await["message"], "Account deleted.");
    assert_eq!(test.store.session_count().await, 0);

    let response = send(test.app(), Method::GET, "/auth/me", Some(&session.cookies()), None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], "USER_NOT_FOUND");

    let response = post_json(
        test.app(),
        "/auth/login",
        serde_json::json!({ "email": "bea@example.com", "password": PASSWORD }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
