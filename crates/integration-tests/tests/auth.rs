//! Registration, login, password change and password reset over HTTP.

use partyrent_core::PhoneNumber;
use partyrent_integration_tests::{PASSWORD, TestApp, body, expect_error};
use reqwest::StatusCode;
use serde_json::{Value, json};

const PHONE: &str = "0912 345 6789";

#[tokio::test]
async fn test_register_logs_in_and_me_returns_account() {
    let app = TestApp::spawn().await;
    let client = app.customer(PHONE).await;

    let resp = client
        .get(app.url("/api/auth/me"))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), StatusCode::OK);
    let me: Value = body(resp).await;
    assert_eq!(me["phone"], "09123456789");
    assert_eq!(me["role"], "user");
    assert_eq!(me["firstName"], "Test");
}

#[tokio::test]
async fn test_duplicate_phone_is_conflict_after_normalization() {
    let app = TestApp::spawn().await;
    app.customer(PHONE).await;

    let resp = TestApp::client()
        .post(app.url("/api/auth/register"))
        .json(&json!({
            "firstName": "Other",
            "lastName": "Person",
            "phone": "0912-345-6789",
            "password": PASSWORD,
        }))
        .send()
        .await
        .expect("request");
    expect_error(resp, StatusCode::CONFLICT, "conflict").await;
}

#[tokio::test]
async fn test_register_rejects_short_password() {
    let app = TestApp::spawn().await;
    let resp = TestApp::client()
        .post(app.url("/api/auth/register"))
        .json(&json!({
            "firstName": "Test",
            "lastName": "Customer",
            "phone": PHONE,
            "password": "short",
        }))
        .send()
        .await
        .expect("request");
    expect_error(resp, StatusCode::BAD_REQUEST, "validation").await;
}

#[tokio::test]
async fn test_logout_ends_session() {
    let app = TestApp::spawn().await;
    let client = app.customer(PHONE).await;

    let resp = client
        .post(app.url("/api/auth/logout"))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = client
        .get(app.url("/api/auth/me"))
        .send()
        .await
        .expect("request");
    expect_error(resp, StatusCode::UNAUTHORIZED, "authentication").await;
}

#[tokio::test]
async fn test_wrong_password_is_unauthenticated() {
    let app = TestApp::spawn().await;
    app.customer(PHONE).await;

    let resp = TestApp::client()
        .post(app.url("/api/auth/login"))
        .json(&json!({ "phone": PHONE, "password": "not the password" }))
        .send()
        .await
        .expect("request");
    expect_error(resp, StatusCode::UNAUTHORIZED, "authentication").await;
}

#[tokio::test]
async fn test_change_password_requires_current_password() {
    let app = TestApp::spawn().await;
    let client = app.customer(PHONE).await;

    let resp = client
        .post(app.url("/api/auth/change-password"))
        .json(&json!({ "currentPassword": "wrong guess", "newPassword": "brand new secret" }))
        .send()
        .await
        .expect("request");
    expect_error(resp, StatusCode::BAD_REQUEST, "validation").await;

    let resp = client
        .post(app.url("/api/auth/change-password"))
        .json(&json!({ "currentPassword": PASSWORD, "newPassword": "brand new secret" }))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = TestApp::client()
        .post(app.url("/api/auth/login"))
        .json(&json!({ "phone": PHONE, "password": "brand new secret" }))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_password_reset_with_sms_code() {
    let app = TestApp::spawn().await;
    app.customer(PHONE).await;
    let client = TestApp::client();

    let resp = client
        .post(app.url("/api/auth/forgot-password/request"))
        .json(&json!({ "phone": PHONE }))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), StatusCode::OK);

    let phone = PhoneNumber::parse(PHONE).expect("valid phone");
    let message = app.sms.last_message_to(&phone).await.expect("code sent");
    let code = message
        .split_whitespace()
        .find(|w| w.trim_end_matches('.').chars().all(|c| c.is_ascii_digit()) && w.len() > 1)
        .map(|w| w.trim_end_matches('.').to_owned())
        .expect("message contains a code");

    let resp = client
        .post(app.url("/api/auth/forgot-password"))
        .json(&json!({ "phone": PHONE, "code": code, "newPassword": "reset secret 42" }))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), StatusCode::OK);

    // Codes are single use.
    let resp = client
        .post(app.url("/api/auth/forgot-password"))
        .json(&json!({ "phone": PHONE, "code": code, "newPassword": "another secret" }))
        .send()
        .await
        .expect("request");
    expect_error(resp, StatusCode::BAD_REQUEST, "validation").await;

    let resp = client
        .post(app.url("/api/auth/login"))
        .json(&json!({ "phone": PHONE, "password": "reset secret 42" }))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_reset_request_for_unknown_phone_looks_the_same() {
    let app = TestApp::spawn().await;

    let resp = TestApp::client()
        .post(app.url("/api/auth/forgot-password/request"))
        .json(&json!({ "phone": PHONE }))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), StatusCode::OK);

    let phone = PhoneNumber::parse(PHONE).expect("valid phone");
    assert!(app.sms.last_message_to(&phone).await.is_none());
}
