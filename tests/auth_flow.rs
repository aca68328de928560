mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, read_json, TestApp};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Deserialize)]
struct UserInfo {
    id: Uuid,
    email: String,
    name: String,
    role: String,
}

#[derive(Deserialize)]
struct LoginInfo {
    access_token: String,
    token_type: String,
    expires_in: i64,
    user: UserInfo,
}

#[tokio::test]
async fn register_login_and_me_roundtrip() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };

    let response = app
        .post_json(
            "/api/auth/register",
            &json!({
                "email": "  Alice@Example.com ",
                "password": "long-enough",
                "name": "Alice",
                "role": "coach"
            }),
            None,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let registered: LoginInfo = read_json(response).await?;
    assert_eq!(registered.token_type, "Bearer");
    assert_eq!(registered.expires_in, 3600);
    assert_eq!(registered.user.email, "alice@example.com");
    assert_eq!(registered.user.role, "coach");

    let token = app.login_token("alice@example.com", "long-enough").await?;

    let response = app.get("/api/auth/me", Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let me: UserInfo = read_json(response).await?;
    assert_eq!(me.id, registered.user.id);
    assert_eq!(me.name, "Alice");
    assert_eq!(me.role, "coach");

    // The registration token is usable straight away.
    let response = app
        .get("/api/auth/me", Some(&registered.access_token))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn registration_validates_input() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };

    let valid = json!({
        "email": "bob@example.com",
        "password": "long-enough",
        "name": "Bob",
        "role": "seeker"
    });
    let response = app.post_json("/api/auth/register", &valid, None).await?;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app.post_json("/api/auth/register", &valid, None).await?;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    for invalid in [
        json!({ "email": "carol@example.com", "password": "short", "name": "Carol", "role": "seeker" }),
        json!({ "email": "carol@example.com", "password": "long-enough", "name": "Carol", "role": "admin" }),
        json!({ "email": "not-an-email", "password": "long-enough", "name": "Carol", "role": "seeker" }),
    ] {
        let response = app.post_json("/api/auth/register", &invalid, None).await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn bad_credentials_and_tokens_are_rejected() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };
    app.insert_user("dave@example.com", "correct-horse", "seeker")
        .await?;

    let response = app
        .post_json(
            "/api/auth/login",
            &json!({ "email": "dave@example.com", "password": "wrong-horse" }),
            None,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .post_json(
            "/api/auth/login",
            &json!({ "email": "nobody@example.com", "password": "correct-horse" }),
            None,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.get("/api/auth/me", Some("not-a-token")).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.get("/api/auth/me", None).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .get("/api/notifications/stream?token=not-a-token", None)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn health_reports_database_status() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };

    let response = app.get("/api/health", None).await?;
    assert_eq!(response.status(), StatusCode::OK);

    app.cleanup().await?;
    Ok(())
}
