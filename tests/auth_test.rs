//! Integration tests for signup, login, token check, and profile updates.

use serde_json::{json, Value};
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Helper: start the server on a random port and return (base_url, addr).
async fn start_test_server() -> (String, SocketAddr) {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let db = swifttalk_server::db::init_db(&data_dir).expect("Failed to init DB");
    let jwt_secret = swifttalk_server::auth::jwt::load_or_generate_jwt_secret(&data_dir)
        .expect("Failed to generate JWT secret");

    let state = swifttalk_server::state::AppState {
        db,
        jwt_secret,
        connections: swifttalk_server::ws::ConnectionRegistry::new(),
        data_dir: data_dir.clone(),
    };

    let app = swifttalk_server::routes::build_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
        let _keep = tmp_dir;
    });

    let base_url = format!("http://{}", addr);
    (base_url, addr)
}

fn signup_body(name: &str, email: &str) -> Value {
    json!({
        "fullName": name,
        "email": email,
        "password": "correct horse battery",
        "bio": "integration test user",
    })
}

#[tokio::test]
async fn test_signup_issues_token_and_rejects_duplicates() {
    let (base_url, _addr) = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/auth/signup", base_url))
        .json(&signup_body("Alice", "alice@example.com"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();
    assert!(!body["token"].as_str().unwrap().is_empty());
    assert_eq!(body["user"]["fullName"].as_str().unwrap(), "Alice");
    assert!(body["user"].get("passwordHash").is_none());

    // Same email again
    let resp = client
        .post(format!("{}/api/auth/signup", base_url))
        .json(&signup_body("Alice Again", "alice@example.com"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
}

#[tokio::test]
async fn test_signup_requires_all_fields() {
    let (base_url, _addr) = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/auth/signup", base_url))
        .json(&json!({
            "fullName": "No Bio",
            "email": "nobio@example.com",
            "password": "correct horse battery",
            "bio": "",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Too-short password
    let resp = client
        .post(format!("{}/api/auth/signup", base_url))
        .json(&json!({
            "fullName": "Shorty",
            "email": "shorty@example.com",
            "password": "short",
            "bio": "bio",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_login_and_check() {
    let (base_url, _addr) = start_test_server().await;
    let client = reqwest::Client::new();

    client
        .post(format!("{}/api/auth/signup", base_url))
        .json(&signup_body("Alice", "alice@example.com"))
        .send()
        .await
        .unwrap();

    let resp = client
        .post(format!("{}/api/auth/login", base_url))
        .json(&json!({"email": "alice@example.com", "password": "correct horse battery"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let token = body["token"].as_str().unwrap();

    // The token authenticates /api/auth/check
    let resp = client
        .get(format!("{}/api/auth/check", base_url))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let user: Value = resp.json().await.unwrap();
    assert_eq!(user["email"].as_str().unwrap(), "alice@example.com");

    // No token, no access
    let resp = client
        .get(format!("{}/api/auth/check", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_login_rejects_bad_credentials_uniformly() {
    let (base_url, _addr) = start_test_server().await;
    let client = reqwest::Client::new();

    client
        .post(format!("{}/api/auth/signup", base_url))
        .json(&signup_body("Alice", "alice@example.com"))
        .send()
        .await
        .unwrap();

    // Wrong password and unknown email look the same
    let resp = client
        .post(format!("{}/api/auth/login", base_url))
        .json(&json!({"email": "alice@example.com", "password": "wrong password!"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = client
        .post(format!("{}/api/auth/login", base_url))
        .json(&json!({"email": "nobody@example.com", "password": "correct horse battery"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_update_profile() {
    let (base_url, _addr) = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/auth/signup", base_url))
        .json(&signup_body("Alice", "alice@example.com"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    let token = body["token"].as_str().unwrap().to_string();

    let resp = client
        .put(format!("{}/api/auth/update-profile", base_url))
        .bearer_auth(&token)
        .json(&json!({
            "bio": "updated bio",
            "profilePic": "data:image/png;base64,ZmFrZSBwbmcgYnl0ZXM=",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let user: Value = resp.json().await.unwrap();
    assert_eq!(user["bio"].as_str().unwrap(), "updated bio");
    // Name untouched, picture persisted as a media URL
    assert_eq!(user["fullName"].as_str().unwrap(), "Alice");
    assert!(user["profilePic"].as_str().unwrap().starts_with("/media/"));

    // The update is durable
    let resp = client
        .get(format!("{}/api/auth/check", base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let user: Value = resp.json().await.unwrap();
    assert_eq!(user["bio"].as_str().unwrap(), "updated bio");
}
