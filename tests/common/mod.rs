// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Request, Response},
};
use lostfound_auth::config::Config;
use lostfound_auth::db::{FirestoreDb, MemoryDb};
use lostfound_auth::routes::create_router;
use lostfound_auth::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceExt;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Config for tests that are not about rate limiting.
#[allow(dead_code)]
pub fn test_config() -> Config {
    let mut config = Config::test_default();
    config.rate_limit_enabled = false;
    config
}

/// Create a test app on in-memory storage.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>) {
    create_test_app_with_config(test_config())
}

#[allow(dead_code)]
pub fn create_test_app_with_config(config: Config) -> (axum::Router, Arc<AppState>) {
    let state = Arc::new(
        AppState::new(config, Arc::new(MemoryDb::new())).expect("Failed to build app state"),
    );
    (create_router(state.clone()), state)
}

/// Default peer address for test requests.
#[allow(dead_code)]
pub const TEST_PEER: &str = "192.0.2.10:50000";

/// Build a JSON POST request from `peer`.
#[allow(dead_code)]
pub fn json_request(uri: &str, body: serde_json::Value, peer: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .extension(ConnectInfo(peer.parse::<SocketAddr>().unwrap()))
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Build a request with no body from `peer`.
#[allow(dead_code)]
pub fn empty_request(method: &str, uri: &str, peer: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .extension(ConnectInfo(peer.parse::<SocketAddr>().unwrap()))
}

#[allow(dead_code)]
pub fn register_body(email: &str) -> serde_json::Value {
    serde_json::json!({
        "name": "Alice",
        "email": email,
        "password": "Pw12345!",
        "confirmPassword": "Pw12345!",
    })
}

#[allow(dead_code)]
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[allow(dead_code)]
pub fn set_cookie_headers<B>(response: &Response<B>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|value| value.to_str().unwrap().to_string())
        .collect()
}

/// Value of cookie `name` from the Set-Cookie headers.
#[allow(dead_code)]
pub fn cookie_value(headers: &[String], name: &str) -> Option<String> {
    headers.iter().find_map(|h| {
        h.strip_prefix(&format!("{name}="))
            .map(|rest| rest.split(';').next().unwrap_or_default().to_string())
    })
}

/// Register `email` and return (access token, refresh token) from cookies.
#[allow(dead_code)]
pub async fn register_with_cookies(app: &axum::Router, email: &str) -> (String, String) {
    let response = app
        .clone()
        .oneshot(json_request(
            "/api/auth/register",
            register_body(email),
            TEST_PEER,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::OK);

    let cookies = set_cookie_headers(&response);
    (
        cookie_value(&cookies, "accessToken").expect("access cookie"),
        cookie_value(&cookies, "refreshToken").expect("refresh cookie"),
    )
}
