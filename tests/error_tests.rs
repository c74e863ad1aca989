// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::http::StatusCode;
use axum::response::IntoResponse;
use lostfound_auth::error::AppError;
use lostfound_auth::services::RefreshTokenError;
use std::collections::BTreeMap;

mod common;
use common::body_json;

#[tokio::test]
async fn test_validation_envelope_lists_fields() {
    let mut errors = BTreeMap::new();
    errors.insert("email".to_string(), "Email should be valid".to_string());

    let response = AppError::Validation(errors).into_response();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["message"], "Validation failed");
    assert_eq!(json["errors"]["email"], "Email should be valid");
}

#[tokio::test]
async fn test_internal_error_is_generic() {
    let response = AppError::Internal(anyhow::anyhow!("secret stack detail")).into_response();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let json = body_json(response).await;
    assert_eq!(
        json["message"],
        "An unexpected error occurred. Please try again later."
    );
    assert!(json.get("errors").is_none());
}

#[test]
fn test_refresh_token_error_mapping() {
    let cases = [
        (
            RefreshTokenError::Expired,
            StatusCode::BAD_REQUEST,
            "Refresh token expired. Please login again.",
        ),
        (
            RefreshTokenError::Revoked,
            StatusCode::BAD_REQUEST,
            "Refresh token has been revoked. Please login again.",
        ),
        (
            RefreshTokenError::NotFound,
            StatusCode::BAD_REQUEST,
            "Invalid refresh token",
        ),
        (
            RefreshTokenError::AlreadyRevoked,
            StatusCode::BAD_REQUEST,
            "Token is already revoked",
        ),
        (
            RefreshTokenError::NotOwner,
            StatusCode::UNAUTHORIZED,
            "This token does not belong to you",
        ),
    ];

    for (err, status, message) in cases {
        let err = AppError::from(err);
        assert_eq!(err.status(), status);
        assert_eq!(err.client_message(), message);
    }
}

#[test]
fn test_status_codes() {
    assert_eq!(AppError::InvalidCredentials.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(AppError::Forbidden.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        AppError::Conflict("dup".to_string()).status(),
        StatusCode::CONFLICT
    );
    assert_eq!(
        AppError::NotFound("x".to_string()).status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        AppError::RateLimited {
            retry_after_secs: 3
        }
        .status(),
        StatusCode::TOO_MANY_REQUESTS
    );
}
