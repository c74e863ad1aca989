// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! JWT authentication and path-based authorization middleware.

use crate::error::AppError;
use crate::models::Role;
use crate::AppState;
use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use std::convert::Infallible;
use std::sync::Arc;
use uuid::Uuid;

pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";

/// Authenticated principal extracted from an access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: Role,
}

/// Access requirement for a request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessRule {
    Public,
    Authenticated,
    Admin,
}

const PUBLIC_PREFIXES: &[&str] = &["/api/auth/", "/uploads/", "/static/"];
const PUBLIC_PATHS: &[&str] = &["/health", "/actuator/health", "/actuator/info"];

impl AccessRule {
    pub fn for_path(path: &str) -> Self {
        if path == "/admin" || path.starts_with("/admin/") {
            AccessRule::Admin
        } else if PUBLIC_PATHS.contains(&path)
            || PUBLIC_PREFIXES.iter().any(|p| path.starts_with(p))
        {
            AccessRule::Public
        } else {
            AccessRule::Authenticated
        }
    }
}

/// Pull the access token from the request: cookie first, then
/// `Authorization: Bearer`.
pub fn extract_access_token(jar: &CookieJar, headers: &HeaderMap) -> Option<String> {
    if let Some(cookie) = jar.get(ACCESS_TOKEN_COOKIE) {
        if !cookie.value().is_empty() {
            return Some(cookie.value().to_string());
        }
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Attach an [`AuthUser`] when the request carries a valid access token.
///
/// Never rejects; a missing or bad token leaves the request anonymous.
pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = extract_access_token(&jar, request.headers()) {
        match state.auth.codec().validate(&token) {
            Some(subject) => {
                request.extensions_mut().insert(AuthUser {
                    user_id: subject.user_id,
                    role: subject.role,
                });
            }
            None => tracing::debug!("Ignoring invalid access token"),
        }
    }

    next.run(request).await
}

/// Enforce [`AccessRule`] for the request path.
pub async fn authorize(request: Request, next: Next) -> Result<Response, AppError> {
    let user = request.extensions().get::<AuthUser>().copied();

    match AccessRule::for_path(request.uri().path()) {
        AccessRule::Public => {}
        AccessRule::Authenticated => {
            if user.is_none() {
                return Err(authentication_required());
            }
        }
        AccessRule::Admin => match user {
            None => return Err(authentication_required()),
            Some(user) if user.role != Role::Admin => {
                tracing::warn!(
                    user_id = %user.user_id,
                    path = %request.uri().path(),
                    "Non-admin attempted admin access"
                );
                return Err(AppError::Forbidden);
            }
            Some(_) => {}
        },
    }

    Ok(next.run(request).await)
}

fn authentication_required() -> AppError {
    AppError::Unauthorized("Authentication required".to_string())
}

impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .copied()
            .ok_or_else(authentication_required)
    }
}

impl<S: Send + Sync> OptionalFromRequestParts<S> for AuthUser {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<AuthUser>().copied())
    }
}
