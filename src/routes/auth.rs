// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Authentication routes.
//!
//! Tokens travel either as HttpOnly cookies or in the JSON body depending on
//! `TOKEN_TRANSPORT`. In cookie mode the refresh token is only ever read from
//! its cookie.

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap},
    middleware,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::{CookieSettings, TokenTransport};
use crate::error::{AppError, Result};
use crate::middleware::auth::{AuthUser, ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE};
use crate::middleware::{route_rate_limit, ClientIp, RouteLimit};
use crate::models::{Role, UserPublic};
use crate::services::{AuthTokens, ClientMeta, LoginRequest, RateLimitClass, RegisterRequest};
use crate::AppState;

pub fn routes(state: &Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/auth/register",
            post(register).layer(middleware::from_fn_with_state(
                (state.clone(), RouteLimit::new("register", RateLimitClass::Auth)),
                route_rate_limit,
            )),
        )
        .route(
            "/api/auth/login",
            post(login).layer(middleware::from_fn_with_state(
                (state.clone(), RouteLimit::new("login", RateLimitClass::Auth)),
                route_rate_limit,
            )),
        )
        .route(
            "/api/auth/refresh",
            post(refresh).layer(middleware::from_fn_with_state(
                (state.clone(), RouteLimit::new("refresh", RateLimitClass::Auth)),
                route_rate_limit,
            )),
        )
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(me))
        .route("/api/auth/validate", get(validate))
}

/// Response for register, login and refresh.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub token_type: &'static str,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    pub user: UserPublic,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn ok(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub success: bool,
    pub user: UserPublic,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateResponse {
    pub success: bool,
    pub valid: bool,
    pub user_id: Uuid,
    pub role: Role,
}

/// Optional body for refresh and logout in body-transport mode.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshTokenBody {
    refresh_token: Option<String>,
}

async fn register(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    headers: HeaderMap,
    jar: CookieJar,
    payload: std::result::Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<AuthResponse>)> {
    let Json(request) = payload?;
    let tokens = state
        .auth
        .register(request, &client_meta(ip, &headers))
        .await?;
    Ok(respond(&state, jar, tokens, "User registered successfully"))
}

async fn login(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    headers: HeaderMap,
    jar: CookieJar,
    payload: std::result::Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<AuthResponse>)> {
    let Json(request) = payload?;
    let tokens = state.auth.login(request, &client_meta(ip, &headers)).await?;
    Ok(respond(&state, jar, tokens, "Login successful"))
}

async fn refresh(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    headers: HeaderMap,
    jar: CookieJar,
    body: Bytes,
) -> Result<(CookieJar, Json<AuthResponse>)> {
    let token = presented_refresh_token(&state, &jar, &body)
        .ok_or_else(|| AppError::BadRequest("Refresh token is required".to_string()))?;

    let tokens = state
        .auth
        .refresh(&token, &client_meta(ip, &headers))
        .await?;
    Ok(respond(&state, jar, tokens, "Token refreshed successfully"))
}

async fn logout(
    State(state): State<Arc<AppState>>,
    user: Option<AuthUser>,
    jar: CookieJar,
    body: Bytes,
) -> Result<(CookieJar, Json<MessageResponse>)> {
    let token = presented_refresh_token(&state, &jar, &body);
    state
        .auth
        .logout(user.map(|u| u.user_id), token.as_deref())
        .await?;

    let settings = &state.config.cookies;
    let jar = jar
        .add(token_cookie(ACCESS_TOKEN_COOKIE, String::new(), 0, settings))
        .add(token_cookie(REFRESH_TOKEN_COOKIE, String::new(), 0, settings));

    Ok((jar, MessageResponse::ok("Logged out successfully")))
}

async fn me(State(state): State<Arc<AppState>>, user: Option<AuthUser>) -> Result<Json<UserResponse>> {
    let user = user.ok_or_else(|| AppError::BadRequest("Not authenticated".to_string()))?;
    let user = state.auth.me(user.user_id).await?;
    Ok(Json(UserResponse {
        success: true,
        user,
    }))
}

async fn validate(user: Option<AuthUser>) -> Result<Json<ValidateResponse>> {
    let user =
        user.ok_or_else(|| AppError::BadRequest("Invalid or expired token".to_string()))?;
    Ok(Json(ValidateResponse {
        success: true,
        valid: true,
        user_id: user.user_id,
        role: user.role,
    }))
}

fn client_meta(ip: String, headers: &HeaderMap) -> ClientMeta {
    ClientMeta {
        ip_address: Some(ip),
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string),
    }
}

/// Refresh token supplied by the client, honoring the transport mode.
fn presented_refresh_token(state: &AppState, jar: &CookieJar, body: &[u8]) -> Option<String> {
    let from_cookie = || {
        jar.get(REFRESH_TOKEN_COOKIE)
            .map(|c| c.value().to_string())
            .filter(|t| !t.is_empty())
    };

    match state.config.token_transport {
        TokenTransport::Cookie => from_cookie(),
        TokenTransport::Body => serde_json::from_slice::<RefreshTokenBody>(body)
            .ok()
            .and_then(|b| b.refresh_token)
            .filter(|t| !t.trim().is_empty())
            .or_else(from_cookie),
    }
}

fn respond(
    state: &AppState,
    jar: CookieJar,
    tokens: AuthTokens,
    message: &str,
) -> (CookieJar, Json<AuthResponse>) {
    let expires_in = state.auth.codec().ttl_secs();
    let mut response = AuthResponse {
        success: true,
        message: message.to_string(),
        access_token: None,
        refresh_token: None,
        token_type: "Bearer",
        expires_in,
        user: tokens.user,
    };

    let jar = match state.config.token_transport {
        TokenTransport::Cookie => {
            let settings = &state.config.cookies;
            let refresh_ttl = state.auth.refresh_tokens().ttl_secs();
            jar.add(token_cookie(
                ACCESS_TOKEN_COOKIE,
                tokens.access_token,
                expires_in,
                settings,
            ))
            .add(token_cookie(
                REFRESH_TOKEN_COOKIE,
                tokens.refresh_token,
                refresh_ttl,
                settings,
            ))
        }
        TokenTransport::Body => {
            response.access_token = Some(tokens.access_token);
            response.refresh_token = Some(tokens.refresh_token);
            jar
        }
    };

    (jar, Json(response))
}

/// Build a token cookie. A `max_age_secs` of zero produces a removal cookie.
fn token_cookie(
    name: &'static str,
    value: String,
    max_age_secs: i64,
    settings: &CookieSettings,
) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(settings.secure)
        .same_site(settings.same_site)
        .max_age(time::Duration::seconds(max_age_secs))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum_extra::extract::cookie::SameSite;

    #[test]
    fn test_token_cookie_attributes() {
        let settings = CookieSettings {
            secure: true,
            same_site: SameSite::Strict,
        };
        let cookie = token_cookie(ACCESS_TOKEN_COOKIE, "abc".to_string(), 900, &settings).to_string();

        assert!(cookie.starts_with("accessToken=abc"));
        assert!(cookie.contains("Path=/"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Secure"));
        assert!(cookie.contains("SameSite=Strict"));
        assert!(cookie.contains("Max-Age=900"));
    }

    #[test]
    fn test_auth_response_omits_absent_tokens() {
        let response = AuthResponse {
            success: true,
            message: "ok".to_string(),
            access_token: None,
            refresh_token: None,
            token_type: "Bearer",
            expires_in: 900,
            user: UserPublic {
                id: Uuid::nil(),
                name: "Alice".to_string(),
                email: "alice@example.com".to_string(),
                role: Role::User,
            },
        };
        let json = serde_json::to_value(&response).unwrap();

        assert!(json.get("accessToken").is_none());
        assert!(json.get("refreshToken").is_none());
        assert_eq!(json["tokenType"], "Bearer");
        assert_eq!(json["expiresIn"], 900);
        assert_eq!(json["user"]["role"], "USER");
    }
}
