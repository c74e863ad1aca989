// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Admin operations: rate-limit inspection and reset, expired refresh token
//! sweep, and account deletion.
//!
//! Access is enforced by the authorization stage for every `/admin` path.

use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::middleware::AuthUser;
use crate::routes::auth::MessageResponse;
use crate::services::rate_limit::ClassInfo;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/rate-limit/stats", get(rate_limit_stats))
        .route("/admin/rate-limit/clear/{ip}", delete(clear_client))
        .route("/admin/rate-limit/clear-all", delete(clear_all))
        .route("/admin/tokens/sweep", post(sweep_tokens))
        .route("/admin/users/{id}", delete(delete_user))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStats {
    pub active_buckets: usize,
    pub rate_limit_types: BTreeMap<&'static str, ClassInfo>,
}

#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub success: bool,
    pub deleted: usize,
}

async fn rate_limit_stats(State(state): State<Arc<AppState>>) -> Json<RateLimitStats> {
    Json(RateLimitStats {
        active_buckets: state.rate_limiter.active_buckets(),
        rate_limit_types: state.rate_limiter.class_info(),
    })
}

async fn clear_client(
    State(state): State<Arc<AppState>>,
    admin: AuthUser,
    Path(ip): Path<String>,
) -> Json<MessageResponse> {
    state.rate_limiter.clear_client(&ip);
    tracing::info!(admin_id = %admin.user_id, client_ip = %ip, "Cleared rate limits for client");
    MessageResponse::ok(format!("Rate limit cleared for IP: {}", ip))
}

async fn clear_all(State(state): State<Arc<AppState>>, admin: AuthUser) -> Json<MessageResponse> {
    state.rate_limiter.clear_all();
    tracing::info!(admin_id = %admin.user_id, "Cleared all rate limits");
    MessageResponse::ok("All rate limits cleared")
}

/// Hook for the external daily cleanup scheduler.
async fn sweep_tokens(State(state): State<Arc<AppState>>) -> Result<Json<SweepResponse>> {
    let deleted = state
        .auth
        .refresh_tokens()
        .sweep_expired(Utc::now())
        .await?;
    Ok(Json(SweepResponse {
        success: true,
        deleted,
    }))
}

async fn delete_user(
    State(state): State<Arc<AppState>>,
    admin: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>> {
    let user_id =
        Uuid::parse_str(&id).map_err(|_| AppError::BadRequest("Invalid user id".to_string()))?;

    state.auth.delete_user(user_id).await?;
    tracing::info!(admin_id = %admin.user_id, user_id = %user_id, "Admin deleted user");
    Ok(MessageResponse::ok("User deleted successfully"))
}
