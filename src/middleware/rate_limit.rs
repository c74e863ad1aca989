// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Rate-limit admission middleware.
//!
//! Two flavors share the same bucket registry:
//! - [`rate_limit`] runs on every request, keyed by `ip:CLASS`
//! - [`route_rate_limit`] wraps individual routes, keyed by `ip:route:CLASS`

use crate::error::{AppError, RETRY_AFTER_HEADER};
use crate::middleware::client_ip::{client_ip, peer_addr};
use crate::services::rate_limit::{is_exempt, RateLimitClass, RateLimiter};
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

pub const REMAINING_HEADER: &str = "X-Rate-Limit-Remaining";

/// Per-route limiter configuration.
#[derive(Debug, Clone, Copy)]
pub struct RouteLimit {
    pub route: &'static str,
    pub class: RateLimitClass,
}

impl RouteLimit {
    pub const fn new(route: &'static str, class: RateLimitClass) -> Self {
        Self { route, class }
    }
}

/// Global rate-limit stage.
pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let path = request.uri().path();
    if !state.config.rate_limit_enabled || is_exempt(path) {
        return Ok(next.run(request).await);
    }

    let class = RateLimitClass::for_path(path);
    let ip = request_client_ip(&state, &request);
    let key = RateLimiter::bucket_key(&ip, class);

    admit(&state.rate_limiter, &key, class, request, next).await
}

/// Route-level limiter, applied with `from_fn_with_state((state, limit), ..)`.
pub async fn route_rate_limit(
    State((state, limit)): State<(Arc<AppState>, RouteLimit)>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !state.config.rate_limit_enabled {
        return Ok(next.run(request).await);
    }

    let ip = request_client_ip(&state, &request);
    let key = RateLimiter::route_key(&ip, limit.route, limit.class);

    admit(&state.rate_limiter, &key, limit.class, request, next).await
}

fn request_client_ip(state: &AppState, request: &Request) -> String {
    client_ip(
        peer_addr(request.extensions()),
        request.headers(),
        &state.config.trusted_proxies,
    )
}

async fn admit(
    limiter: &RateLimiter,
    key: &str,
    class: RateLimitClass,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let bucket = limiter.resolve_bucket(key, class);
    let probe = bucket.try_consume();

    if !probe.allowed {
        let retry_after_secs = probe.retry_after_secs();
        tracing::warn!(
            bucket = %key,
            class = class.name(),
            retry_after_secs,
            "Rate limit exceeded"
        );
        return Err(AppError::RateLimited { retry_after_secs });
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(REMAINING_HEADER, HeaderValue::from(probe.remaining_tokens));
    headers.insert(
        RETRY_AFTER_HEADER,
        HeaderValue::from(bucket.limit().interval.as_secs()),
    );

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::MemoryDb;
    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::StatusCode;
    use axum::{routing::get, Router};
    use std::net::SocketAddr;
    use tower::ServiceExt;

    fn app(config: Config) -> Router {
        let state = Arc::new(AppState::new(config, Arc::new(MemoryDb::new())).unwrap());
        Router::new()
            .route("/items", get(|| async { "ok" }))
            .route("/health", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn_with_state(state.clone(), rate_limit))
            .with_state(state)
    }

    fn request(uri: &str, peer: &str) -> Request {
        let addr: SocketAddr = peer.parse().unwrap();
        Request::builder()
            .uri(uri)
            .extension(ConnectInfo(addr))
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_admission_headers() {
        let app = app(Config::test_default());
        let response = app.oneshot(request("/items", "10.1.1.1:4000")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(REMAINING_HEADER).unwrap(), "99");
        assert_eq!(response.headers().get(RETRY_AFTER_HEADER).unwrap(), "60");
    }

    #[tokio::test]
    async fn test_health_is_never_limited() {
        let mut config = Config::test_default();
        config
            .rate_limits
            .set(RateLimitClass::Api, 1, std::time::Duration::from_secs(60));
        let app = app(config);

        for _ in 0..5 {
            let response = app
                .clone()
                .oneshot(request("/health", "10.1.1.2:4000"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert!(response.headers().get(REMAINING_HEADER).is_none());
        }
    }

    #[tokio::test]
    async fn test_disabled_limiter_admits_everything() {
        let mut config = Config::test_default();
        config.rate_limit_enabled = false;
        config
            .rate_limits
            .set(RateLimitClass::Api, 1, std::time::Duration::from_secs(60));
        let app = app(config);

        for _ in 0..3 {
            let response = app
                .clone()
                .oneshot(request("/items", "10.1.1.3:4000"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }
}
