// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Lost & Found authentication and request-admission core.
//!
//! This crate provides the backend API for registering and logging in users,
//! rotating refresh tokens, and admitting requests through a per-client
//! rate limiter ahead of authentication.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use config::Config;
use db::{RefreshTokenStore, UserStore};
use services::{AuthService, RateLimiter, RefreshTokenService, TokenCodec};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub auth: AuthService,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    /// Wire up services from `config` on top of a storage backend.
    pub fn new<S>(config: Config, db: Arc<S>) -> anyhow::Result<Self>
    where
        S: UserStore + RefreshTokenStore + 'static,
    {
        let users: Arc<dyn UserStore> = db.clone();
        let refresh_tokens = RefreshTokenService::new(db, config.refresh_token_ttl_secs);
        let codec = TokenCodec::new(&config.jwt_signing_key, config.access_token_ttl_secs);
        let auth = AuthService::new(users, refresh_tokens, codec, config.bcrypt_cost)?;
        let rate_limiter = RateLimiter::new(config.rate_limits);

        Ok(Self {
            config,
            auth,
            rate_limiter,
        })
    }
}
