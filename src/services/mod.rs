// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - authentication and admission logic.

pub mod auth;
pub mod rate_limit;
pub mod refresh_token;
pub mod token;

pub use auth::{AuthService, AuthTokens, ClientMeta, LoginRequest, RegisterRequest};
pub use rate_limit::{RateLimitClass, RateLimiter};
pub use refresh_token::{RefreshTokenError, RefreshTokenService};
pub use token::{TokenCodec, TokenSubject};
