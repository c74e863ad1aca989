// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Middleware modules (rate limiting, authentication, authorization).

pub mod auth;
pub mod client_ip;
pub mod rate_limit;

pub use auth::{authenticate, authorize, AuthUser};
pub use client_ip::ClientIp;
pub use rate_limit::{rate_limit, route_rate_limit, RouteLimit};
