// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Client IP extraction.
//!
//! `X-Forwarded-For` is honored only when the direct peer is a trusted proxy
//! and the first forwarded value is a valid IP literal. Anything else falls
//! back to the socket peer, so clients cannot pick their own rate-limit key.

use crate::AppState;
use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{request::Parts, Extensions, HeaderMap},
};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Used when the connection peer is not known (no `ConnectInfo`).
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Resolve the client address for a request.
pub fn client_ip(peer: Option<IpAddr>, headers: &HeaderMap, trusted_proxies: &[IpAddr]) -> String {
    let Some(peer) = peer else {
        return UNKNOWN_CLIENT.to_string();
    };

    if trusted_proxies.contains(&peer) {
        let forwarded = headers
            .get(FORWARDED_FOR_HEADER)
            .and_then(|h| h.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .and_then(|v| v.parse::<IpAddr>().ok());

        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }

    peer.to_string()
}

/// Client address extractor for handlers.
#[derive(Debug, Clone)]
pub struct ClientIp(pub String);

impl FromRequestParts<Arc<AppState>> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(ClientIp(client_ip(
            peer_addr(&parts.extensions),
            &parts.headers,
            &state.config.trusted_proxies,
        )))
    }
}

/// Direct socket peer, if the server was started with connect info.
pub fn peer_addr(extensions: &Extensions) -> Option<IpAddr> {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}
