// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Loaded once at startup and moved into `AppState`; nothing mutates it
//! afterward. The signing key and rate-limit table live here so that the
//! token codec and the limiter are constructed from one explicit source.

use crate::services::rate_limit::{RateLimitClass, RateLimitTable};
use axum_extra::extract::cookie::SameSite;
use std::env;
use std::net::IpAddr;
use std::time::Duration;

/// Default access token lifetime (15 minutes).
pub const DEFAULT_ACCESS_TOKEN_TTL_SECS: i64 = 15 * 60;
/// Default refresh token lifetime (7 days).
pub const DEFAULT_REFRESH_TOKEN_TTL_SECS: i64 = 7 * 24 * 60 * 60;
/// Default bcrypt work factor.
pub const DEFAULT_BCRYPT_COST: u32 = 12;

/// Minimum accepted HS256 signing key length in bytes.
const MIN_SIGNING_KEY_LEN: usize = 32;

/// How access and refresh tokens travel between client and server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenTransport {
    /// HttpOnly cookies; token fields are stripped from response bodies and
    /// the refresh token is only ever read from its cookie.
    Cookie,
    /// Tokens are returned in the JSON body and the refresh token is read
    /// from the request body (cookie accepted as a fallback).
    Body,
}

impl TokenTransport {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cookie" => Ok(Self::Cookie),
            "body" => Ok(Self::Body),
            _ => Err(ConfigError::Invalid("TOKEN_TRANSPORT", value.to_string())),
        }
    }
}

/// Persistence backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Firestore,
    Memory,
}

impl StorageBackend {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "firestore" => Ok(Self::Firestore),
            "memory" => Ok(Self::Memory),
            _ => Err(ConfigError::Invalid("STORAGE_BACKEND", value.to_string())),
        }
    }
}

/// Cookie attributes shared by the access and refresh token cookies.
#[derive(Debug, Clone)]
pub struct CookieSettings {
    pub secure: bool,
    pub same_site: SameSite,
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,
    /// GCP project ID (Firestore)
    pub gcp_project_id: String,
    /// Which persistence backend to use
    pub storage_backend: StorageBackend,

    /// JWT signing key for access tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// Access token lifetime in seconds
    pub access_token_ttl_secs: i64,
    /// Refresh token lifetime in seconds
    pub refresh_token_ttl_secs: i64,
    /// bcrypt work factor for password hashing
    pub bcrypt_cost: u32,

    pub token_transport: TokenTransport,
    pub cookies: CookieSettings,

    /// Whether the global rate-limit stage runs at all
    pub rate_limit_enabled: bool,
    /// Per-class (capacity, interval) pairs
    pub rate_limits: RateLimitTable,
    /// Direct peers allowed to supply `X-Forwarded-For`
    pub trusted_proxies: Vec<IpAddr>,

    /// Optional admin account seeded at startup
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let jwt_signing_key = env::var("JWT_SIGNING_KEY")
            .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
            .into_bytes();
        if jwt_signing_key.len() < MIN_SIGNING_KEY_LEN {
            return Err(ConfigError::Invalid(
                "JWT_SIGNING_KEY",
                format!("must be at least {MIN_SIGNING_KEY_LEN} bytes"),
            ));
        }

        let mut rate_limits = RateLimitTable::default();
        for class in RateLimitClass::ALL {
            let var = class.env_var();
            if let Ok(value) = env::var(var) {
                let (capacity, interval) = parse_limit(&value)
                    .ok_or_else(|| ConfigError::Invalid(var, value.clone()))?;
                rate_limits.set(class, capacity, interval);
            }
        }

        let same_site = match env::var("COOKIE_SAME_SITE") {
            Ok(value) => parse_same_site(&value)
                .ok_or_else(|| ConfigError::Invalid("COOKIE_SAME_SITE", value.clone()))?,
            Err(_) => SameSite::Lax,
        };

        let trusted_proxies = match env::var("TRUSTED_PROXIES") {
            Ok(value) => value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<IpAddr>()
                        .map_err(|_| ConfigError::Invalid("TRUSTED_PROXIES", s.to_string()))
                })
                .collect::<Result<Vec<_>, _>>()?,
            Err(_) => default_trusted_proxies(),
        };

        let bcrypt_cost = parse_or("BCRYPT_COST", DEFAULT_BCRYPT_COST)?;
        if !(4..=31).contains(&bcrypt_cost) {
            return Err(ConfigError::Invalid(
                "BCRYPT_COST",
                bcrypt_cost.to_string(),
            ));
        }

        Ok(Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            storage_backend: match env::var("STORAGE_BACKEND") {
                Ok(value) => StorageBackend::parse(&value)?,
                Err(_) => StorageBackend::Firestore,
            },

            jwt_signing_key,
            access_token_ttl_secs: parse_or("ACCESS_TOKEN_TTL_SECS", DEFAULT_ACCESS_TOKEN_TTL_SECS)?,
            refresh_token_ttl_secs: parse_or(
                "REFRESH_TOKEN_TTL_SECS",
                DEFAULT_REFRESH_TOKEN_TTL_SECS,
            )?,
            bcrypt_cost,

            token_transport: match env::var("TOKEN_TRANSPORT") {
                Ok(value) => TokenTransport::parse(&value)?,
                Err(_) => TokenTransport::Cookie,
            },
            cookies: CookieSettings {
                secure: parse_or("COOKIE_SECURE", false)?,
                same_site,
            },

            rate_limit_enabled: parse_or("RATE_LIMIT_ENABLED", true)?,
            rate_limits,
            trusted_proxies,

            admin_email: env::var("ADMIN_EMAIL")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            admin_password: env::var("ADMIN_PASSWORD").ok().filter(|v| !v.is_empty()),
        })
    }

    /// Deterministic config for tests: in-memory storage, cookie transport,
    /// and the cheapest bcrypt cost.
    pub fn test_default() -> Self {
        Self {
            port: 8080,
            gcp_project_id: "test-project".to_string(),
            storage_backend: StorageBackend::Memory,
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!!".to_vec(),
            access_token_ttl_secs: DEFAULT_ACCESS_TOKEN_TTL_SECS,
            refresh_token_ttl_secs: DEFAULT_REFRESH_TOKEN_TTL_SECS,
            bcrypt_cost: 4,
            token_transport: TokenTransport::Cookie,
            cookies: CookieSettings {
                secure: false,
                same_site: SameSite::Lax,
            },
            rate_limit_enabled: true,
            rate_limits: RateLimitTable::default(),
            trusted_proxies: default_trusted_proxies(),
            admin_email: None,
            admin_password: None,
        }
    }
}

fn default_trusted_proxies() -> Vec<IpAddr> {
    vec![
        IpAddr::from([127, 0, 0, 1]),
        IpAddr::from([0u16, 0, 0, 0, 0, 0, 0, 1]),
    ]
}

fn parse_or<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(var, value)),
        Err(_) => Ok(default),
    }
}

/// Parse `capacity/interval_secs`, e.g. `5/60`.
fn parse_limit(value: &str) -> Option<(u64, Duration)> {
    let (capacity, secs) = value.trim().split_once('/')?;
    let capacity: u64 = capacity.trim().parse().ok()?;
    let secs: u64 = secs.trim().parse().ok()?;
    if capacity == 0 || secs == 0 {
        return None;
    }
    Some((capacity, Duration::from_secs(secs)))
}

fn parse_same_site(value: &str) -> Option<SameSite> {
    match value.trim().to_ascii_lowercase().as_str() {
        "strict" => Some(SameSite::Strict),
        "lax" => Some(SameSite::Lax),
        "none" => Some(SameSite::None),
        _ => None,
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        env::set_var("JWT_SIGNING_KEY", "test_jwt_key_32_bytes_minimum!!!");
        env::set_var("TOKEN_TRANSPORT", "body");
        env::set_var("RATE_LIMIT_AUTH", "3/30");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.port, 8080);
        assert_eq!(config.token_transport, TokenTransport::Body);
        assert_eq!(config.access_token_ttl_secs, DEFAULT_ACCESS_TOKEN_TTL_SECS);
        let auth = config.rate_limits.get(RateLimitClass::Auth);
        assert_eq!(auth.capacity, 3);
        assert_eq!(auth.interval, Duration::from_secs(30));

        env::remove_var("TOKEN_TRANSPORT");
        env::remove_var("RATE_LIMIT_AUTH");
    }

    #[test]
    fn test_parse_limit() {
        assert_eq!(parse_limit("5/60"), Some((5, Duration::from_secs(60))));
        assert_eq!(parse_limit(" 10 / 300 "), Some((10, Duration::from_secs(300))));
        assert_eq!(parse_limit("0/60"), None);
        assert_eq!(parse_limit("5"), None);
        assert_eq!(parse_limit("five/60"), None);
    }

    #[test]
    fn test_parse_same_site() {
        assert_eq!(parse_same_site("Strict"), Some(SameSite::Strict));
        assert_eq!(parse_same_site("lax"), Some(SameSite::Lax));
        assert_eq!(parse_same_site("bogus"), None);
    }
}
