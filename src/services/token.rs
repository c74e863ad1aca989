// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Access token codec (HS256 JWT).
//!
//! Stateless: a token is valid iff its signature checks out against the
//! process-wide key and the current time is before its expiry. Nothing is
//! persisted and individual access tokens are never revoked.

use crate::models::Role;
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT claims structure.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user UUID)
    pub sub: String,
    /// Role at issuance
    pub role: Role,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

/// Principal recovered from a valid access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSubject {
    pub user_id: Uuid,
    pub role: Role,
}

/// Issues and validates signed access tokens.
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl_secs: i64,
}

impl TokenCodec {
    pub fn new(signing_key: &[u8], ttl_secs: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(signing_key),
            decoding_key: DecodingKey::from_secret(signing_key),
            ttl_secs,
        }
    }

    /// Access token lifetime in seconds.
    pub fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }

    /// Create a signed access token for `user_id` expiring `ttl` from now.
    pub fn issue(&self, user_id: Uuid, role: Role) -> anyhow::Result<String> {
        self.issue_at(user_id, role, Utc::now())
    }

    /// Create a token as if issued at `now`.
    pub fn issue_at(&self, user_id: Uuid, role: Role, now: DateTime<Utc>) -> anyhow::Result<String> {
        let iat = now.timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            role,
            iat,
            exp: iat + self.ttl_secs,
        };

        Ok(encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.encoding_key,
        )?)
    }

    /// Validate a token against the current time. Fails closed.
    pub fn validate(&self, token: &str) -> Option<TokenSubject> {
        self.validate_at(token, Utc::now())
    }

    /// Validate a token against `now`.
    ///
    /// Returns `None` on a bad signature, malformed structure, unparseable
    /// subject, or when `now >= exp`.
    pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Option<TokenSubject> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked below against the supplied clock with no leeway.
        validation.validate_exp = false;
        validation.leeway = 0;

        let data = match decode::<Claims>(token, &self.decoding_key, &validation) {
            Ok(data) => data,
            Err(e) => {
                tracing::debug!(error = %e, "Access token rejected");
                return None;
            }
        };

        if now.timestamp() >= data.claims.exp {
            tracing::debug!(exp = data.claims.exp, "Access token expired");
            return None;
        }

        let user_id = Uuid::parse_str(&data.claims.sub).ok()?;
        Some(TokenSubject {
            user_id,
            role: data.claims.role,
        })
    }
}
