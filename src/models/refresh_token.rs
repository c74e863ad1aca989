//! Refresh token record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A persisted, revocable refresh token.
///
/// At most one record exists per user at any instant; issuing a new one
/// replaces whatever the user had before.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Opaque random token string
    pub token: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    /// Audit only
    pub ip_address: Option<String>,
    /// Audit only
    pub user_agent: Option<String>,
}

impl RefreshToken {
    /// Expired once `now` reaches the expiry instant.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
