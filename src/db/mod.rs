//! Database layer.
//!
//! The authentication core only sees the two store traits below. Production
//! runs on Firestore; tests and local development use the in-memory backend.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryDb;

use crate::error::AppError;
use crate::models::{RefreshToken, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    pub const REFRESH_TOKENS: &str = "refresh_tokens";
}

/// User-record store consumed by the authentication core.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;

    /// Look up by email. Callers pass an already-normalized address.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    /// Insert a new user. Fails with `AppError::Conflict` if the email is taken.
    async fn insert_user(&self, user: &User) -> Result<(), AppError>;

    /// Returns `true` if a user was deleted.
    async fn delete_user(&self, id: Uuid) -> Result<bool, AppError>;
}

/// Persistence for refresh tokens.
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Atomically delete every token owned by `token.user_id` and insert
    /// `token`. Two concurrent calls for the same user must leave exactly one
    /// token behind.
    async fn replace_refresh_token_for_user(&self, token: &RefreshToken) -> Result<(), AppError>;

    /// Exact match on the token string.
    async fn find_refresh_token(&self, token: &str) -> Result<Option<RefreshToken>, AppError>;

    /// Overwrite an existing record (used to flip the revoked flag).
    async fn save_refresh_token(&self, token: &RefreshToken) -> Result<(), AppError>;

    async fn delete_refresh_token(&self, token: &str) -> Result<(), AppError>;

    /// Returns the number of deleted records.
    async fn delete_refresh_tokens_for_user(&self, user_id: Uuid) -> Result<usize, AppError>;

    /// Delete every token whose expiry is strictly before `now`.
    async fn delete_expired_refresh_tokens(&self, now: DateTime<Utc>) -> Result<usize, AppError>;

    async fn count_refresh_tokens_for_user(&self, user_id: Uuid) -> Result<usize, AppError>;
}
