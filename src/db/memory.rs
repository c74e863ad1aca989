//! In-memory storage backend.
//!
//! Used by the test suite and for local development without a Firestore
//! emulator. Each map sits behind its own `RwLock`; the refresh token replace
//! runs entirely under one write guard so it is atomic per user.

use crate::db::{RefreshTokenStore, UserStore};
use crate::error::AppError;
use crate::models::{RefreshToken, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory user and refresh token storage.
#[derive(Clone, Default)]
pub struct MemoryDb {
    users: Arc<RwLock<HashMap<Uuid, User>>>,
    /// Keyed by token string
    refresh_tokens: Arc<RwLock<HashMap<String, RefreshToken>>>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryDb {
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn insert_user(&self, user: &User) -> Result<(), AppError> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == user.email) {
            return Err(AppError::Conflict(
                "Email address is already registered".to_string(),
            ));
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, AppError> {
        Ok(self.users.write().await.remove(&id).is_some())
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryDb {
    async fn replace_refresh_token_for_user(&self, token: &RefreshToken) -> Result<(), AppError> {
        let mut tokens = self.refresh_tokens.write().await;
        tokens.retain(|_, t| t.user_id != token.user_id);
        tokens.insert(token.token.clone(), token.clone());
        Ok(())
    }

    async fn find_refresh_token(&self, token: &str) -> Result<Option<RefreshToken>, AppError> {
        Ok(self.refresh_tokens.read().await.get(token).cloned())
    }

    async fn save_refresh_token(&self, token: &RefreshToken) -> Result<(), AppError> {
        self.refresh_tokens
            .write()
            .await
            .insert(token.token.clone(), token.clone());
        Ok(())
    }

    async fn delete_refresh_token(&self, token: &str) -> Result<(), AppError> {
        self.refresh_tokens.write().await.remove(token);
        Ok(())
    }

    async fn delete_refresh_tokens_for_user(&self, user_id: Uuid) -> Result<usize, AppError> {
        let mut tokens = self.refresh_tokens.write().await;
        let before = tokens.len();
        tokens.retain(|_, t| t.user_id != user_id);
        Ok(before - tokens.len())
    }

    async fn delete_expired_refresh_tokens(&self, now: DateTime<Utc>) -> Result<usize, AppError> {
        let mut tokens = self.refresh_tokens.write().await;
        let before = tokens.len();
        tokens.retain(|_, t| t.expires_at >= now);
        Ok(before - tokens.len())
    }

    async fn count_refresh_tokens_for_user(&self, user_id: Uuid) -> Result<usize, AppError> {
        Ok(self
            .refresh_tokens
            .read()
            .await
            .values()
            .filter(|t| t.user_id == user_id)
            .count())
    }
}
