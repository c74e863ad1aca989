// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Refresh token lifecycle: issue, look up, verify, revoke, sweep.
//!
//! One live token per user. Issuing a new token replaces the user's previous
//! ones in a single atomic store operation.

use crate::db::RefreshTokenStore;
use crate::error::AppError;
use crate::models::RefreshToken;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Refresh token failures.
#[derive(Debug, thiserror::Error)]
pub enum RefreshTokenError {
    #[error("refresh token not found")]
    NotFound,

    #[error("refresh token expired")]
    Expired,

    #[error("refresh token revoked")]
    Revoked,

    #[error("refresh token already revoked")]
    AlreadyRevoked,

    #[error("refresh token belongs to another user")]
    NotOwner,

    #[error(transparent)]
    Storage(#[from] AppError),
}

impl From<RefreshTokenError> for AppError {
    fn from(err: RefreshTokenError) -> Self {
        match err {
            RefreshTokenError::NotFound => AppError::BadRequest("Invalid refresh token".to_string()),
            RefreshTokenError::Expired => {
                AppError::BadRequest("Refresh token expired. Please login again.".to_string())
            }
            RefreshTokenError::Revoked => AppError::BadRequest(
                "Refresh token has been revoked. Please login again.".to_string(),
            ),
            RefreshTokenError::AlreadyRevoked => {
                AppError::BadRequest("Token is already revoked".to_string())
            }
            RefreshTokenError::NotOwner => {
                AppError::Unauthorized("This token does not belong to you".to_string())
            }
            RefreshTokenError::Storage(e) => e,
        }
    }
}

/// Refresh token service over a persistent store.
#[derive(Clone)]
pub struct RefreshTokenService {
    store: Arc<dyn RefreshTokenStore>,
    ttl: Duration,
}

impl RefreshTokenService {
    pub fn new(store: Arc<dyn RefreshTokenStore>, ttl_secs: i64) -> Self {
        Self {
            store,
            ttl: Duration::seconds(ttl_secs),
        }
    }

    /// Lifetime of newly issued tokens in seconds.
    pub fn ttl_secs(&self) -> i64 {
        self.ttl.num_seconds()
    }

    /// Issue a fresh token for `user_id`, deleting any the user already had.
    pub async fn issue(
        &self,
        user_id: Uuid,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<RefreshToken, RefreshTokenError> {
        let now = Utc::now();
        let token = RefreshToken {
            id: Uuid::new_v4(),
            user_id,
            token: Uuid::new_v4().to_string(),
            expires_at: now + self.ttl,
            revoked: false,
            created_at: now,
            ip_address: ip_address.map(str::to_string),
            user_agent: user_agent.map(str::to_string),
        };

        self.store.replace_refresh_token_for_user(&token).await?;

        tracing::info!(user_id = %user_id, "Created new refresh token");
        Ok(token)
    }

    /// Exact-match lookup. Blank input finds nothing.
    pub async fn lookup(&self, token: &str) -> Result<Option<RefreshToken>, RefreshTokenError> {
        let token = token.trim();
        if token.is_empty() {
            return Ok(None);
        }
        Ok(self.store.find_refresh_token(token).await?)
    }

    /// Check that `token` is neither expired nor revoked.
    ///
    /// An expired token is deleted as a side effect.
    pub async fn verify_live(&self, token: RefreshToken) -> Result<RefreshToken, RefreshTokenError> {
        self.verify_live_at(token, Utc::now()).await
    }

    pub async fn verify_live_at(
        &self,
        token: RefreshToken,
        now: DateTime<Utc>,
    ) -> Result<RefreshToken, RefreshTokenError> {
        if token.is_expired_at(now) {
            self.store.delete_refresh_token(&token.token).await?;
            tracing::warn!(user_id = %token.user_id, "Refresh token expired");
            return Err(RefreshTokenError::Expired);
        }

        if token.revoked {
            tracing::warn!(user_id = %token.user_id, "Attempted to use revoked refresh token");
            return Err(RefreshTokenError::Revoked);
        }

        Ok(token)
    }

    /// Mark a token revoked.
    pub async fn revoke(&self, token: &str) -> Result<(), RefreshTokenError> {
        let mut record = self.find_existing(token).await?;
        if record.revoked {
            return Err(RefreshTokenError::AlreadyRevoked);
        }
        record.revoked = true;
        self.store.save_refresh_token(&record).await?;
        tracing::info!(user_id = %record.user_id, "Revoked refresh token");
        Ok(())
    }

    /// Revoke a token only if it belongs to `expected_user_id`.
    ///
    /// On an ownership mismatch the token is left untouched.
    pub async fn revoke_for_user(
        &self,
        token: &str,
        expected_user_id: Uuid,
    ) -> Result<(), RefreshTokenError> {
        let mut record = self.find_existing(token).await?;

        if record.user_id != expected_user_id {
            tracing::warn!(
                user_id = %expected_user_id,
                owner_id = %record.user_id,
                "User attempted to revoke a token they do not own"
            );
            return Err(RefreshTokenError::NotOwner);
        }

        if record.revoked {
            return Err(RefreshTokenError::AlreadyRevoked);
        }

        record.revoked = true;
        self.store.save_refresh_token(&record).await?;
        tracing::info!(user_id = %record.user_id, "Revoked refresh token");
        Ok(())
    }

    /// Delete every token the user owns. Returns the number deleted.
    pub async fn revoke_all(&self, user_id: Uuid) -> Result<usize, RefreshTokenError> {
        let count = self.store.delete_refresh_tokens_for_user(user_id).await?;
        tracing::info!(user_id = %user_id, count, "Revoked all refresh tokens for user");
        Ok(count)
    }

    /// Delete every token whose expiry is before `now`. Idempotent.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize, RefreshTokenError> {
        let count = self.store.delete_expired_refresh_tokens(now).await?;
        tracing::info!(count, "Deleted expired refresh tokens");
        Ok(count)
    }

    async fn find_existing(&self, token: &str) -> Result<RefreshToken, RefreshTokenError> {
        self.lookup(token).await?.ok_or(RefreshTokenError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryDb;

    fn service(ttl_secs: i64) -> (RefreshTokenService, Arc<MemoryDb>) {
        let db = Arc::new(MemoryDb::new());
        (RefreshTokenService::new(db.clone(), ttl_secs), db)
    }

    #[tokio::test]
    async fn test_issue_replaces_previous_token() {
        let (svc, db) = service(3600);
        let user = Uuid::new_v4();

        let first = svc.issue(user, Some("10.0.0.1"), Some("ua")).await.unwrap();
        let second = svc.issue(user, None, None).await.unwrap();

        assert_ne!(first.token, second.token);
        assert!(svc.lookup(&first.token).await.unwrap().is_none());
        assert!(svc.lookup(&second.token).await.unwrap().is_some());
        assert_eq!(db.count_refresh_tokens_for_user(user).await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_issue_leaves_one_token() {
        let (svc, db) = service(3600);
        let user = Uuid::new_v4();

        let (a, b) = tokio::join!(
            tokio::spawn({
                let svc = svc.clone();
                async move { svc.issue(user, None, None).await }
            }),
            tokio::spawn({
                let svc = svc.clone();
                async move { svc.issue(user, None, None).await }
            })
        );
        let a = a.unwrap().unwrap();
        let b = b.unwrap().unwrap();

        assert_eq!(db.count_refresh_tokens_for_user(user).await.unwrap(), 1);
        let live_a = svc.lookup(&a.token).await.unwrap().is_some();
        let live_b = svc.lookup(&b.token).await.unwrap().is_some();
        assert!(live_a ^ live_b);
    }

    #[tokio::test]
    async fn test_issue_does_not_touch_other_users() {
        let (svc, db) = service(3600);
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        svc.issue(alice, None, None).await.unwrap();
        svc.issue(bob, None, None).await.unwrap();
        svc.issue(alice, None, None).await.unwrap();

        assert_eq!(db.count_refresh_tokens_for_user(alice).await.unwrap(), 1);
        assert_eq!(db.count_refresh_tokens_for_user(bob).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_expired_token_fails_and_is_deleted() {
        let (svc, _) = service(3600);
        let token = svc.issue(Uuid::new_v4(), None, None).await.unwrap();
        let at_expiry = token.expires_at;

        let err = svc.verify_live_at(token.clone(), at_expiry).await.unwrap_err();
        assert!(matches!(err, RefreshTokenError::Expired));
        assert!(svc.lookup(&token.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_revoked_token_fails_verification() {
        let (svc, _) = service(3600);
        let token = svc.issue(Uuid::new_v4(), None, None).await.unwrap();
        svc.revoke(&token.token).await.unwrap();

        let record = svc.lookup(&token.token).await.unwrap().unwrap();
        let err = svc.verify_live(record).await.unwrap_err();
        assert!(matches!(err, RefreshTokenError::Revoked));
    }

    #[tokio::test]
    async fn test_revoke_twice_fails() {
        let (svc, _) = service(3600);
        let token = svc.issue(Uuid::new_v4(), None, None).await.unwrap();
        svc.revoke(&token.token).await.unwrap();
        let err = svc.revoke(&token.token).await.unwrap_err();
        assert!(matches!(err, RefreshTokenError::AlreadyRevoked));
    }

    #[tokio::test]
    async fn test_revoke_unknown_fails() {
        let (svc, _) = service(3600);
        let err = svc.revoke("does-not-exist").await.unwrap_err();
        assert!(matches!(err, RefreshTokenError::NotFound));
        let err = svc.revoke("   ").await.unwrap_err();
        assert!(matches!(err, RefreshTokenError::NotFound));
    }

    #[tokio::test]
    async fn test_revoke_for_wrong_user_leaves_token_live() {
        let (svc, _) = service(3600);
        let owner = Uuid::new_v4();
        let token = svc.issue(owner, None, None).await.unwrap();

        let err = svc
            .revoke_for_user(&token.token, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, RefreshTokenError::NotOwner));
        assert!(matches!(AppError::from(err), AppError::Unauthorized(_)));

        let record = svc.lookup(&token.token).await.unwrap().unwrap();
        assert!(!record.revoked);
        assert!(svc.verify_live(record).await.is_ok());

        svc.revoke_for_user(&token.token, owner).await.unwrap();
        assert!(svc.lookup(&token.token).await.unwrap().unwrap().revoked);
    }

    #[tokio::test]
    async fn test_sweep_expired_is_idempotent() {
        let (svc, _) = service(60);
        let live = svc.issue(Uuid::new_v4(), None, None).await.unwrap();
        let expiring = svc.issue(Uuid::new_v4(), None, None).await.unwrap();

        // Nothing is before now yet
        assert_eq!(svc.sweep_expired(Utc::now()).await.unwrap(), 0);

        let later = expiring.expires_at + Duration::seconds(1);
        assert_eq!(svc.sweep_expired(later).await.unwrap(), 2);
        assert_eq!(svc.sweep_expired(later).await.unwrap(), 0);
        assert!(svc.lookup(&live.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_revoke_all_deletes_user_tokens() {
        let (svc, db) = service(3600);
        let user = Uuid::new_v4();
        svc.issue(user, None, None).await.unwrap();
        assert_eq!(svc.revoke_all(user).await.unwrap(), 1);
        assert_eq!(db.count_refresh_tokens_for_user(user).await.unwrap(), 0);
        assert_eq!(svc.revoke_all(user).await.unwrap(), 0);
    }
}
