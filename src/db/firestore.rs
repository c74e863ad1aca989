// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Users (account records, keyed by UUID)
//! - Refresh tokens (keyed by owning user UUID, at most one per user)

use crate::db::{collections, RefreshTokenStore, UserStore};
use crate::error::AppError;
use crate::models::{RefreshToken, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use firestore::FirestoreWritePrecondition;
use uuid::Uuid;

// Firestore limits batch/transaction writes to 500 operations.
// We use a safe limit of 400 to allow headroom.
const BATCH_SIZE: usize = 400;

/// Attempts per sweep batch before giving up on write contention.
const SWEEP_ATTEMPTS: u32 = 3;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    /// Current refresh token document for `user_id` and its last update time.
    async fn refresh_token_doc(
        &self,
        user_id: Uuid,
    ) -> Result<Option<(RefreshToken, DateTime<Utc>)>, AppError> {
        let doc = self
            .get_client()?
            .fluent()
            .select()
            .by_id_in(collections::REFRESH_TOKENS)
            .one(&user_id.to_string())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let Some(doc) = doc else {
            return Ok(None);
        };
        let record: RefreshToken = firestore::FirestoreDb::deserialize_doc_to(&doc)
            .map_err(|e| AppError::Database(e.to_string()))?;
        let updated_at = doc
            .update_time
            .as_ref()
            .and_then(|ts| DateTime::from_timestamp(ts.seconds, ts.nanos.max(0) as u32))
            .ok_or_else(|| {
                AppError::Database("Refresh token document has no update time".to_string())
            })?;
        Ok(Some((record, updated_at)))
    }

    /// Delete the refresh token document of `user_id` unless it was written
    /// after `updated_at`.
    async fn delete_refresh_doc_unchanged(
        &self,
        user_id: Uuid,
        updated_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.get_client()?
            .fluent()
            .delete()
            .from(collections::REFRESH_TOKENS)
            .document_id(user_id.to_string())
            .precondition(FirestoreWritePrecondition::UpdateTime(updated_at))
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Delete expired refresh tokens found by an earlier query.
    ///
    /// Each owner's document is re-read first and only deleted while it still
    /// holds the candidate token, so a login or refresh that landed after the
    /// query keeps its new token. Returns the number of documents deleted.
    pub async fn delete_refresh_tokens_if_current(
        &self,
        candidates: &[RefreshToken],
        now: DateTime<Utc>,
    ) -> Result<usize, AppError> {
        let mut deleted = 0;

        for batch in candidates.chunks(BATCH_SIZE) {
            let mut attempt = 1;
            loop {
                match self.delete_expired_batch(batch, now).await {
                    Ok(count) => {
                        deleted += count;
                        break;
                    }
                    Err(e) if attempt < SWEEP_ATTEMPTS => {
                        tracing::debug!(attempt, error = %e, "Retrying refresh token sweep batch");
                        attempt += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        Ok(deleted)
    }

    /// One transactional batch of the sweep. Every delete carries the
    /// document's update time as a precondition; a write racing the commit
    /// fails the batch and the caller re-reads.
    async fn delete_expired_batch(
        &self,
        batch: &[RefreshToken],
        now: DateTime<Utc>,
    ) -> Result<usize, AppError> {
        let client = self.get_client()?;
        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        let mut deleted = 0;
        for candidate in batch {
            let Some((current, updated_at)) = self.refresh_token_doc(candidate.user_id).await?
            else {
                continue;
            };
            if current.token != candidate.token || !current.is_expired_at(now) {
                continue;
            }

            client
                .fluent()
                .delete()
                .from(collections::REFRESH_TOKENS)
                .document_id(candidate.user_id.to_string())
                .precondition(FirestoreWritePrecondition::UpdateTime(updated_at))
                .add_to_transaction(&mut transaction)
                .map_err(|e| {
                    AppError::Database(format!("Failed to add deletion to transaction: {}", e))
                })?;
            deleted += 1;
        }

        if deleted == 0 {
            let _ = transaction.rollback().await;
            return Ok(0);
        }

        transaction.commit().await.map_err(|e| {
            AppError::Database(format!("Failed to commit batch deletion: {}", e))
        })?;
        Ok(deleted)
    }
}

// ─── User Operations ─────────────────────────────────────────

#[async_trait]
impl UserStore for FirestoreDb {
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(&id.to_string())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let email = email.to_string();
        let users: Vec<User> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::USERS)
            .filter(move |q| q.for_all([q.field("email").eq(email.clone())]))
            .limit(1)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(users.into_iter().next())
    }

    /// Insert a user after checking the email index.
    ///
    /// Firestore has no unique constraints, so two registrations racing on
    /// the same address can both pass the check; the orchestrator's
    /// pre-check narrows this window further.
    async fn insert_user(&self, user: &User) -> Result<(), AppError> {
        if self.find_user_by_email(&user.email).await?.is_some() {
            return Err(AppError::Conflict(
                "Email address is already registered".to_string(),
            ));
        }

        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::USERS)
            .document_id(user.id.to_string())
            .object(user)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, AppError> {
        if self.find_user_by_id(id).await?.is_none() {
            return Ok(false);
        }

        self.get_client()?
            .fluent()
            .delete()
            .from(collections::USERS)
            .document_id(id.to_string())
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(true)
    }
}

// ─── Refresh Token Operations ────────────────────────────────
//
// Refresh token documents are keyed by the owning user's UUID, so a user can
// hold at most one token and replacing it is a single document write.

#[async_trait]
impl RefreshTokenStore for FirestoreDb {
    async fn replace_refresh_token_for_user(&self, token: &RefreshToken) -> Result<(), AppError> {
        self.save_refresh_token(token).await?;
        tracing::debug!(user_id = %token.user_id, "Refresh token replaced");
        Ok(())
    }

    async fn find_refresh_token(&self, token: &str) -> Result<Option<RefreshToken>, AppError> {
        let token = token.to_string();
        let tokens: Vec<RefreshToken> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::REFRESH_TOKENS)
            .filter(move |q| q.for_all([q.field("token").eq(token.clone())]))
            .limit(1)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(tokens.into_iter().next())
    }

    async fn save_refresh_token(&self, token: &RefreshToken) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::REFRESH_TOKENS)
            .document_id(token.user_id.to_string())
            .object(token)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn delete_refresh_token(&self, token: &str) -> Result<(), AppError> {
        let Some(record) = self.find_refresh_token(token).await? else {
            return Ok(());
        };
        let Some((current, updated_at)) = self.refresh_token_doc(record.user_id).await? else {
            return Ok(());
        };
        if current.token != token {
            return Ok(());
        }

        if let Err(e) = self
            .delete_refresh_doc_unchanged(record.user_id, updated_at)
            .await
        {
            // Fine if a concurrent rotation already replaced the token
            let still_current = self
                .refresh_token_doc(record.user_id)
                .await?
                .is_some_and(|(current, _)| current.token == token);
            if still_current {
                return Err(e);
            }
        }
        Ok(())
    }

    async fn delete_refresh_tokens_for_user(&self, user_id: Uuid) -> Result<usize, AppError> {
        let existing = self.count_refresh_tokens_for_user(user_id).await?;
        if existing == 0 {
            return Ok(0);
        }

        self.get_client()?
            .fluent()
            .delete()
            .from(collections::REFRESH_TOKENS)
            .document_id(user_id.to_string())
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(existing)
    }

    async fn delete_expired_refresh_tokens(&self, now: DateTime<Utc>) -> Result<usize, AppError> {
        let cutoff = now.timestamp_millis();
        let expired: Vec<RefreshToken> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::REFRESH_TOKENS)
            .filter(move |q| q.for_all([q.field("expires_at").less_than(cutoff)]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        self.delete_refresh_tokens_if_current(&expired, now).await
    }

    async fn count_refresh_tokens_for_user(&self, user_id: Uuid) -> Result<usize, AppError> {
        let existing: Option<RefreshToken> = self
            .get_client()?
            .fluent()
            .select()
            .by_id_in(collections::REFRESH_TOKENS)
            .obj()
            .one(&user_id.to_string())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(usize::from(existing.is_some()))
    }
}
