// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Authentication orchestrator.
//!
//! Ties together the user store, password hashing, the access token codec
//! and refresh token rotation. Handlers call into this service and only deal
//! with transport (cookies vs. body) themselves.

use crate::db::UserStore;
use crate::error::{AppError, Result};
use crate::models::{Role, User, UserPublic};
use crate::services::refresh_token::{RefreshTokenError, RefreshTokenService};
use crate::services::token::TokenCodec;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// Registration payload.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct RegisterRequest {
    #[validate(length(min = 2, max = 100, message = "Name must be between 2 and 100 characters"))]
    pub name: String,

    #[validate(email(message = "Email should be valid"))]
    pub email: String,

    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,

    #[validate(length(min = 1, message = "Confirm password is required"))]
    pub confirm_password: String,
}

/// Login payload.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Email is required"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Audit metadata about the requesting client.
#[derive(Debug, Clone, Default)]
pub struct ClientMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// A freshly minted token pair and the user it belongs to.
#[derive(Debug, Clone)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserPublic,
}

/// Authentication orchestrator.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    refresh_tokens: RefreshTokenService,
    codec: TokenCodec,
    bcrypt_cost: u32,
    /// Verified against when the email is unknown, so both login failure
    /// paths do the same bcrypt work.
    dummy_hash: String,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        refresh_tokens: RefreshTokenService,
        codec: TokenCodec,
        bcrypt_cost: u32,
    ) -> anyhow::Result<Self> {
        let dummy_hash = bcrypt::hash(Uuid::new_v4().to_string(), bcrypt_cost)?;
        Ok(Self {
            users,
            refresh_tokens,
            codec,
            bcrypt_cost,
            dummy_hash,
        })
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn refresh_tokens(&self) -> &RefreshTokenService {
        &self.refresh_tokens
    }

    /// Create a USER account and log it in.
    pub async fn register(
        &self,
        mut request: RegisterRequest,
        client: &ClientMeta,
    ) -> Result<AuthTokens> {
        request.email = User::normalize_email(&request.email);
        request.name = request.name.trim().to_string();
        request.validate()?;

        if request.password != request.confirm_password {
            return Err(AppError::BadRequest("Passwords do not match".to_string()));
        }

        if self.users.find_user_by_email(&request.email).await?.is_some() {
            return Err(AppError::Conflict(
                "Email address is already registered".to_string(),
            ));
        }

        let user = User {
            id: Uuid::new_v4(),
            name: request.name,
            email: request.email,
            password_hash: self.hash_password(request.password).await?,
            role: Role::User,
            created_at: Utc::now(),
        };
        self.users.insert_user(&user).await?;

        tracing::info!(user_id = %user.id, "User registered");
        self.issue_tokens(&user, client).await
    }

    /// Verify credentials and issue a new token pair.
    ///
    /// Unknown email and wrong password both yield `InvalidCredentials`.
    pub async fn login(&self, request: LoginRequest, client: &ClientMeta) -> Result<AuthTokens> {
        request.validate()?;

        let email = User::normalize_email(&request.email);
        let user = self.users.find_user_by_email(&email).await?;

        let hash = user
            .as_ref()
            .map(|u| u.password_hash.clone())
            .unwrap_or_else(|| self.dummy_hash.clone());
        let password_ok = verify_password(request.password, hash).await?;

        let user = match user {
            Some(user) if password_ok => user,
            _ => {
                tracing::warn!(client_ip = ?client.ip_address, "Failed login attempt");
                return Err(AppError::InvalidCredentials);
            }
        };

        tracing::info!(user_id = %user.id, "User logged in");
        self.issue_tokens(&user, client).await
    }

    /// Exchange a live refresh token for a new token pair.
    ///
    /// The presented refresh token is rotated: a new one is issued and the
    /// old one deleted.
    pub async fn refresh(&self, refresh_token: &str, client: &ClientMeta) -> Result<AuthTokens> {
        let record = self
            .refresh_tokens
            .lookup(refresh_token)
            .await?
            .ok_or(RefreshTokenError::NotFound)?;
        let record = self.refresh_tokens.verify_live(record).await?;

        let user = self
            .users
            .find_user_by_id(record.user_id)
            .await?
            .ok_or(RefreshTokenError::NotFound)?;

        tracing::info!(user_id = %user.id, "Refreshing tokens");
        self.issue_tokens(&user, client).await
    }

    /// Revoke the supplied refresh token, or every session of the user when
    /// none is supplied.
    pub async fn logout(&self, current_user: Option<Uuid>, refresh_token: Option<&str>) -> Result<()> {
        let user_id =
            current_user.ok_or_else(|| AppError::BadRequest("You are not logged in".to_string()))?;

        match refresh_token.map(str::trim).filter(|t| !t.is_empty()) {
            Some(token) => self.refresh_tokens.revoke_for_user(token, user_id).await?,
            None => {
                self.refresh_tokens.revoke_all(user_id).await?;
            }
        }

        tracing::info!(user_id = %user_id, "User logged out");
        Ok(())
    }

    /// Public profile of the authenticated user.
    pub async fn me(&self, user_id: Uuid) -> Result<UserPublic> {
        self.users
            .find_user_by_id(user_id)
            .await?
            .map(|u| UserPublic::from(&u))
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    /// Delete a non-admin account along with all of its sessions.
    pub async fn delete_user(&self, user_id: Uuid) -> Result<()> {
        let user = self
            .users
            .find_user_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        if user.is_admin() {
            return Err(AppError::BadRequest(
                "Admin accounts cannot be deleted".to_string(),
            ));
        }

        self.refresh_tokens.revoke_all(user_id).await?;
        self.users.delete_user(user_id).await?;

        tracing::info!(user_id = %user_id, "User deleted");
        Ok(())
    }

    /// Create the ADMIN account if no user with `email` exists yet.
    ///
    /// Returns `true` if an account was created.
    pub async fn seed_admin(&self, name: &str, email: &str, password: &str) -> Result<bool> {
        let email = User::normalize_email(email);
        if self.users.find_user_by_email(&email).await?.is_some() {
            return Ok(false);
        }

        let admin = User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email,
            password_hash: self.hash_password(password.to_string()).await?,
            role: Role::Admin,
            created_at: Utc::now(),
        };
        self.users.insert_user(&admin).await?;

        tracing::info!(user_id = %admin.id, "Admin account created");
        Ok(true)
    }

    async fn issue_tokens(&self, user: &User, client: &ClientMeta) -> Result<AuthTokens> {
        let access_token = self.codec.issue(user.id, user.role)?;
        let refresh = self
            .refresh_tokens
            .issue(
                user.id,
                client.ip_address.as_deref(),
                client.user_agent.as_deref(),
            )
            .await?;

        Ok(AuthTokens {
            access_token,
            refresh_token: refresh.token,
            user: UserPublic::from(user),
        })
    }

    async fn hash_password(&self, password: String) -> Result<String> {
        let cost = self.bcrypt_cost;
        tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| AppError::Internal(e.into()))?
            .map_err(|e| AppError::Internal(e.into()))
    }
}

async fn verify_password(password: String, hash: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AppError::Internal(e.into()))?
        .map_err(|e| AppError::Internal(e.into()))
}
