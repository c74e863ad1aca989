// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Lost & Found Auth API Server
//!
//! Registration, login, refresh token rotation and rate-limited request
//! admission for the lost-and-found marketplace backend.

use lostfound_auth::{
    config::{Config, StorageBackend},
    db::{FirestoreDb, MemoryDb},
    AppState,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(
        port = config.port,
        transport = ?config.token_transport,
        rate_limit_enabled = config.rate_limit_enabled,
        "Starting Lost & Found auth API"
    );

    let state = match config.storage_backend {
        StorageBackend::Firestore => {
            let db = FirestoreDb::new(&config.gcp_project_id)
                .await
                .expect("Failed to connect to Firestore");
            AppState::new(config.clone(), Arc::new(db))?
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            AppState::new(config.clone(), Arc::new(MemoryDb::new()))?
        }
    };

    if let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) {
        if state.auth.seed_admin("Administrator", email, password).await? {
            tracing::info!("Seeded admin account");
        }
    }

    let app = lostfound_auth::routes::create_router(Arc::new(state));

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    // Peer addresses feed client IP resolution for rate limiting
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lostfound_auth=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
