// Copyright (c) 2025 - Cowboy AI, Inc.
//! Backend HTTP service
//!
//! Reads its secrets from the container environment (`PAYLOAD_SECRET`,
//! `DB_USERNAME`, `DB_PASSWORD`, `DB_HOST`) and listens on `PORT`.
//!
//! Run with: cargo run --bin backend-server --features mongodb

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use backend_stack::config::ServerConfig;
use backend_stack::server::mongo::MongoDocumentStore;
use backend_stack::server::{serve, AppState, EnvSecretSource};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = ServerConfig::from_env().context("Invalid server configuration")?;
    info!(
        "NODE_ENV: {}",
        config.node_env.as_deref().unwrap_or("undefined")
    );

    let state = AppState::new(Arc::new(EnvSecretSource), Arc::new(MongoDocumentStore))
        .with_collection(config.collection.clone());

    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;

    serve(listener, state).await.context("Server failed")?;
    Ok(())
}
