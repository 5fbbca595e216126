// Copyright (c) 2025 - Cowboy AI, Inc.
//! Backend HTTP service
//!
//! The service the stack deploys. Routes:
//!
//! | Route        | Response                                               |
//! |--------------|--------------------------------------------------------|
//! | `/`          | greeting                                               |
//! | `/health`    | 200 with no-cache headers, independent of the database |
//! | `/secret`    | `PAYLOAD_SECRET: ...`                                  |
//! | `/secrets`   | JSON echo of every injected value (diagnostic)         |
//! | `/dbconnect` | insert and read back one random document               |
//!
//! Handlers get their secrets from a [`SecretSource`] and their database
//! from a [`DocumentStore`], both held in [`AppState`]. Nothing mutable is
//! shared between requests.

pub mod db;
pub mod handlers;
#[cfg(feature = "mongodb")]
pub mod mongo;

pub use db::{
    round_trip, DatabaseSettings, DbError, DocumentConnection, DocumentStore,
    MemoryDocumentStore, RandomValue,
};

use axum::routing::get;
use axum::Router;
use secrecy::SecretString;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Values injected into the container
pub trait SecretSource: Send + Sync {
    fn get(&self, key: &str) -> Option<SecretString>;
}

/// Reads the process environment
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvSecretSource;

impl SecretSource for EnvSecretSource {
    fn get(&self, key: &str) -> Option<SecretString> {
        std::env::var(key).ok().map(SecretString::from)
    }
}

/// Fixed values
pub struct StaticSecretSource {
    values: BTreeMap<String, SecretString>,
}

impl StaticSecretSource {
    pub fn new<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: values
                .into_iter()
                .map(|(k, v)| (k.into(), SecretString::from(v.into())))
                .collect(),
        }
    }
}

impl SecretSource for StaticSecretSource {
    fn get(&self, key: &str) -> Option<SecretString> {
        use secrecy::ExposeSecret;
        self.values
            .get(key)
            .map(|v| SecretString::from(v.expose_secret().to_string()))
    }
}

/// Shared, read-only handler state
#[derive(Clone)]
pub struct AppState {
    pub secrets: Arc<dyn SecretSource>,
    pub store: Arc<dyn DocumentStore>,
    pub collection: String,
}

impl AppState {
    pub fn new(secrets: Arc<dyn SecretSource>, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            secrets,
            store,
            collection: "random_values".to_string(),
        }
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root_handler))
        .route("/health", get(handlers::health_handler))
        .route("/secret", get(handlers::secret_handler))
        .route("/secrets", get(handlers::secrets_handler))
        .route("/dbconnect", get(handlers::dbconnect_handler))
        .with_state(state)
}

/// Serve until the listener fails
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, build_router(state)).await
}
