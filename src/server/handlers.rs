// Copyright (c) 2025 - Cowboy AI, Inc.
//! Route handlers

use axum::extract::State;
use axum::http::{header, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use secrecy::ExposeSecret;
use serde::Serialize;
use tracing::{debug, error, warn};

use super::db::{round_trip, DatabaseSettings};
use super::AppState;

const NO_CACHE: [(HeaderName, &str); 4] = [
    (
        header::CACHE_CONTROL,
        "no-store, no-cache, must-revalidate, proxy-revalidate",
    ),
    (header::PRAGMA, "no-cache"),
    (header::EXPIRES, "0"),
    (HeaderName::from_static("surrogate-control"), "no-store"),
];

pub async fn root_handler() -> &'static str {
    "Hello World!123123"
}

/// Liveness; never touches the database
pub async fn health_handler() -> Response {
    (StatusCode::OK, NO_CACHE, "OK").into_response()
}

pub async fn secret_handler(State(state): State<AppState>) -> String {
    match state.secrets.get("PAYLOAD_SECRET") {
        Some(secret) => format!("PAYLOAD_SECRET: {}", secret.expose_secret()),
        None => "PAYLOAD_SECRET: No secret found".to_string(),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SecretsEcho {
    pub payload_secret: Option<String>,
    pub db_username: Option<String>,
    pub db_password: Option<String>,
    pub db_host: Option<String>,
}

/// Diagnostic echo of the injected values
pub async fn secrets_handler(State(state): State<AppState>) -> Json<SecretsEcho> {
    warn!("Echoing injected secrets on /secrets");
    let read = |key: &str| state.secrets.get(key).map(|v| v.expose_secret().to_string());
    Json(SecretsEcho {
        payload_secret: read("PAYLOAD_SECRET"),
        db_username: read("DB_USERNAME"),
        db_password: read("DB_PASSWORD"),
        db_host: read("DB_HOST"),
    })
}

/// One database round trip per request
pub async fn dbconnect_handler(State(state): State<AppState>) -> Response {
    let settings = match DatabaseSettings::from_source(state.secrets.as_ref()) {
        Ok(settings) => settings,
        Err(err) => return database_error(err),
    };
    debug!("Connecting to {}:{}", settings.host, settings.port);

    match round_trip(state.store.as_ref(), &settings, &state.collection).await {
        Ok(value) => (StatusCode::OK, NO_CACHE, Json(value)).into_response(),
        Err(err) => database_error(err),
    }
}

fn database_error(err: impl std::fmt::Display) -> Response {
    error!("Database round trip failed: {}", err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Error connecting to database",
    )
        .into_response()
}
