// Copyright (c) 2025 - Cowboy AI, Inc.
//! HTTP service tests
//!
//! Each test binds an ephemeral port, serves the router and talks raw
//! HTTP/1.1 to it.

use std::collections::HashMap;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use backend_stack::server::{build_router, AppState, MemoryDocumentStore, StaticSecretSource};

struct Response {
    status: u16,
    headers: HashMap<String, String>,
    body: String,
}

async fn send_raw(addr: std::net::SocketAddr, path: &str) -> Response {
    let mut stream = tokio::net::TcpStream::connect(addr)
        .await
        .expect("connect server");
    let req = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream
        .write_all(req.as_bytes())
        .await
        .expect("write request");
    let mut response = String::new();
    stream
        .read_to_string(&mut response)
        .await
        .expect("read response");
    let (head, body) = response
        .split_once("\r\n\r\n")
        .expect("http response separator");

    let mut lines = head.lines();
    let status = lines
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|s| s.parse::<u16>().ok())
        .expect("status");
    let headers = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
        .collect();

    Response {
        status,
        headers,
        body: body.to_string(),
    }
}

fn database_secrets() -> Vec<(&'static str, &'static str)> {
    vec![
        ("PAYLOAD_SECRET", "payload-value"),
        ("DB_USERNAME", "admin"),
        ("DB_PASSWORD", "p@ss:word/with#specials"),
        ("DB_HOST", "docdb.cluster.local"),
    ]
}

async fn spawn(
    secrets: Vec<(&'static str, &'static str)>,
    store: Arc<MemoryDocumentStore>,
) -> std::net::SocketAddr {
    let state = AppState::new(Arc::new(StaticSecretSource::new(secrets)), store);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, build_router(state))
            .await
            .expect("serve");
    });
    addr
}

fn assert_no_cache(response: &Response) {
    assert_eq!(
        response.headers["cache-control"],
        "no-store, no-cache, must-revalidate, proxy-revalidate"
    );
    assert_eq!(response.headers["pragma"], "no-cache");
    assert_eq!(response.headers["expires"], "0");
    assert_eq!(response.headers["surrogate-control"], "no-store");
}

#[tokio::test]
async fn test_root_greets() {
    let addr = spawn(vec![], Arc::new(MemoryDocumentStore::new())).await;
    let response = send_raw(addr, "/").await;

    assert_eq!(response.status, 200);
    assert_eq!(response.body, "Hello World!123123");
}

#[tokio::test]
async fn test_health_ignores_database() {
    let store = Arc::new(MemoryDocumentStore::unreachable());
    let addr = spawn(database_secrets(), store.clone()).await;
    let response = send_raw(addr, "/health").await;

    assert_eq!(response.status, 200);
    assert_eq!(response.body, "OK");
    assert_no_cache(&response);
    assert_eq!(store.connections_opened(), 0);
}

#[tokio::test]
async fn test_secret_route() {
    let addr = spawn(database_secrets(), Arc::new(MemoryDocumentStore::new())).await;
    let response = send_raw(addr, "/secret").await;
    assert_eq!(response.body, "PAYLOAD_SECRET: payload-value");

    let addr = spawn(vec![], Arc::new(MemoryDocumentStore::new())).await;
    let response = send_raw(addr, "/secret").await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body, "PAYLOAD_SECRET: No secret found");
}

#[tokio::test]
async fn test_secrets_route_echoes_injected_values() {
    let addr = spawn(
        vec![("PAYLOAD_SECRET", "payload-value"), ("DB_HOST", "db.local")],
        Arc::new(MemoryDocumentStore::new()),
    )
    .await;
    let response = send_raw(addr, "/secrets").await;

    assert_eq!(response.status, 200);
    let echoed: serde_json::Value = serde_json::from_str(&response.body).unwrap();
    assert_eq!(
        echoed,
        serde_json::json!({
            "PAYLOAD_SECRET": "payload-value",
            "DB_USERNAME": null,
            "DB_PASSWORD": null,
            "DB_HOST": "db.local",
        })
    );
}

#[tokio::test]
async fn test_dbconnect_round_trip() {
    let store = Arc::new(MemoryDocumentStore::new());
    let addr = spawn(database_secrets(), store.clone()).await;
    let response = send_raw(addr, "/dbconnect").await;

    assert_eq!(response.status, 200);
    assert_no_cache(&response);
    let value: serde_json::Value = serde_json::from_str(&response.body).unwrap();
    assert_eq!(value["key"], "random");
    let number = value["value"].as_f64().unwrap();
    assert!(number.is_finite());
    assert!((0.0..1.0).contains(&number));

    assert_eq!(store.documents("random_values").len(), 1);
    assert_eq!(store.connections_opened(), 1);
    assert_eq!(store.open_connections(), 0);
}

#[tokio::test]
async fn test_dbconnect_opens_one_connection_per_request() {
    let store = Arc::new(MemoryDocumentStore::new());
    let addr = spawn(database_secrets(), store.clone()).await;
    for _ in 0..3 {
        assert_eq!(send_raw(addr, "/dbconnect").await.status, 200);
    }

    assert_eq!(store.connections_opened(), 3);
    assert_eq!(store.open_connections(), 0);
    assert_eq!(store.documents("random_values").len(), 3);
}

#[tokio::test]
async fn test_dbconnect_unreachable_database() {
    let store = Arc::new(MemoryDocumentStore::unreachable());
    let addr = spawn(database_secrets(), store.clone()).await;
    let response = send_raw(addr, "/dbconnect").await;

    assert_eq!(response.status, 500);
    assert_eq!(response.body, "Error connecting to database");
    assert_eq!(store.open_connections(), 0);
}

#[tokio::test]
async fn test_dbconnect_closes_connection_after_failed_read() {
    let store = Arc::new(MemoryDocumentStore::failing_reads());
    let addr = spawn(database_secrets(), store.clone()).await;
    let response = send_raw(addr, "/dbconnect").await;

    assert_eq!(response.status, 500);
    assert_eq!(response.body, "Error connecting to database");
    assert_eq!(store.connections_opened(), 1);
    assert_eq!(store.open_connections(), 0);
}

#[tokio::test]
async fn test_dbconnect_without_settings() {
    let store = Arc::new(MemoryDocumentStore::new());
    let addr = spawn(vec![("PAYLOAD_SECRET", "payload-value")], store.clone()).await;
    let response = send_raw(addr, "/dbconnect").await;

    assert_eq!(response.status, 500);
    assert_eq!(store.connections_opened(), 0);
}
