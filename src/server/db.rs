// Copyright (c) 2025 - Cowboy AI, Inc.
//! Document database access for the HTTP service
//!
//! A request that touches the database opens its own connection, does one
//! insert-then-read round trip and closes the connection before the response
//! is written, whether the round trip succeeded or not. There is no pool.
//! A round trip that is cancelled mid-flight still closes its connection on
//! the runtime.

use async_trait::async_trait;
use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use super::SecretSource;

pub const DEFAULT_DATABASE: &str = "testdb";
pub const DEFAULT_PORT: u16 = 27017;

/// Database round trip failure
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Database settings incomplete: {0} is not set")]
    MissingSetting(&'static str),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Write failed: {0}")]
    Write(String),

    #[error("Read failed: {0}")]
    Read(String),

    #[error("Inserted document {0} could not be read back")]
    NotFound(String),
}

/// Document written and read back by `/dbconnect`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomValue {
    pub key: String,
    pub value: f64,
}

impl RandomValue {
    pub fn generate() -> Self {
        Self {
            key: "random".to_string(),
            value: rand::thread_rng().gen::<f64>(),
        }
    }
}

/// Where and as whom to connect
pub struct DatabaseSettings {
    pub username: SecretString,
    pub password: SecretString,
    pub host: String,
    pub port: u16,
    pub database: String,
}

impl DatabaseSettings {
    /// Read `DB_USERNAME`, `DB_PASSWORD` and `DB_HOST`
    pub fn from_source(source: &dyn SecretSource) -> Result<Self, DbError> {
        let username = source
            .get("DB_USERNAME")
            .ok_or(DbError::MissingSetting("DB_USERNAME"))?;
        let password = source
            .get("DB_PASSWORD")
            .ok_or(DbError::MissingSetting("DB_PASSWORD"))?;
        let host = source
            .get("DB_HOST")
            .ok_or(DbError::MissingSetting("DB_HOST"))?;

        Ok(Self {
            username,
            password,
            host: host.expose_secret().to_string(),
            port: DEFAULT_PORT,
            database: DEFAULT_DATABASE.to_string(),
        })
    }

    /// Connection string for a TLS replica set endpoint
    ///
    /// Credentials are inserted as-is, without percent-encoding.
    pub fn uri(&self) -> SecretString {
        SecretString::from(format!(
            "mongodb://{}:{}@{}:{}/{}?tls=true&tlsCAFile=global-bundle.pem&replicaSet=rs0&readPreference=secondaryPreferred&retryWrites=false",
            self.username.expose_secret(),
            self.password.expose_secret(),
            self.host,
            self.port,
            self.database
        ))
    }
}

/// Opens connections
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn connect(
        &self,
        settings: &DatabaseSettings,
    ) -> Result<Box<dyn DocumentConnection>, DbError>;
}

/// One open connection
#[async_trait]
pub trait DocumentConnection: Send {
    /// Insert a document and return its id
    async fn insert(&mut self, collection: &str, document: &RandomValue)
        -> Result<String, DbError>;

    async fn find_by_id(
        &mut self,
        collection: &str,
        id: &str,
    ) -> Result<Option<RandomValue>, DbError>;

    async fn close(self: Box<Self>);
}

/// Insert a fresh random value, read it back, and close the connection
pub async fn round_trip(
    store: &dyn DocumentStore,
    settings: &DatabaseSettings,
    collection: &str,
) -> Result<RandomValue, DbError> {
    let mut guard = ConnectionGuard(Some(store.connect(settings).await?));
    let result = match guard.0.as_deref_mut() {
        Some(connection) => insert_and_read(connection, collection).await,
        None => Err(DbError::Connect("connection already closed".into())),
    };
    guard.close().await;
    result
}

/// Closes its connection when dropped before `close` ran
struct ConnectionGuard(Option<Box<dyn DocumentConnection>>);

impl ConnectionGuard {
    async fn close(&mut self) {
        if let Some(connection) = self.0.take() {
            connection.close().await;
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let Some(connection) = self.0.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                debug!("Round trip cancelled, closing its connection");
                runtime.spawn(connection.close());
            }
            Err(_) => warn!("Round trip cancelled outside a runtime, connection left open"),
        }
    }
}

async fn insert_and_read(
    connection: &mut dyn DocumentConnection,
    collection: &str,
) -> Result<RandomValue, DbError> {
    let document = RandomValue::generate();
    let id = connection.insert(collection, &document).await?;
    debug!("Inserted document {} into {}", id, collection);
    connection
        .find_by_id(collection, &id)
        .await?
        .ok_or(DbError::NotFound(id))
}

type Collections = BTreeMap<String, BTreeMap<String, RandomValue>>;

/// Process-local document store
#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: Arc<Mutex<Collections>>,
    open: Arc<AtomicUsize>,
    opened_total: AtomicUsize,
    unreachable: bool,
    fail_reads: bool,
    insert_delay: Option<Duration>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every connection attempt fails
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    /// Connections open but reads fail
    pub fn failing_reads() -> Self {
        Self {
            fail_reads: true,
            ..Self::default()
        }
    }

    /// Inserts take `delay` before they complete
    pub fn with_insert_delay(mut self, delay: Duration) -> Self {
        self.insert_delay = Some(delay);
        self
    }

    /// Connections currently open
    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    pub fn connections_opened(&self) -> usize {
        self.opened_total.load(Ordering::SeqCst)
    }

    pub fn documents(&self, collection: &str) -> Vec<RandomValue> {
        self.collections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn connect(
        &self,
        settings: &DatabaseSettings,
    ) -> Result<Box<dyn DocumentConnection>, DbError> {
        if self.unreachable {
            return Err(DbError::Connect(format!(
                "{}:{} is unreachable",
                settings.host, settings.port
            )));
        }
        self.open.fetch_add(1, Ordering::SeqCst);
        self.opened_total.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryConnection {
            collections: Arc::clone(&self.collections),
            open: Arc::clone(&self.open),
            fail_reads: self.fail_reads,
            insert_delay: self.insert_delay,
        }))
    }
}

struct MemoryConnection {
    collections: Arc<Mutex<Collections>>,
    open: Arc<AtomicUsize>,
    fail_reads: bool,
    insert_delay: Option<Duration>,
}

#[async_trait]
impl DocumentConnection for MemoryConnection {
    async fn insert(
        &mut self,
        collection: &str,
        document: &RandomValue,
    ) -> Result<String, DbError> {
        if let Some(delay) = self.insert_delay {
            tokio::time::sleep(delay).await;
        }
        let id = Uuid::now_v7().to_string();
        self.collections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), document.clone());
        Ok(id)
    }

    async fn find_by_id(
        &mut self,
        collection: &str,
        id: &str,
    ) -> Result<Option<RandomValue>, DbError> {
        if self.fail_reads {
            return Err(DbError::Read("injected read failure".into()));
        }
        Ok(self
            .collections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn close(self: Box<Self>) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}
