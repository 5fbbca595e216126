// Copyright (c) 2025 - Cowboy AI, Inc.
//! MongoDB-compatible document store

use async_trait::async_trait;
use mongodb::bson::doc;
use mongodb::bson::oid::ObjectId;
use mongodb::Client;
use secrecy::ExposeSecret;
use tracing::debug;

use super::db::{DatabaseSettings, DbError, DocumentConnection, DocumentStore, RandomValue};

/// Opens a fresh driver client per request
#[derive(Debug, Default, Clone, Copy)]
pub struct MongoDocumentStore;

#[async_trait]
impl DocumentStore for MongoDocumentStore {
    async fn connect(
        &self,
        settings: &DatabaseSettings,
    ) -> Result<Box<dyn DocumentConnection>, DbError> {
        let client = Client::with_uri_str(settings.uri().expose_secret())
            .await
            .map_err(|e| DbError::Connect(e.to_string()))?;
        debug!("Opened client for {}", settings.host);
        Ok(Box::new(MongoConnection {
            client,
            database: settings.database.clone(),
        }))
    }
}

struct MongoConnection {
    client: Client,
    database: String,
}

impl MongoConnection {
    fn collection(&self, name: &str) -> mongodb::Collection<RandomValue> {
        self.client.database(&self.database).collection(name)
    }
}

#[async_trait]
impl DocumentConnection for MongoConnection {
    async fn insert(
        &mut self,
        collection: &str,
        document: &RandomValue,
    ) -> Result<String, DbError> {
        let result = self
            .collection(collection)
            .insert_one(document)
            .await
            .map_err(|e| DbError::Write(e.to_string()))?;
        result
            .inserted_id
            .as_object_id()
            .map(|id| id.to_hex())
            .ok_or_else(|| DbError::Write("inserted id is not an ObjectId".into()))
    }

    async fn find_by_id(
        &mut self,
        collection: &str,
        id: &str,
    ) -> Result<Option<RandomValue>, DbError> {
        let id = ObjectId::parse_str(id).map_err(|e| DbError::Read(e.to_string()))?;
        self.collection(collection)
            .find_one(doc! { "_id": id })
            .await
            .map_err(|e| DbError::Read(e.to_string()))
    }

    async fn close(self: Box<Self>) {
        self.client.shutdown().await;
        debug!("Closed database client");
    }
}
