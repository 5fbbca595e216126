// Copyright (c) 2025 - Cowboy AI, Inc.
//! NATS publisher for provisioning events

use async_nats::{Client, ConnectOptions};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::errors::{ProvisionError, ProvisionResult};
use crate::events::{EventSink, ProvisioningEvent};
use crate::subjects::{SubjectBuilder, STACK_ROOT};

/// Configuration for NATS connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    /// NATS server URLs
    pub servers: Vec<String>,
    /// Client name
    pub name: String,
    /// Root of published subjects
    pub subject_root: String,
    #[serde(with = "secs")]
    pub connect_timeout: Duration,
    #[serde(with = "secs")]
    pub request_timeout: Duration,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            servers: vec!["nats://localhost:4222".to_string()],
            name: "backend-stack".to_string(),
            subject_root: STACK_ROOT.to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(5),
        }
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// NATS client wrapper
#[derive(Clone)]
pub struct NatsClient {
    client: Client,
}

impl NatsClient {
    /// Connect with the given configuration
    pub async fn new(config: &NatsConfig) -> ProvisionResult<Self> {
        let connect_options = ConnectOptions::new()
            .name(&config.name)
            .connection_timeout(config.connect_timeout)
            .request_timeout(Some(config.request_timeout));

        let client = async_nats::connect_with_options(config.servers.join(","), connect_options)
            .await
            .map_err(|e| ProvisionError::NatsConnection(e.to_string()))?;

        info!("Connected to NATS at {:?}", config.servers);

        Ok(Self { client })
    }

    /// Publish a JSON message to a subject
    pub async fn publish<T>(&self, subject: &str, message: &T) -> ProvisionResult<()>
    where
        T: Serialize,
    {
        let payload = serde_json::to_vec(message)?;

        self.client
            .publish(subject.to_string(), payload.into())
            .await
            .map_err(|e| ProvisionError::NatsPublish(e.to_string()))?;

        debug!("Published message to subject: {}", subject);
        Ok(())
    }

    /// Wait until every published message reached the server
    pub async fn flush(&self) -> ProvisionResult<()> {
        self.client
            .flush()
            .await
            .map_err(|e| ProvisionError::NatsPublish(e.to_string()))
    }
}

/// Publishes provisioning events to `{root}.{kind}.{change}`
#[derive(Clone)]
pub struct NatsEventSink {
    client: NatsClient,
    root: String,
}

impl NatsEventSink {
    pub fn new(client: NatsClient, root: impl Into<String>) -> Self {
        Self {
            client,
            root: root.into(),
        }
    }

    pub async fn connect(config: &NatsConfig) -> ProvisionResult<Self> {
        let client = NatsClient::new(config).await?;
        Ok(Self::new(client, config.subject_root.clone()))
    }

    pub fn subject_for(&self, event: &ProvisioningEvent) -> String {
        SubjectBuilder::new(event.kind)
            .root(self.root.clone())
            .change(event.change)
            .build()
    }

    pub fn client(&self) -> &NatsClient {
        &self.client
    }
}

#[async_trait]
impl EventSink for NatsEventSink {
    async fn publish(&self, event: &ProvisioningEvent) -> ProvisionResult<()> {
        let subject = self.subject_for(event);
        self.client.publish(&subject, event).await
    }
}
