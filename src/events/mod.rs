// Copyright (c) 2025 - Cowboy AI, Inc.
//! Provisioning Events
//!
//! Every lifecycle change of a resource during apply or teardown is recorded
//! as a [`ProvisioningEvent`]. Events are immutable facts named for what
//! happened (`created`, not `create`).
//!
//! # Correlation
//!
//! All events of one deploy or destroy run share a `correlation_id`, so a
//! consumer can group a run's events across resources:
//!
//! ```text
//! deploy run  correlation_id: run-1
//!   ├─ DocDBCredentials  imported
//!   ├─ Vpc               creating → created
//!   └─ ...
//! ```
//!
//! # Sinks
//!
//! - [`MemoryEventSink`] keeps events in order (tests, audit)
//! - [`NatsEventSink`](crate::nats::NatsEventSink) publishes JSON to
//!   `stack.{kind}.{change}`

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use uuid::Uuid;

use crate::domain::{ResourceId, ResourceKind};
use crate::errors::ProvisionResult;
use crate::state_machine::LifecycleChange;

/// Current schema version of [`ProvisioningEvent`]
pub const EVENT_VERSION: u32 = 1;

/// A resource changed lifecycle state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningEvent {
    pub event_version: u32,
    pub event_id: Uuid,
    /// Deploy or destroy run that produced the event
    pub correlation_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub resource: ResourceId,
    pub kind: ResourceKind,
    pub change: LifecycleChange,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ProvisioningEvent {
    pub fn new(
        correlation_id: Uuid,
        resource: ResourceId,
        kind: ResourceKind,
        change: LifecycleChange,
    ) -> Self {
        Self {
            event_version: EVENT_VERSION,
            event_id: Uuid::now_v7(),
            correlation_id,
            occurred_at: Utc::now(),
            resource,
            kind,
            change,
            physical_id: None,
            reason: None,
        }
    }

    pub fn with_physical_id(mut self, physical_id: impl Into<String>) -> Self {
        self.physical_id = Some(physical_id.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// e.g. `database_cluster.created`
    pub fn event_type_name(&self) -> String {
        format!("{}.{}", self.kind, self.change)
    }
}

/// Destination of provisioning events
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: &ProvisioningEvent) -> ProvisionResult<()>;
}

/// Keeps events in memory, in publication order
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<ProvisioningEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProvisioningEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Changes recorded for one resource, oldest first
    pub fn changes_of(&self, resource: &ResourceId) -> Vec<LifecycleChange> {
        self.events()
            .into_iter()
            .filter(|e| &e.resource == resource)
            .map(|e| e.change)
            .collect()
    }
}

#[async_trait]
impl EventSink for MemoryEventSink {
    async fn publish(&self, event: &ProvisioningEvent) -> ProvisionResult<()> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event.clone());
        Ok(())
    }
}

/// Drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

#[async_trait]
impl EventSink for NullEventSink {
    async fn publish(&self, _event: &ProvisioningEvent) -> ProvisionResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(change: LifecycleChange) -> ProvisioningEvent {
        ProvisioningEvent::new(
            Uuid::now_v7(),
            ResourceId::new("DocDbCluster").unwrap(),
            ResourceKind::DatabaseCluster,
            change,
        )
    }

    #[test]
    fn test_event_serialization() {
        let event = event(LifecycleChange::Created).with_physical_id("docdb-123");
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["kind"], "database_cluster");
        assert_eq!(json["change"], "created");
        assert_eq!(json["physical_id"], "docdb-123");
        assert!(json.get("reason").is_none());

        let back: ProvisioningEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_event_type_name() {
        assert_eq!(
            event(LifecycleChange::Deleting).event_type_name(),
            "database_cluster.deleting"
        );
    }

    #[tokio::test]
    async fn test_memory_sink_keeps_order() {
        let sink = MemoryEventSink::new();
        sink.publish(&event(LifecycleChange::Creating)).await.unwrap();
        sink.publish(&event(LifecycleChange::Created)).await.unwrap();

        assert_eq!(
            sink.changes_of(&ResourceId::new("DocDbCluster").unwrap()),
            vec![LifecycleChange::Creating, LifecycleChange::Created]
        );
    }
}
