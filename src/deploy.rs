// Copyright (c) 2025 - Cowboy AI, Inc.
//! Apply and teardown
//!
//! The [`Deployer`] walks a synthesized [`Stack`] against a provider.
//!
//! # Apply
//!
//! ```text
//! validate graph
//!     ↓
//! preflight: look up every imported resource   (any miss aborts here)
//!     ↓
//! wave 1 ─ create members concurrently ─┐
//! wave 2 ─ ...                          │ a failure ends the run after
//! wave n ─ ...                          │ its wave; nothing is rolled back
//!     ↓                                 ┘
//! resolve stack outputs
//! ```
//!
//! # Teardown
//!
//! Waves in reverse. Only resources this state created are deleted; imported
//! resources and resources with a `Retain` policy end up `Retained`.
//!
//! Every lifecycle change is recorded in the [`StackState`] history and
//! published to the [`EventSink`]; all events of one run share a
//! correlation id.

use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::backend::{AliasTarget, CloudProvider, HostedZone, ProvisionedResource, RecordType};
use crate::domain::{DomainName, RemovalPolicy, ResourceId};
use crate::errors::{ProvisionError, ProvisionResult};
use crate::events::{EventSink, NullEventSink, ProvisioningEvent};
use crate::graph::{attributes, OutputTable, ResourceDescriptor, ResourceSpec};
use crate::provision::{CertificateIssuer, DnsBinder, SecretsProvisioner, ValidationSettings};
use crate::stack::Stack;
use crate::state_machine::{
    LifecycleChange, LifecycleInput, ResourceLifecycle, StateMachineWithHistory,
};

/// Lifecycle and identity of one resource
#[derive(Debug, Clone)]
pub struct ResourceRecord {
    pub lifecycle: StateMachineWithHistory<ResourceLifecycle>,
    pub physical_id: Option<String>,
}

impl Default for ResourceRecord {
    fn default() -> Self {
        Self {
            lifecycle: StateMachineWithHistory::new(ResourceLifecycle::Planned),
            physical_id: None,
        }
    }
}

impl ResourceRecord {
    pub fn state(&self) -> ResourceLifecycle {
        *self.lifecycle.current_state()
    }
}

/// What a deployment has done so far
///
/// Left partially populated when a run fails.
#[derive(Debug, Clone, Default)]
pub struct StackState {
    records: BTreeMap<ResourceId, ResourceRecord>,
    pub outputs: OutputTable,
    pub stack_outputs: BTreeMap<String, String>,
}

impl StackState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, id: &ResourceId) -> Option<&ResourceRecord> {
        self.records.get(id)
    }

    /// Current state; `Planned` for resources never touched
    pub fn lifecycle_of(&self, id: &ResourceId) -> ResourceLifecycle {
        self.records
            .get(id)
            .map(ResourceRecord::state)
            .unwrap_or_default()
    }

    pub fn physical_id(&self, id: &ResourceId) -> Option<&str> {
        self.records.get(id).and_then(|r| r.physical_id.as_deref())
    }

    pub fn stack_output(&self, name: &str) -> Option<&str> {
        self.stack_outputs.get(name).map(String::as_str)
    }

    /// Resources currently in the given state
    pub fn in_state(&self, lifecycle: ResourceLifecycle) -> Vec<&ResourceId> {
        self.records
            .iter()
            .filter(|(_, record)| record.state() == lifecycle)
            .map(|(id, _)| id)
            .collect()
    }

    fn apply(&mut self, id: &ResourceId, input: LifecycleInput) -> ProvisionResult<LifecycleChange> {
        self.records
            .entry(id.clone())
            .or_default()
            .lifecycle
            .transition_with_history(input, chrono::Utc::now())
            .map_err(|source| ProvisionError::Lifecycle {
                resource: id.clone(),
                source,
            })
    }
}

/// Applies and tears down stacks against a provider
pub struct Deployer<P: ?Sized> {
    provider: Arc<P>,
    events: Arc<dyn EventSink>,
    validation: ValidationSettings,
}

impl<P: CloudProvider + ?Sized> Deployer<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self {
            provider,
            events: Arc::new(NullEventSink),
            validation: ValidationSettings::default(),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_validation(mut self, validation: ValidationSettings) -> Self {
        self.validation = validation;
        self
    }

    /// Create every resource of `stack`
    pub async fn deploy(&self, stack: &Stack, state: &mut StackState) -> ProvisionResult<()> {
        stack.graph.validate()?;
        let run = Uuid::now_v7();
        info!("Deploying {} resources (run {})", stack.graph.len(), run);

        self.preflight(stack, state, run).await?;

        let waves = stack.graph.creation_waves()?;
        for (number, wave) in waves.iter().enumerate() {
            let pending: Vec<&ResourceDescriptor> = wave
                .iter()
                .copied()
                .filter(|d| state.lifecycle_of(&d.id) == ResourceLifecycle::Planned)
                .collect();
            if pending.is_empty() {
                continue;
            }
            info!("Wave {}: creating {} resources", number + 1, pending.len());

            for descriptor in &pending {
                self.transition(state, run, descriptor, LifecycleInput::BeginCreate, None)
                    .await?;
            }

            let results = {
                let outputs = &state.outputs;
                join_all(pending.iter().map(|d| self.create(d, outputs))).await
            };

            let mut first_error = None;
            for (descriptor, result) in pending.into_iter().zip(results) {
                match result {
                    Ok(created) => {
                        debug!("Created {} as {}", descriptor, created.physical_id);
                        self.transition(
                            state,
                            run,
                            descriptor,
                            LifecycleInput::CreateSucceeded,
                            Some(&created.physical_id),
                        )
                        .await?;
                        if let Some(record) = state.records.get_mut(&descriptor.id) {
                            record.physical_id = Some(created.physical_id);
                        }
                        state.outputs.insert(descriptor.id.clone(), created.outputs);
                    }
                    Err(err) => {
                        error!("Failed to create {}: {}", descriptor, err);
                        self.transition(
                            state,
                            run,
                            descriptor,
                            LifecycleInput::CreateFailed(err.to_string()),
                            None,
                        )
                        .await?;
                        first_error.get_or_insert(err);
                    }
                }
            }
            if let Some(err) = first_error {
                warn!("Deployment stopped after wave {}", number + 1);
                return Err(err);
            }
        }

        for (name, reference) in &stack.outputs {
            let value = state.outputs.resolve(reference)?.to_string();
            info!("Output {} = {}", name, value);
            state.stack_outputs.insert(name.clone(), value);
        }
        info!("Deployment complete (run {})", run);
        Ok(())
    }

    /// Delete what `deploy` created, in reverse order
    pub async fn destroy(&self, stack: &Stack, state: &mut StackState) -> ProvisionResult<()> {
        let run = Uuid::now_v7();
        info!("Tearing down stack (run {})", run);

        for (number, wave) in stack.graph.teardown_waves()?.iter().enumerate() {
            let mut doomed = Vec::new();
            for descriptor in wave.iter().copied() {
                match state.lifecycle_of(&descriptor.id) {
                    ResourceLifecycle::Imported => {
                        self.transition(state, run, descriptor, LifecycleInput::Retain, None)
                            .await?;
                    }
                    ResourceLifecycle::Created
                        if descriptor.removal_policy == RemovalPolicy::Retain =>
                    {
                        info!("Retaining {}", descriptor);
                        self.transition(state, run, descriptor, LifecycleInput::Retain, None)
                            .await?;
                    }
                    ResourceLifecycle::Created => {
                        let Some(physical_id) = state.physical_id(&descriptor.id) else {
                            continue;
                        };
                        let physical_id = physical_id.to_string();
                        self.transition(state, run, descriptor, LifecycleInput::BeginDelete, None)
                            .await?;
                        doomed.push((descriptor, physical_id));
                    }
                    _ => {}
                }
            }
            if doomed.is_empty() {
                continue;
            }
            info!("Wave {}: deleting {} resources", number + 1, doomed.len());

            let results = {
                let outputs = &state.outputs;
                join_all(
                    doomed
                        .iter()
                        .map(|(descriptor, physical_id)| self.delete(descriptor, physical_id, outputs)),
                )
                .await
            };

            let mut first_error = None;
            for ((descriptor, physical_id), result) in doomed.into_iter().zip(results) {
                match result {
                    Ok(()) => {
                        self.transition(
                            state,
                            run,
                            descriptor,
                            LifecycleInput::DeleteSucceeded,
                            Some(&physical_id),
                        )
                        .await?;
                        state.outputs.remove(&descriptor.id);
                    }
                    Err(err) => {
                        error!("Failed to delete {}: {}", descriptor, err);
                        self.transition(
                            state,
                            run,
                            descriptor,
                            LifecycleInput::DeleteFailed(err.to_string()),
                            Some(&physical_id),
                        )
                        .await?;
                        first_error.get_or_insert(err);
                    }
                }
            }
            if let Some(err) = first_error {
                return Err(err);
            }
        }

        state.stack_outputs.clear();
        info!("Teardown complete (run {})", run);
        Ok(())
    }

    /// Resolve every imported resource before anything is created
    async fn preflight(
        &self,
        stack: &Stack,
        state: &mut StackState,
        run: Uuid,
    ) -> ProvisionResult<()> {
        let mut resolved = Vec::new();
        for descriptor in stack.graph.descriptors().filter(|d| d.is_imported()) {
            if state.lifecycle_of(&descriptor.id) != ResourceLifecycle::Planned {
                continue;
            }
            let found = self.import(descriptor).await.map_err(|err| {
                error!("Preflight failed for {}: {}", descriptor, err);
                err
            })?;
            resolved.push((descriptor, found));
        }

        for (descriptor, found) in resolved {
            self.transition(
                state,
                run,
                descriptor,
                LifecycleInput::Import,
                Some(&found.physical_id),
            )
            .await?;
            if let Some(record) = state.records.get_mut(&descriptor.id) {
                record.physical_id = Some(found.physical_id);
            }
            state.outputs.insert(descriptor.id.clone(), found.outputs);
        }
        Ok(())
    }

    async fn import(&self, descriptor: &ResourceDescriptor) -> ProvisionResult<ProvisionedResource> {
        match &descriptor.spec {
            ResourceSpec::Secret(definition) => {
                let metadata = SecretsProvisioner::new(self.provider.clone())
                    .resolve_existing(&definition.reference, &definition.schema)
                    .await?;
                Ok(ProvisionedResource::new(&metadata.arn)
                    .with_output(attributes::SECRET_ARN, &metadata.arn))
            }
            ResourceSpec::HostedZone(lookup) => {
                let zone = self
                    .provider
                    .lookup_zone(&lookup.domain)
                    .await?
                    .ok_or_else(|| ProvisionError::HostedZoneNotFound(lookup.domain.to_string()))?;
                info!("Found hosted zone {} for {}", zone.zone_id, zone.name);
                Ok(ProvisionedResource::new(&zone.zone_id)
                    .with_output(attributes::HOSTED_ZONE_ID, &zone.zone_id)
                    .with_output(attributes::ZONE_NAME, zone.name.as_str()))
            }
            _ => Err(ProvisionError::Validation(format!(
                "{descriptor} cannot be imported"
            ))),
        }
    }

    async fn create(
        &self,
        descriptor: &ResourceDescriptor,
        outputs: &OutputTable,
    ) -> ProvisionResult<ProvisionedResource> {
        match &descriptor.spec {
            ResourceSpec::Secret(definition) => {
                let metadata = SecretsProvisioner::new(self.provider.clone())
                    .generate(definition)
                    .await?;
                Ok(ProvisionedResource::new(&metadata.arn)
                    .with_output(attributes::SECRET_ARN, &metadata.arn))
            }
            ResourceSpec::Certificate(spec) => {
                let zone = hosted_zone(outputs, &spec.hosted_zone)?;
                let issued = CertificateIssuer::new(self.provider.clone(), self.validation)
                    .issue(spec, &zone)
                    .await?;
                Ok(ProvisionedResource::new(&issued.arn)
                    .with_output(attributes::CERTIFICATE_ARN, &issued.arn))
            }
            ResourceSpec::DnsRecord(spec) => {
                let zone = hosted_zone(outputs, &spec.hosted_zone)?;
                let target = AliasTarget {
                    dns_name: outputs
                        .attribute(&spec.load_balancer, attributes::DNS_NAME)?
                        .to_string(),
                    hosted_zone_id: outputs
                        .attribute(&spec.load_balancer, attributes::CANONICAL_HOSTED_ZONE_ID)?
                        .to_string(),
                };
                let record = DnsBinder::new(self.provider.clone())
                    .bind(&zone, &spec.subdomain, &spec.domain, &target)
                    .await?;
                Ok(ProvisionedResource::new(&record.name)
                    .with_output(attributes::FQDN, &record.name))
            }
            _ => self.provider.create(descriptor, outputs).await,
        }
    }

    async fn delete(
        &self,
        descriptor: &ResourceDescriptor,
        physical_id: &str,
        outputs: &OutputTable,
    ) -> ProvisionResult<()> {
        match &descriptor.spec {
            ResourceSpec::Secret(_) => self.provider.delete_secret(physical_id).await,
            ResourceSpec::Certificate(_) => self.provider.delete_certificate(physical_id).await,
            ResourceSpec::DnsRecord(spec) => {
                let zone = hosted_zone(outputs, &spec.hosted_zone)?;
                self.provider
                    .delete_record(&zone.zone_id, physical_id, RecordType::A)
                    .await
            }
            _ => self.provider.delete(descriptor, physical_id).await,
        }
    }

    async fn transition(
        &self,
        state: &mut StackState,
        run: Uuid,
        descriptor: &ResourceDescriptor,
        input: LifecycleInput,
        physical_id: Option<&str>,
    ) -> ProvisionResult<()> {
        let reason = match &input {
            LifecycleInput::CreateFailed(reason) | LifecycleInput::DeleteFailed(reason) => {
                Some(reason.clone())
            }
            _ => None,
        };
        let change = state.apply(&descriptor.id, input)?;

        let mut event = ProvisioningEvent::new(run, descriptor.id.clone(), descriptor.kind(), change);
        if let Some(physical_id) = physical_id {
            event = event.with_physical_id(physical_id);
        }
        if let Some(reason) = reason {
            event = event.with_reason(reason);
        }
        if let Err(err) = self.events.publish(&event).await {
            warn!("Could not publish {}: {}", event.event_type_name(), err);
        }
        Ok(())
    }
}

/// Hosted zone as resolved during preflight
fn hosted_zone(outputs: &OutputTable, zone: &ResourceId) -> ProvisionResult<HostedZone> {
    Ok(HostedZone {
        zone_id: outputs
            .attribute(zone, attributes::HOSTED_ZONE_ID)?
            .to_string(),
        name: DomainName::new(outputs.attribute(zone, attributes::ZONE_NAME)?)?,
    })
}
