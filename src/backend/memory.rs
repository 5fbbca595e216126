// Copyright (c) 2025 - Cowboy AI, Inc.
//! In-memory cloud provider
//!
//! Implements every provider trait against process memory so a stack can be
//! planned, applied and torn down without a cloud account. Every mutating
//! call is appended to a journal, and failures can be injected per resource.
//!
//! Certificates validate the way DNS validation does in practice: a request
//! is issued once every challenge record it asked for is present in a zone.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

use super::{
    CertificateAuthority, CertificateRequest, CertificateStatus, CloudBackend, DnsRecord,
    HostedZone, HostedZones, ProvisionedResource, RecordType, RecordValue, SecretMetadata,
    SecretStore, ValidationRecord,
};
use crate::domain::{DomainName, ResourceId, ResourceKind};
use crate::errors::{ProvisionError, ProvisionResult};
use crate::graph::{attributes, OutputTable, ResourceDescriptor, ResourceSpec};
use crate::provision::{render_task_definition, RegisteredTaskDefinition};

/// Canonical zone id of load balancer aliases
pub const LOAD_BALANCER_ZONE_ID: &str = "Z35SXDOTRQ7X7K";
const REGION: &str = "us-east-1";

/// Failures the provider should simulate
#[derive(Debug, Clone, Default)]
pub struct FailureInjection {
    /// Secrets that behave as absent even if seeded
    pub missing_secrets: BTreeSet<String>,
    /// Certificates stay pending forever
    pub certificates_never_validate: bool,
    /// Resources whose creation fails
    pub failing_resources: BTreeSet<ResourceId>,
}

/// One provider call that changed or read state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalEntry {
    Created {
        resource: ResourceId,
        kind: ResourceKind,
        physical_id: String,
    },
    Deleted {
        resource: ResourceId,
        kind: ResourceKind,
        physical_id: String,
    },
    SecretDescribed(String),
    SecretWritten(String),
    SecretDeleted(String),
    RecordUpserted {
        zone_id: String,
        name: String,
        record_type: RecordType,
    },
    RecordDeleted {
        zone_id: String,
        name: String,
        record_type: RecordType,
    },
    CertificateRequested(String),
    CertificateDeleted(String),
    TaskStarted(String),
}

/// Container started from a registered task definition
#[derive(Debug)]
pub struct RunningTask {
    pub task_definition: String,
    pub environment: BTreeMap<String, String>,
    pub secrets: BTreeMap<String, SecretString>,
}

struct StoredSecret {
    arn: String,
    fields: BTreeMap<String, SecretString>,
}

struct StoredZone {
    name: DomainName,
    records: BTreeMap<(String, RecordType), DnsRecord>,
}

struct StoredCertificate {
    validation: Vec<ValidationRecord>,
}

#[derive(Default)]
struct CloudState {
    resources: BTreeMap<String, (ResourceId, ResourceKind)>,
    secrets: BTreeMap<String, StoredSecret>,
    zones: BTreeMap<String, StoredZone>,
    certificates: BTreeMap<String, StoredCertificate>,
    task_definitions: BTreeMap<String, RegisteredTaskDefinition>,
    journal: Vec<JournalEntry>,
}

/// Process-local provider
#[derive(Default)]
pub struct InMemoryCloud {
    state: Mutex<CloudState>,
    failures: FailureInjection,
}

fn short_id() -> String {
    Uuid::now_v7().simple().to_string()[20..].to_string()
}

impl InMemoryCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failures(mut self, failures: FailureInjection) -> Self {
        self.failures = failures;
        self
    }

    /// Seed a pre-created JSON secret
    pub fn with_secret<I, K, V>(self, name: &str, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        {
            let mut state = self.lock();
            state.secrets.insert(
                name.to_string(),
                StoredSecret {
                    arn: format!("arn:memory:secretsmanager:{REGION}:secret:{name}-{}", short_id()),
                    fields: fields
                        .into_iter()
                        .map(|(k, v)| (k.into(), SecretString::from(v.into())))
                        .collect(),
                },
            );
        }
        self
    }

    /// Seed a public hosted zone
    pub fn with_hosted_zone(self, domain: &DomainName) -> Self {
        {
            let mut state = self.lock();
            let zone_id = format!("Z{}", short_id().to_uppercase());
            state.zones.insert(
                zone_id,
                StoredZone {
                    name: domain.clone(),
                    records: BTreeMap::new(),
                },
            );
        }
        self
    }

    fn lock(&self) -> MutexGuard<'_, CloudState> {
        // A panic while holding the lock leaves consistent data behind.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn journal(&self) -> Vec<JournalEntry> {
        self.lock().journal.clone()
    }

    /// Logical ids of resources that currently exist
    pub fn live_resources(&self) -> Vec<ResourceId> {
        self.lock()
            .resources
            .values()
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn task_definition(&self, arn: &str) -> Option<RegisteredTaskDefinition> {
        self.lock().task_definitions.get(arn).cloned()
    }

    /// ARNs of certificates that were requested and not deleted
    pub fn certificates(&self) -> Vec<String> {
        self.lock().certificates.keys().cloned().collect()
    }

    pub fn secret_exists(&self, name: &str) -> bool {
        self.lock().secrets.contains_key(name)
    }

    /// Start a task, resolving its secret references against the store
    pub fn start_task(&self, task_definition_arn: &str) -> ProvisionResult<RunningTask> {
        let mut state = self.lock();
        let definition = state
            .task_definitions
            .get(task_definition_arn)
            .cloned()
            .ok_or_else(|| {
                ProvisionError::Backend(format!("Unknown task definition {task_definition_arn}"))
            })?;

        let mut secrets = BTreeMap::new();
        for (key, value_from) in &definition.secrets {
            let value = Self::resolve_value_from(&state, value_from)?;
            secrets.insert(key.clone(), value);
        }
        state
            .journal
            .push(JournalEntry::TaskStarted(task_definition_arn.to_string()));

        Ok(RunningTask {
            task_definition: task_definition_arn.to_string(),
            environment: definition.environment,
            secrets,
        })
    }

    /// `{arn}:{field}::` to the field's value
    fn resolve_value_from(state: &CloudState, value_from: &str) -> ProvisionResult<SecretString> {
        let reference = value_from.strip_suffix("::").unwrap_or(value_from);
        let (arn, field) = reference.rsplit_once(':').ok_or_else(|| {
            ProvisionError::Backend(format!("Malformed secret reference {value_from}"))
        })?;

        state
            .secrets
            .values()
            .find(|s| s.arn == arn)
            .and_then(|s| s.fields.get(field))
            .map(|v| SecretString::from(v.expose_secret().to_string()))
            .ok_or_else(|| ProvisionError::SecretNotFound(format!("{arn}#{field}")))
    }

    fn record(&self, entry: JournalEntry) {
        self.lock().journal.push(entry);
    }

    fn create_generic(
        &self,
        descriptor: &ResourceDescriptor,
        outputs: &OutputTable,
    ) -> ProvisionResult<ProvisionedResource> {
        let kind = descriptor.kind();
        let physical_id = format!("{}-{}", kind.physical_prefix(), short_id());
        let arn = format!("arn:memory:{}:{REGION}:{}", kind.as_str(), physical_id);

        let created = match &descriptor.spec {
            ResourceSpec::Vpc(_) => {
                ProvisionedResource::new(&physical_id).with_output(attributes::VPC_ID, &physical_id)
            }
            ResourceSpec::SecurityGroup(sg) => {
                outputs.attribute(&sg.network, attributes::VPC_ID)?;
                for peer in sg.peer_groups() {
                    outputs.attribute(peer, attributes::GROUP_ID)?;
                }
                ProvisionedResource::new(&physical_id)
                    .with_output(attributes::GROUP_ID, &physical_id)
            }
            ResourceSpec::DatabaseCluster(db) => {
                outputs.attribute(&db.security_group, attributes::GROUP_ID)?;
                outputs.attribute(db.master_username.secret().resource(), attributes::SECRET_ARN)?;
                let hostname = format!(
                    "{}.cluster-{}.{REGION}.docdb.amazonaws.com",
                    descriptor.id.as_str().to_lowercase(),
                    short_id()
                );
                ProvisionedResource::new(&physical_id)
                    .with_output(attributes::ENDPOINT_HOSTNAME, hostname)
                    .with_output(attributes::ENDPOINT_PORT, db.port.to_string())
            }
            ResourceSpec::LogGroup(_) => {
                let name = format!("/stack/{}", descriptor.id);
                ProvisionedResource::new(&name).with_output(attributes::LOG_GROUP_NAME, name)
            }
            ResourceSpec::Cluster(_) => {
                ProvisionedResource::new(&arn).with_output(attributes::CLUSTER_ARN, &arn)
            }
            ResourceSpec::TaskDefinition(spec) => {
                let registered = render_task_definition(descriptor.id.as_str(), spec, outputs)?;
                self.lock().task_definitions.insert(arn.clone(), registered);
                ProvisionedResource::new(&arn).with_output(attributes::TASK_DEFINITION_ARN, &arn)
            }
            ResourceSpec::Service(service) => {
                outputs.attribute(&service.cluster, attributes::CLUSTER_ARN)?;
                outputs.attribute(&service.task_definition, attributes::TASK_DEFINITION_ARN)?;
                if let Some(target_group) = &service.target_group {
                    outputs.attribute(target_group, attributes::TARGET_GROUP_ARN)?;
                }
                ProvisionedResource::new(&arn).with_output(attributes::SERVICE_ARN, &arn)
            }
            ResourceSpec::LoadBalancer(lb) => {
                outputs.attribute(&lb.security_group, attributes::GROUP_ID)?;
                let dns_name = format!(
                    "{}-{}.{REGION}.elb.amazonaws.com",
                    descriptor.id,
                    short_id()
                );
                ProvisionedResource::new(&arn)
                    .with_output(attributes::DNS_NAME, dns_name)
                    .with_output(attributes::CANONICAL_HOSTED_ZONE_ID, LOAD_BALANCER_ZONE_ID)
            }
            ResourceSpec::TargetGroup(_) => {
                ProvisionedResource::new(&arn).with_output(attributes::TARGET_GROUP_ARN, &arn)
            }
            ResourceSpec::Listener(listener) => {
                outputs.attribute(&listener.certificate, attributes::CERTIFICATE_ARN)?;
                outputs.attribute(&listener.load_balancer, attributes::DNS_NAME)?;
                ProvisionedResource::new(&arn).with_output(attributes::LISTENER_ARN, &arn)
            }
            ResourceSpec::Secret(_)
            | ResourceSpec::HostedZone(_)
            | ResourceSpec::Certificate(_)
            | ResourceSpec::DnsRecord(_) => {
                return Err(ProvisionError::Backend(format!(
                    "{} resources are not created through the generic backend",
                    kind
                )))
            }
        };
        Ok(created)
    }
}

#[async_trait]
impl CloudBackend for InMemoryCloud {
    async fn create(
        &self,
        descriptor: &ResourceDescriptor,
        outputs: &OutputTable,
    ) -> ProvisionResult<ProvisionedResource> {
        if self.failures.failing_resources.contains(&descriptor.id) {
            return Err(ProvisionError::Backend(format!(
                "Injected failure creating {}",
                descriptor.id
            )));
        }

        let created = self.create_generic(descriptor, outputs)?;
        let mut state = self.lock();
        state.resources.insert(
            created.physical_id.clone(),
            (descriptor.id.clone(), descriptor.kind()),
        );
        state.journal.push(JournalEntry::Created {
            resource: descriptor.id.clone(),
            kind: descriptor.kind(),
            physical_id: created.physical_id.clone(),
        });
        debug!("Created {} as {}", descriptor, created.physical_id);
        Ok(created)
    }

    async fn delete(
        &self,
        descriptor: &ResourceDescriptor,
        physical_id: &str,
    ) -> ProvisionResult<()> {
        let mut state = self.lock();
        if state.resources.remove(physical_id).is_none() {
            return Err(ProvisionError::Backend(format!(
                "{} ({}) does not exist",
                descriptor.id, physical_id
            )));
        }
        state.task_definitions.remove(physical_id);
        state.journal.push(JournalEntry::Deleted {
            resource: descriptor.id.clone(),
            kind: descriptor.kind(),
            physical_id: physical_id.to_string(),
        });
        Ok(())
    }
}

#[async_trait]
impl SecretStore for InMemoryCloud {
    async fn describe_secret(&self, name: &str) -> ProvisionResult<Option<SecretMetadata>> {
        let mut state = self.lock();
        state
            .journal
            .push(JournalEntry::SecretDescribed(name.to_string()));
        if self.failures.missing_secrets.contains(name) {
            return Ok(None);
        }
        Ok(state.secrets.get(name).map(|secret| SecretMetadata {
            name: name.to_string(),
            arn: secret.arn.clone(),
            fields: secret.fields.keys().cloned().collect(),
        }))
    }

    async fn put_secret(
        &self,
        name: &str,
        fields: BTreeMap<String, SecretString>,
    ) -> ProvisionResult<SecretMetadata> {
        let mut state = self.lock();
        let arn = state
            .secrets
            .get(name)
            .map(|s| s.arn.clone())
            .unwrap_or_else(|| {
                format!("arn:memory:secretsmanager:{REGION}:secret:{name}-{}", short_id())
            });
        let metadata = SecretMetadata {
            name: name.to_string(),
            arn: arn.clone(),
            fields: fields.keys().cloned().collect(),
        };
        state
            .secrets
            .insert(name.to_string(), StoredSecret { arn, fields });
        state
            .journal
            .push(JournalEntry::SecretWritten(name.to_string()));
        Ok(metadata)
    }

    async fn read_field(&self, arn: &str, field: &str) -> ProvisionResult<SecretString> {
        let state = self.lock();
        Self::resolve_value_from(&state, &format!("{arn}:{field}::"))
    }

    async fn delete_secret(&self, arn: &str) -> ProvisionResult<()> {
        let mut state = self.lock();
        let name = state
            .secrets
            .iter()
            .find(|(_, s)| s.arn == arn)
            .map(|(name, _)| name.clone())
            .ok_or_else(|| ProvisionError::SecretNotFound(arn.to_string()))?;
        state.secrets.remove(&name);
        state.journal.push(JournalEntry::SecretDeleted(name));
        Ok(())
    }
}

#[async_trait]
impl HostedZones for InMemoryCloud {
    async fn lookup_zone(&self, domain: &DomainName) -> ProvisionResult<Option<HostedZone>> {
        let state = self.lock();
        Ok(state
            .zones
            .iter()
            .find(|(_, zone)| zone.name == *domain)
            .map(|(zone_id, zone)| HostedZone {
                zone_id: zone_id.clone(),
                name: zone.name.clone(),
            }))
    }

    async fn upsert_record(&self, zone_id: &str, record: DnsRecord) -> ProvisionResult<()> {
        let mut state = self.lock();
        let zone = state
            .zones
            .get_mut(zone_id)
            .ok_or_else(|| ProvisionError::HostedZoneNotFound(zone_id.to_string()))?;
        let entry = JournalEntry::RecordUpserted {
            zone_id: zone_id.to_string(),
            name: record.name.clone(),
            record_type: record.record_type,
        };
        zone.records.insert(record.key(), record);
        state.journal.push(entry);
        Ok(())
    }

    async fn list_records(&self, zone_id: &str) -> ProvisionResult<Vec<DnsRecord>> {
        let state = self.lock();
        state
            .zones
            .get(zone_id)
            .map(|zone| zone.records.values().cloned().collect())
            .ok_or_else(|| ProvisionError::HostedZoneNotFound(zone_id.to_string()))
    }

    async fn delete_record(
        &self,
        zone_id: &str,
        name: &str,
        record_type: RecordType,
    ) -> ProvisionResult<()> {
        let mut state = self.lock();
        let zone = state
            .zones
            .get_mut(zone_id)
            .ok_or_else(|| ProvisionError::HostedZoneNotFound(zone_id.to_string()))?;
        zone.records.remove(&(name.to_string(), record_type));
        state.journal.push(JournalEntry::RecordDeleted {
            zone_id: zone_id.to_string(),
            name: name.to_string(),
            record_type,
        });
        Ok(())
    }
}

#[async_trait]
impl CertificateAuthority for InMemoryCloud {
    async fn request_certificate(
        &self,
        domain: &DomainName,
        alternative_names: &[String],
    ) -> ProvisionResult<CertificateRequest> {
        let arn = format!("arn:memory:acm:{REGION}:certificate/{}", Uuid::now_v7());
        let token = short_id();

        // A wildcard is validated through the record of its base name.
        let validation: Vec<ValidationRecord> = std::iter::once(domain.to_string())
            .chain(alternative_names.iter().cloned())
            .map(|name| {
                let base = name.strip_prefix("*.").unwrap_or(&name).to_string();
                ValidationRecord {
                    record_name: format!("_{token}.{base}"),
                    record_value: format!("_{token}.acm-validations.aws"),
                    domain: name,
                }
            })
            .collect();

        let mut state = self.lock();
        state.certificates.insert(
            arn.clone(),
            StoredCertificate {
                validation: validation.clone(),
            },
        );
        state
            .journal
            .push(JournalEntry::CertificateRequested(arn.clone()));

        Ok(CertificateRequest {
            arn,
            validation_records: validation,
        })
    }

    async fn certificate_status(&self, arn: &str) -> ProvisionResult<CertificateStatus> {
        let state = self.lock();
        let certificate = state
            .certificates
            .get(arn)
            .ok_or_else(|| ProvisionError::Backend(format!("Unknown certificate {arn}")))?;
        if self.failures.certificates_never_validate {
            return Ok(CertificateStatus::PendingValidation);
        }

        let validated = certificate.validation.iter().all(|challenge| {
            state.zones.values().any(|zone| {
                zone.records
                    .get(&(challenge.record_name.clone(), RecordType::Cname))
                    .is_some_and(|record| {
                        record.value == RecordValue::Values(vec![challenge.record_value.clone()])
                    })
            })
        });

        Ok(if validated {
            CertificateStatus::Issued
        } else {
            CertificateStatus::PendingValidation
        })
    }

    async fn delete_certificate(&self, arn: &str) -> ProvisionResult<()> {
        let mut state = self.lock();
        state
            .certificates
            .remove(arn)
            .ok_or_else(|| ProvisionError::Backend(format!("Unknown certificate {arn}")))?;
        state
            .journal
            .push(JournalEntry::CertificateDeleted(arn.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domain() -> DomainName {
        DomainName::new("example.com").unwrap()
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_name_and_type() {
        let cloud = InMemoryCloud::new().with_hosted_zone(&domain());
        let zone = cloud.lookup_zone(&domain()).await.unwrap().unwrap();

        for ip in ["1.1.1.1", "2.2.2.2"] {
            cloud
                .upsert_record(
                    &zone.zone_id,
                    DnsRecord {
                        name: "api.example.com".into(),
                        record_type: RecordType::A,
                        value: RecordValue::Values(vec![ip.into()]),
                    },
                )
                .await
                .unwrap();
        }

        let records = cloud.list_records(&zone.zone_id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].value, RecordValue::Values(vec!["2.2.2.2".into()]));
    }

    #[tokio::test]
    async fn test_missing_secret_injection() {
        let cloud = InMemoryCloud::new()
            .with_secret("db", [("user", "admin")])
            .with_failures(FailureInjection {
                missing_secrets: BTreeSet::from(["db".to_string()]),
                ..FailureInjection::default()
            });
        assert!(cloud.describe_secret("db").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_field() {
        let cloud = InMemoryCloud::new().with_secret("db", [("user", "admin")]);
        let metadata = cloud.describe_secret("db").await.unwrap().unwrap();

        let value = cloud.read_field(&metadata.arn, "user").await.unwrap();
        assert_eq!(value.expose_secret(), "admin");
        assert!(cloud.read_field(&metadata.arn, "password").await.is_err());
    }

    #[tokio::test]
    async fn test_wildcard_shares_validation_record() {
        let cloud = InMemoryCloud::new();
        let request = cloud
            .request_certificate(&domain(), &[domain().wildcard()])
            .await
            .unwrap();

        assert_eq!(request.validation_records.len(), 2);
        assert_eq!(
            request.validation_records[0].record_name,
            request.validation_records[1].record_name
        );
        assert_eq!(
            cloud.certificate_status(&request.arn).await.unwrap(),
            CertificateStatus::PendingValidation
        );
    }
}
