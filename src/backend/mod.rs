// Copyright (c) 2025 - Cowboy AI, Inc.
//! Cloud provider boundary
//!
//! Everything the provisioning code needs from a cloud account is expressed
//! by four traits:
//!
//! - [`CloudBackend`]: create and delete generic resources
//! - [`SecretStore`]: look up, write and read JSON secrets
//! - [`HostedZones`]: hosted zone lookup and record UPSERTs
//! - [`CertificateAuthority`]: certificate requests and validation status
//!
//! [`CloudProvider`] is implemented for every type that implements all four.
//! Components take the narrowest trait they need; the deployer holds an
//! `Arc<P: CloudProvider>`.

pub mod memory;

pub use memory::{FailureInjection, InMemoryCloud, JournalEntry, RunningTask};

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::domain::DomainName;
use crate::errors::ProvisionResult;
use crate::graph::{OutputTable, ResourceDescriptor, ResourceOutputs};

/// Result of creating a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionedResource {
    /// Provider-assigned identifier (ARN, id or name)
    pub physical_id: String,
    pub outputs: ResourceOutputs,
}

impl ProvisionedResource {
    pub fn new(physical_id: impl Into<String>) -> Self {
        Self {
            physical_id: physical_id.into(),
            outputs: ResourceOutputs::new(),
        }
    }

    pub fn with_output(mut self, attribute: &str, value: impl Into<String>) -> Self {
        self.outputs.insert(attribute.to_string(), value.into());
        self
    }
}

/// Generic resource lifecycle operations
#[async_trait]
pub trait CloudBackend: Send + Sync {
    /// Create a resource; `outputs` holds every resource created before it
    async fn create(
        &self,
        descriptor: &ResourceDescriptor,
        outputs: &OutputTable,
    ) -> ProvisionResult<ProvisionedResource>;

    async fn delete(&self, descriptor: &ResourceDescriptor, physical_id: &str)
        -> ProvisionResult<()>;
}

/// Metadata of a stored secret; never carries the value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretMetadata {
    pub name: String,
    pub arn: String,
    pub fields: BTreeSet<String>,
}

/// JSON secret storage
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Look up a secret by name; `None` when it does not exist
    async fn describe_secret(&self, name: &str) -> ProvisionResult<Option<SecretMetadata>>;

    /// Create or overwrite a secret
    async fn put_secret(
        &self,
        name: &str,
        fields: BTreeMap<String, SecretString>,
    ) -> ProvisionResult<SecretMetadata>;

    /// Read one field of a secret
    async fn read_field(&self, arn: &str, field: &str) -> ProvisionResult<SecretString>;

    async fn delete_secret(&self, arn: &str) -> ProvisionResult<()>;
}

/// Public hosted zone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostedZone {
    pub zone_id: String,
    pub name: DomainName,
}

/// DNS record type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RecordType {
    A,
    #[serde(rename = "CNAME")]
    Cname,
    #[serde(rename = "TXT")]
    Txt,
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordType::A => write!(f, "A"),
            RecordType::Cname => write!(f, "CNAME"),
            RecordType::Txt => write!(f, "TXT"),
        }
    }
}

/// Alias target of an A record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AliasTarget {
    pub dns_name: String,
    pub hosted_zone_id: String,
}

/// Record data
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordValue {
    Alias(AliasTarget),
    Values(Vec<String>),
}

/// Record set, unique per zone by `(name, record_type)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DnsRecord {
    pub name: String,
    pub record_type: RecordType,
    pub value: RecordValue,
}

impl DnsRecord {
    pub fn key(&self) -> (String, RecordType) {
        (self.name.clone(), self.record_type)
    }
}

/// Hosted zone operations
#[async_trait]
pub trait HostedZones: Send + Sync {
    async fn lookup_zone(&self, domain: &DomainName) -> ProvisionResult<Option<HostedZone>>;

    /// Create the record or replace the one with the same name and type
    async fn upsert_record(&self, zone_id: &str, record: DnsRecord) -> ProvisionResult<()>;

    async fn list_records(&self, zone_id: &str) -> ProvisionResult<Vec<DnsRecord>>;

    async fn delete_record(
        &self,
        zone_id: &str,
        name: &str,
        record_type: RecordType,
    ) -> ProvisionResult<()>;
}

/// DNS challenge the authority expects to find in the zone
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValidationRecord {
    /// Name being validated
    pub domain: String,
    pub record_name: String,
    pub record_value: String,
}

/// Accepted certificate request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRequest {
    pub arn: String,
    pub validation_records: Vec<ValidationRecord>,
}

/// Issuance status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CertificateStatus {
    PendingValidation,
    Issued,
    Failed(String),
}

/// Certificate issuance
#[async_trait]
pub trait CertificateAuthority: Send + Sync {
    async fn request_certificate(
        &self,
        domain: &DomainName,
        alternative_names: &[String],
    ) -> ProvisionResult<CertificateRequest>;

    async fn certificate_status(&self, arn: &str) -> ProvisionResult<CertificateStatus>;

    async fn delete_certificate(&self, arn: &str) -> ProvisionResult<()>;
}

/// Everything a deployment needs from a cloud account
pub trait CloudProvider: CloudBackend + SecretStore + HostedZones + CertificateAuthority {}

impl<T> CloudProvider for T where
    T: CloudBackend + SecretStore + HostedZones + CertificateAuthority + ?Sized
{
}
