// Copyright (c) 2025 - Cowboy AI, Inc.
//! Typed resource descriptors
//!
//! A [`ResourceDescriptor`] is one node of the provisioning graph: a logical
//! id, a typed [`ResourceSpec`] and a removal policy. Values that only exist
//! after another resource is created are expressed as [`OutputRef`]s and
//! resolved against an [`OutputTable`] at apply time.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::domain::{
    DomainName, Network, RemovalPolicy, ResourceId, ResourceKind, SecretDefinition,
    SecurityGroup,
};
use crate::errors::{ProvisionError, ProvisionResult};
use crate::provision::{
    AliasRecordSpec, CertificateSpec, ClusterSpec, DatabaseClusterSpec, ListenerSpec,
    LoadBalancerSpec, LogGroupSpec, ServiceSpec, TargetGroupSpec, TaskDefinitionSpec,
};

/// Output attribute names published by providers
pub mod attributes {
    pub const VPC_ID: &str = "vpcId";
    pub const GROUP_ID: &str = "groupId";
    pub const SECRET_ARN: &str = "secretArn";
    pub const HOSTED_ZONE_ID: &str = "hostedZoneId";
    pub const ZONE_NAME: &str = "zoneName";
    pub const CERTIFICATE_ARN: &str = "certificateArn";
    pub const ENDPOINT_HOSTNAME: &str = "endpoint.hostname";
    pub const ENDPOINT_PORT: &str = "endpoint.port";
    pub const LOG_GROUP_NAME: &str = "logGroupName";
    pub const CLUSTER_ARN: &str = "clusterArn";
    pub const TASK_DEFINITION_ARN: &str = "taskDefinitionArn";
    pub const SERVICE_ARN: &str = "serviceArn";
    pub const DNS_NAME: &str = "dnsName";
    pub const CANONICAL_HOSTED_ZONE_ID: &str = "canonicalHostedZoneId";
    pub const TARGET_GROUP_ARN: &str = "targetGroupArn";
    pub const LISTENER_ARN: &str = "listenerArn";
    pub const FQDN: &str = "fqdn";
}

/// Hosted zone looked up by domain name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostedZoneLookup {
    pub domain: DomainName,
}

/// Typed specification of a resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "spec")]
pub enum ResourceSpec {
    Vpc(Network),
    SecurityGroup(SecurityGroup),
    Secret(SecretDefinition),
    HostedZone(HostedZoneLookup),
    Certificate(CertificateSpec),
    DatabaseCluster(DatabaseClusterSpec),
    LogGroup(LogGroupSpec),
    Cluster(ClusterSpec),
    TaskDefinition(TaskDefinitionSpec),
    Service(ServiceSpec),
    LoadBalancer(LoadBalancerSpec),
    TargetGroup(TargetGroupSpec),
    Listener(ListenerSpec),
    DnsRecord(AliasRecordSpec),
}

impl ResourceSpec {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceSpec::Vpc(_) => ResourceKind::Vpc,
            ResourceSpec::SecurityGroup(_) => ResourceKind::SecurityGroup,
            ResourceSpec::Secret(_) => ResourceKind::Secret,
            ResourceSpec::HostedZone(_) => ResourceKind::HostedZone,
            ResourceSpec::Certificate(_) => ResourceKind::Certificate,
            ResourceSpec::DatabaseCluster(_) => ResourceKind::DatabaseCluster,
            ResourceSpec::LogGroup(_) => ResourceKind::LogGroup,
            ResourceSpec::Cluster(_) => ResourceKind::Cluster,
            ResourceSpec::TaskDefinition(_) => ResourceKind::TaskDefinition,
            ResourceSpec::Service(_) => ResourceKind::Service,
            ResourceSpec::LoadBalancer(_) => ResourceKind::LoadBalancer,
            ResourceSpec::TargetGroup(_) => ResourceKind::TargetGroup,
            ResourceSpec::Listener(_) => ResourceKind::Listener,
            ResourceSpec::DnsRecord(_) => ResourceKind::DnsRecord,
        }
    }

    /// Imported resources are looked up, never created or deleted
    pub fn is_imported(&self) -> bool {
        match self {
            ResourceSpec::HostedZone(_) => true,
            ResourceSpec::Secret(definition) => definition.is_external(),
            _ => false,
        }
    }
}

/// Node of the provisioning graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub id: ResourceId,
    pub spec: ResourceSpec,
    pub removal_policy: RemovalPolicy,
}

impl ResourceDescriptor {
    pub fn new(id: ResourceId, spec: ResourceSpec) -> Self {
        Self {
            id,
            spec,
            removal_policy: RemovalPolicy::default(),
        }
    }

    pub fn with_removal_policy(mut self, policy: RemovalPolicy) -> Self {
        self.removal_policy = policy;
        self
    }

    pub fn kind(&self) -> ResourceKind {
        self.spec.kind()
    }

    pub fn is_imported(&self) -> bool {
        self.spec.is_imported()
    }
}

impl fmt::Display for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.kind())
    }
}

/// Reference to an output attribute of another resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputRef {
    pub resource: ResourceId,
    pub attribute: String,
}

impl OutputRef {
    pub fn new(resource: ResourceId, attribute: impl Into<String>) -> Self {
        Self {
            resource,
            attribute: attribute.into(),
        }
    }
}

impl fmt::Display for OutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource, self.attribute)
    }
}

/// Attribute values of a created resource
pub type ResourceOutputs = BTreeMap<String, String>;

/// Outputs of every resource created so far
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputTable {
    values: BTreeMap<ResourceId, ResourceOutputs>,
}

impl OutputTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, resource: ResourceId, outputs: ResourceOutputs) {
        self.values.insert(resource, outputs);
    }

    pub fn remove(&mut self, resource: &ResourceId) -> Option<ResourceOutputs> {
        self.values.remove(resource)
    }

    pub fn outputs_of(&self, resource: &ResourceId) -> Option<&ResourceOutputs> {
        self.values.get(resource)
    }

    /// Resolve a reference, failing if the resource or attribute is unknown
    pub fn resolve(&self, reference: &OutputRef) -> ProvisionResult<&str> {
        self.values
            .get(&reference.resource)
            .and_then(|outputs| outputs.get(&reference.attribute))
            .map(String::as_str)
            .ok_or_else(|| ProvisionError::OutputUnavailable {
                resource: reference.resource.clone(),
                attribute: reference.attribute.clone(),
            })
    }

    /// Shorthand for `resolve(&OutputRef::new(resource, attribute))`
    pub fn attribute(&self, resource: &ResourceId, attribute: &str) -> ProvisionResult<&str> {
        self.resolve(&OutputRef::new(resource.clone(), attribute))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_table_resolution() {
        let db = ResourceId::new("DocDb").unwrap();
        let mut table = OutputTable::new();
        table.insert(
            db.clone(),
            ResourceOutputs::from([(
                attributes::ENDPOINT_HOSTNAME.to_string(),
                "docdb.cluster.local".to_string(),
            )]),
        );

        let hostname = OutputRef::new(db.clone(), attributes::ENDPOINT_HOSTNAME);
        assert_eq!(table.resolve(&hostname).unwrap(), "docdb.cluster.local");

        let missing = OutputRef::new(db, attributes::ENDPOINT_PORT);
        assert!(matches!(
            table.resolve(&missing),
            Err(ProvisionError::OutputUnavailable { .. })
        ));
    }

    #[test]
    fn test_imported_specs() {
        let zone = ResourceSpec::HostedZone(HostedZoneLookup {
            domain: DomainName::new("example.com").unwrap(),
        });
        assert!(zone.is_imported());
        assert_eq!(zone.kind(), ResourceKind::HostedZone);
    }
}
