// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource identity and taxonomy
//!
//! Every node of the provisioning graph carries a logical [`ResourceId`] and
//! a [`ResourceKind`]. Physical identifiers are assigned by the provider at
//! creation time and never leak into the graph itself.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::ProvisionError;

/// Logical identifier of a resource within a stack
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    /// Create a new logical id
    ///
    /// # Invariants
    /// - Non-empty
    /// - ASCII alphanumerics, `-` and `_` only
    pub fn new(id: impl Into<String>) -> Result<Self, ProvisionError> {
        let id = id.into();
        if id.is_empty() {
            return Err(ProvisionError::Validation(
                "Resource ID cannot be empty".into(),
            ));
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ProvisionError::Validation(format!(
                "Resource ID contains invalid characters: {id}"
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ResourceId {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Kind of cloud resource a descriptor stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Vpc,
    SecurityGroup,
    Secret,
    HostedZone,
    Certificate,
    DatabaseCluster,
    LogGroup,
    Cluster,
    TaskDefinition,
    Service,
    LoadBalancer,
    TargetGroup,
    Listener,
    DnsRecord,
}

impl ResourceKind {
    /// Get the canonical string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vpc => "vpc",
            Self::SecurityGroup => "security_group",
            Self::Secret => "secret",
            Self::HostedZone => "hosted_zone",
            Self::Certificate => "certificate",
            Self::DatabaseCluster => "database_cluster",
            Self::LogGroup => "log_group",
            Self::Cluster => "cluster",
            Self::TaskDefinition => "task_definition",
            Self::Service => "service",
            Self::LoadBalancer => "load_balancer",
            Self::TargetGroup => "target_group",
            Self::Listener => "listener",
            Self::DnsRecord => "dns_record",
        }
    }

    /// Short prefix used for provider-assigned physical ids
    pub fn physical_prefix(&self) -> &'static str {
        match self {
            Self::Vpc => "vpc",
            Self::SecurityGroup => "sg",
            Self::Secret => "secret",
            Self::HostedZone => "Z",
            Self::Certificate => "cert",
            Self::DatabaseCluster => "docdb",
            Self::LogGroup => "lg",
            Self::Cluster => "cluster",
            Self::TaskDefinition => "taskdef",
            Self::Service => "svc",
            Self::LoadBalancer => "alb",
            Self::TargetGroup => "tg",
            Self::Listener => "listener",
            Self::DnsRecord => "record",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What happens to a resource when its stack is torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalPolicy {
    /// Delete the resource (ephemeral environments)
    #[default]
    Destroy,
    /// Leave the resource in place
    Retain,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_id_validation() {
        assert!(ResourceId::new("DocDbSecurityGroup").is_ok());
        assert!(ResourceId::new("ecs-log_group").is_ok());
        assert!(ResourceId::new("").is_err());
        assert!(ResourceId::new("has space").is_err());
        assert!(ResourceId::new("a/b").is_err());
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ResourceKind::DatabaseCluster.to_string(), "database_cluster");
        assert_eq!(ResourceKind::DnsRecord.as_str(), "dns_record");
    }

    #[test]
    fn test_removal_policy_default_destroys() {
        assert_eq!(RemovalPolicy::default(), RemovalPolicy::Destroy);
    }
}
