// Copyright (c) 2025 - Cowboy AI, Inc.
//! Container compute
//!
//! Declares the service security group, cluster, log group, task definition
//! and service. A task definition holds plaintext environment values and
//! secret *references*; the provider resolves the references only when a
//! task starts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use crate::domain::{
    Ipv4Cidr, Network, ResourceId, SecretFieldRef, SecurityGroup, SubnetKind,
};
use crate::errors::{ProvisionError, ProvisionResult};
use crate::graph::{
    attributes, OutputRef, OutputTable, ProvisioningGraph, ResourceDescriptor, ResourceSpec,
};

pub const COMPUTE_SECURITY_GROUP_ID: &str = "ECSSecurityGroup";
pub const CLUSTER_ID: &str = "ECSCluster";
pub const LOG_GROUP_ID: &str = "ECSLogGroup";
pub const TASK_DEFINITION_ID: &str = "TaskDefinition";
pub const SERVICE_ID: &str = "ECSService";
pub const CONTAINER_NAME: &str = "PayloadContainer";
pub const LOG_STREAM_PREFIX: &str = "ecs";

/// Where the container image comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "location")]
pub enum ImageSource {
    /// Built from a local directory
    Asset(String),
    /// Pulled from a registry
    Registry(String),
}

impl fmt::Display for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageSource::Asset(path) => write!(f, "asset:{path}"),
            ImageSource::Registry(uri) => write!(f, "{uri}"),
        }
    }
}

/// CPU units and memory of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub cpu: u32,
    pub memory_mib: u32,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            cpu: 256,
            memory_mib: 512,
        }
    }
}

impl ResourceLimits {
    /// Fargate only accepts certain CPU/memory pairs
    pub fn validate(&self) -> ProvisionResult<()> {
        let valid = match self.cpu {
            256 => matches!(self.memory_mib, 512 | 1024 | 2048),
            512 => (1024..=4096).contains(&self.memory_mib) && self.memory_mib % 1024 == 0,
            1024 => (2048..=8192).contains(&self.memory_mib) && self.memory_mib % 1024 == 0,
            2048 => (4096..=16384).contains(&self.memory_mib) && self.memory_mib % 1024 == 0,
            4096 => (8192..=30720).contains(&self.memory_mib) && self.memory_mib % 1024 == 0,
            _ => false,
        };
        if valid {
            Ok(())
        } else {
            Err(ProvisionError::Validation(format!(
                "Unsupported CPU/memory combination: {} CPU units with {} MiB",
                self.cpu, self.memory_mib
            )))
        }
    }
}

/// Plaintext environment value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvValue {
    Plain(String),
    /// Output of another resource, resolved at apply time
    Output(OutputRef),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogGroupSpec {
    pub retention_days: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSpec {
    pub network: ResourceId,
}

/// Task definition with a single container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDefinitionSpec {
    pub container_name: String,
    pub image: ImageSource,
    pub limits: ResourceLimits,
    pub port: u16,
    pub environment: BTreeMap<String, EnvValue>,
    pub secrets: BTreeMap<String, SecretFieldRef>,
    pub log_group: ResourceId,
    pub stream_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub cluster: ResourceId,
    pub task_definition: ResourceId,
    pub security_group: ResourceId,
    pub subnets: Vec<Ipv4Cidr>,
    pub assign_public_ip: bool,
    pub desired_count: u32,
    /// Target group the service registers its tasks with
    pub target_group: Option<ResourceId>,
}

/// Everything a container service needs besides its network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerServiceOptions {
    pub image: ImageSource,
    pub limits: ResourceLimits,
    pub port: u16,
    pub environment: BTreeMap<String, EnvValue>,
    pub secrets: BTreeMap<String, SecretFieldRef>,
    pub desired_count: u32,
    pub log_retention_days: u32,
    /// Resources the service must wait for beyond its own wiring
    pub depends_on: Vec<ResourceId>,
}

/// Plan-time handle to the deployed service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerService {
    pub cluster: ResourceId,
    pub log_group: ResourceId,
    pub task_definition: ResourceId,
    pub service: ResourceId,
    pub security_group: ResourceId,
    pub port: u16,
}

/// Task definition as registered with the provider
///
/// `secrets` maps a variable name to a `valueFrom` reference; the value
/// itself is never part of the definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredTaskDefinition {
    pub family: String,
    pub container_name: String,
    pub image: String,
    pub cpu: u32,
    pub memory_mib: u32,
    pub port_mappings: Vec<u16>,
    pub environment: BTreeMap<String, String>,
    pub secrets: BTreeMap<String, String>,
    pub log_group: String,
    pub stream_prefix: String,
}

pub struct ComputeCluster;

impl ComputeCluster {
    /// Declare the service security group
    ///
    /// Created ahead of the service so the database can authorize it.
    pub fn security_group(
        graph: &mut ProvisioningGraph,
        network: &Network,
    ) -> ProvisionResult<ResourceId> {
        let id = ResourceId::new(COMPUTE_SECURITY_GROUP_ID)?;
        graph.add_resource(ResourceDescriptor::new(
            id.clone(),
            ResourceSpec::SecurityGroup(SecurityGroup::new(
                id.clone(),
                network.id.clone(),
                "Security group for the backend service",
            )),
        ))?;
        graph.add_dependency(&id, &network.id)?;
        Ok(id)
    }

    /// Declare cluster, log group, task definition and service
    pub fn deploy(
        graph: &mut ProvisioningGraph,
        network: &Network,
        options: ContainerServiceOptions,
        security_group: &ResourceId,
    ) -> ProvisionResult<ContainerService> {
        options.limits.validate()?;
        if let Some(key) = options
            .environment
            .keys()
            .find(|k| options.secrets.contains_key(*k))
        {
            return Err(ProvisionError::Validation(format!(
                "{key} is set both as plaintext environment and as a secret"
            )));
        }
        let subnets: Vec<Ipv4Cidr> = network
            .subnets_of(SubnetKind::Public)
            .iter()
            .map(|s| s.cidr)
            .collect();
        if subnets.is_empty() {
            return Err(ProvisionError::Validation(format!(
                "Network {} has no public subnets for the service",
                network.id
            )));
        }

        let cluster = graph.add_resource(ResourceDescriptor::new(
            ResourceId::new(CLUSTER_ID)?,
            ResourceSpec::Cluster(ClusterSpec {
                network: network.id.clone(),
            }),
        ))?;
        graph.add_dependency(&cluster, &network.id)?;

        let log_group = graph.add_resource(ResourceDescriptor::new(
            ResourceId::new(LOG_GROUP_ID)?,
            ResourceSpec::LogGroup(LogGroupSpec {
                retention_days: options.log_retention_days,
            }),
        ))?;

        let referenced: Vec<ResourceId> = options
            .secrets
            .values()
            .map(|f| f.secret().resource().clone())
            .chain(options.environment.values().filter_map(|v| match v {
                EnvValue::Output(output) => Some(output.resource.clone()),
                EnvValue::Plain(_) => None,
            }))
            .collect();

        let task_definition = graph.add_resource(ResourceDescriptor::new(
            ResourceId::new(TASK_DEFINITION_ID)?,
            ResourceSpec::TaskDefinition(TaskDefinitionSpec {
                container_name: CONTAINER_NAME.to_string(),
                image: options.image,
                limits: options.limits,
                port: options.port,
                environment: options.environment,
                secrets: options.secrets,
                log_group: log_group.clone(),
                stream_prefix: LOG_STREAM_PREFIX.to_string(),
            }),
        ))?;
        graph.add_dependency(&task_definition, &log_group)?;
        for resource in &referenced {
            graph.add_dependency(&task_definition, resource)?;
        }

        let service = graph.add_resource(ResourceDescriptor::new(
            ResourceId::new(SERVICE_ID)?,
            ResourceSpec::Service(ServiceSpec {
                cluster: cluster.clone(),
                task_definition: task_definition.clone(),
                security_group: security_group.clone(),
                subnets,
                assign_public_ip: true,
                desired_count: options.desired_count,
                target_group: None,
            }),
        ))?;
        for dependency in [&cluster, &task_definition, security_group]
            .into_iter()
            .chain(options.depends_on.iter())
        {
            graph.add_dependency(&service, dependency)?;
        }
        debug!(
            "Declared service {} with {} referenced resources",
            service,
            referenced.len()
        );

        Ok(ContainerService {
            cluster,
            log_group,
            task_definition,
            service,
            security_group: security_group.clone(),
            port: options.port,
        })
    }
}

/// Render a task definition for registration
///
/// Output references are replaced by their values; secret references become
/// `valueFrom` strings pointing at the secret's ARN.
pub fn render_task_definition(
    family: &str,
    spec: &TaskDefinitionSpec,
    outputs: &OutputTable,
) -> ProvisionResult<RegisteredTaskDefinition> {
    let environment = spec
        .environment
        .iter()
        .map(|(key, value)| {
            let value = match value {
                EnvValue::Plain(plain) => plain.clone(),
                EnvValue::Output(output) => outputs.resolve(output)?.to_string(),
            };
            Ok((key.clone(), value))
        })
        .collect::<ProvisionResult<BTreeMap<_, _>>>()?;

    let secrets = spec
        .secrets
        .iter()
        .map(|(key, field)| {
            let arn = outputs.attribute(field.secret().resource(), attributes::SECRET_ARN)?;
            Ok((key.clone(), field.value_from(arn)))
        })
        .collect::<ProvisionResult<BTreeMap<_, _>>>()?;

    Ok(RegisteredTaskDefinition {
        family: family.to_string(),
        container_name: spec.container_name.clone(),
        image: spec.image.to_string(),
        cpu: spec.limits.cpu,
        memory_mib: spec.limits.memory_mib,
        port_mappings: vec![spec.port],
        environment,
        secrets,
        log_group: outputs
            .attribute(&spec.log_group, attributes::LOG_GROUP_NAME)?
            .to_string(),
        stream_prefix: spec.stream_prefix.clone(),
    })
}
