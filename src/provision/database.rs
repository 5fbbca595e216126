// Copyright (c) 2025 - Cowboy AI, Inc.
//! Managed document database
//!
//! The cluster lives in the private-isolated subnets behind its own security
//! group. That group admits exactly one peer (the compute security group) on
//! the database port. Credentials are passed as secret field references; the
//! endpoint hostname is the only value that reaches the container as
//! plaintext.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{
    IngressRule, Ipv4Cidr, Network, Peer, RemovalPolicy, ResourceId, SecretFieldRef, SecretRef,
    SecurityGroup, SubnetKind,
};
use crate::errors::{ProvisionError, ProvisionResult};
use crate::graph::{attributes, OutputRef, ProvisioningGraph, ResourceDescriptor, ResourceSpec};

pub const DATABASE_SECURITY_GROUP_ID: &str = "DocumentDBSecurityGroup";
pub const DATABASE_CLUSTER_ID: &str = "DocDB";
pub const DATABASE_INGRESS_DESCRIPTION: &str = "Allow DocumentDB traffic from ECS";

/// Tunables of the cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseOptions {
    pub instance_class: String,
    pub instances: u32,
    pub port: u16,
    pub tls: bool,
    pub removal_policy: RemovalPolicy,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            instance_class: "db.t3.medium".to_string(),
            instances: 1,
            port: 27017,
            tls: true,
            removal_policy: RemovalPolicy::Destroy,
        }
    }
}

/// Cluster definition stored in the graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseClusterSpec {
    pub network: ResourceId,
    pub subnets: Vec<Ipv4Cidr>,
    pub security_group: ResourceId,
    pub master_username: SecretFieldRef,
    pub master_password: SecretFieldRef,
    pub instance_class: String,
    pub instances: u32,
    pub port: u16,
    pub tls: bool,
}

/// Plan-time handle to the cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseCluster {
    pub id: ResourceId,
    pub security_group: ResourceId,
    pub port: u16,
    pub master_username: SecretFieldRef,
    pub master_password: SecretFieldRef,
}

impl DatabaseCluster {
    /// Endpoint hostname, resolved at apply time
    pub fn endpoint_hostname(&self) -> OutputRef {
        OutputRef::new(self.id.clone(), attributes::ENDPOINT_HOSTNAME)
    }
}

/// Credential fields of the pre-created secret
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseCredentials<'a> {
    pub secret: &'a SecretRef,
    pub username_field: &'a str,
    pub password_field: &'a str,
}

pub struct DatabaseProvisioner;

impl DatabaseProvisioner {
    /// Declare the cluster, its security group and the single ingress rule
    pub fn create_cluster(
        graph: &mut ProvisioningGraph,
        network: &Network,
        credentials: DatabaseCredentials<'_>,
        peer_security_group: &ResourceId,
        options: &DatabaseOptions,
    ) -> ProvisionResult<DatabaseCluster> {
        let subnets: Vec<Ipv4Cidr> = network
            .subnets_of(SubnetKind::PrivateIsolated)
            .iter()
            .map(|s| s.cidr)
            .collect();
        if subnets.is_empty() {
            return Err(ProvisionError::Validation(format!(
                "Network {} has no private-isolated subnets for the database",
                network.id
            )));
        }
        if options.instances == 0 {
            return Err(ProvisionError::Validation(
                "Database cluster needs at least one instance".into(),
            ));
        }
        Self::check_credentials(graph, &credentials)?;

        let sg_id = ResourceId::new(DATABASE_SECURITY_GROUP_ID)?;
        graph.add_resource(ResourceDescriptor::new(
            sg_id.clone(),
            ResourceSpec::SecurityGroup(SecurityGroup::new(
                sg_id.clone(),
                network.id.clone(),
                "DocumentDB security group",
            )),
        ))?;
        graph.add_dependency(&sg_id, &network.id)?;
        graph.add_ingress_rule(
            &sg_id,
            IngressRule::tcp(
                Peer::SecurityGroup(peer_security_group.clone()),
                options.port,
                DATABASE_INGRESS_DESCRIPTION,
            ),
        )?;

        let master_username = credentials.secret.field(credentials.username_field);
        let master_password = credentials.secret.field(credentials.password_field);

        let id = ResourceId::new(DATABASE_CLUSTER_ID)?;
        graph.add_resource(
            ResourceDescriptor::new(
                id.clone(),
                ResourceSpec::DatabaseCluster(DatabaseClusterSpec {
                    network: network.id.clone(),
                    subnets,
                    security_group: sg_id.clone(),
                    master_username: master_username.clone(),
                    master_password: master_password.clone(),
                    instance_class: options.instance_class.clone(),
                    instances: options.instances,
                    port: options.port,
                    tls: options.tls,
                }),
            )
            .with_removal_policy(options.removal_policy),
        )?;
        for dependency in [&network.id, &sg_id, credentials.secret.resource()] {
            graph.add_dependency(&id, dependency)?;
        }
        debug!("Declared database cluster {} on port {}", id, options.port);

        Ok(DatabaseCluster {
            id,
            security_group: sg_id,
            port: options.port,
            master_username,
            master_password,
        })
    }

    fn check_credentials(
        graph: &ProvisioningGraph,
        credentials: &DatabaseCredentials<'_>,
    ) -> ProvisionResult<()> {
        let Some(descriptor) = graph.get(credentials.secret.resource()) else {
            return Err(ProvisionError::MissingDependency {
                resource: ResourceId::new(DATABASE_CLUSTER_ID)?,
                dependency: credentials.secret.resource().clone(),
            });
        };
        if let ResourceSpec::Secret(definition) = &descriptor.spec {
            for field in [credentials.username_field, credentials.password_field] {
                if !definition.schema.contains(field) {
                    return Err(ProvisionError::Validation(format!(
                        "Secret {} does not declare field {}",
                        credentials.secret.name(),
                        field
                    )));
                }
            }
        }
        Ok(())
    }
}
