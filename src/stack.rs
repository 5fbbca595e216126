// Copyright (c) 2025 - Cowboy AI, Inc.
//! Stack synthesis
//!
//! Builds the complete provisioning graph of the backend from a
//! [`StackConfig`]:
//!
//! ```text
//! VPC ─┬─ ECSSecurityGroup ─┬─ DocumentDBSecurityGroup ── DocDB ─┐
//!      │                    └───────────────────────────────────┤
//! HostedZone ── Certificate ── Listener ── ECSService ◄─────────┘
//!      └──────────────────────────────────── BackendPayloadARecord
//! ```
//!
//! Synthesis is pure: every validation failure (bad CIDR, exhausted address
//! space, duplicate ids, cycles) surfaces here, before a provider is touched.

use std::collections::BTreeMap;
use tracing::info;

use crate::config::StackConfig;
use crate::domain::{DomainName, GenerationPolicy, Network, ResourceId, SecretSchema};
use crate::errors::ProvisionResult;
use crate::graph::{HostedZoneLookup, OutputRef, ProvisioningGraph, ResourceDescriptor, ResourceSpec};
use crate::provision::{
    Certificate, CertificateIssuer, ComputeCluster, ContainerService, ContainerServiceOptions,
    DatabaseCluster, DatabaseCredentials, DatabaseProvisioner, DnsBinder, EnvValue,
    LoadBalancer, NetworkTopology, SecretsProvisioner, TrafficRouter,
};

pub const VPC_ID: &str = "VPC";
pub const HOSTED_ZONE_ID: &str = "HostedZone";
pub const CERTIFICATE_ID: &str = "Certificate";
pub const CREDENTIALS_SECRET_ID: &str = "DocDBCredentials";
pub const PAYLOAD_SECRET_ID: &str = "PayloadSecret";

/// Name of the stack output carrying the load balancer DNS name
pub const BACKEND_URL_OUTPUT: &str = "BackendPayloadURL";

/// Synthesized stack
#[derive(Debug, Clone)]
pub struct Stack {
    pub graph: ProvisioningGraph,
    /// Named outputs resolved after a deployment
    pub outputs: BTreeMap<String, OutputRef>,
    pub fqdn: DomainName,
    pub network: Network,
    pub certificate: Certificate,
    pub database: Option<DatabaseCluster>,
    pub service: ContainerService,
    pub load_balancer: LoadBalancer,
}

pub struct StackBuilder {
    config: StackConfig,
}

impl StackBuilder {
    pub fn new(config: StackConfig) -> Self {
        Self { config }
    }

    /// Build and validate the provisioning graph
    pub fn synth(self) -> ProvisionResult<Stack> {
        let config = &self.config;
        config.validate()?;
        let mut graph = ProvisioningGraph::new();

        let network = NetworkTopology::allocate(
            ResourceId::new(VPC_ID)?,
            config.network.cidr,
            &config.network.subnets,
            &config.network.availability_zones,
        )?;
        NetworkTopology::declare(&mut graph, &network)?;

        let hosted_zone = graph.add_resource(ResourceDescriptor::new(
            ResourceId::new(HOSTED_ZONE_ID)?,
            ResourceSpec::HostedZone(HostedZoneLookup {
                domain: config.domain_name.clone(),
            }),
        ))?;
        let certificate = CertificateIssuer::declare(
            &mut graph,
            ResourceId::new(CERTIFICATE_ID)?,
            &config.domain_name,
            &hosted_zone,
        )?;

        let secrets = &config.secrets;
        let credentials = SecretsProvisioner::import(
            &mut graph,
            ResourceId::new(CREDENTIALS_SECRET_ID)?,
            &secrets.credentials_name,
            SecretSchema::new([&secrets.username_field, &secrets.password_field]),
        )?;
        let payload_secret = SecretsProvisioner::declare_generated(
            &mut graph,
            ResourceId::new(PAYLOAD_SECRET_ID)?,
            &secrets.payload_secret_name,
            GenerationPolicy::Random {
                key: secrets.payload_secret_key.clone(),
                length: secrets.payload_secret_length,
                excluded_characters: secrets.payload_secret_excluded.clone(),
            },
        )?;

        let compute_sg = ComputeCluster::security_group(&mut graph, &network)?;

        let database = if config.database.enabled {
            Some(DatabaseProvisioner::create_cluster(
                &mut graph,
                &network,
                DatabaseCredentials {
                    secret: &credentials,
                    username_field: &secrets.username_field,
                    password_field: &secrets.password_field,
                },
                &compute_sg,
                &config.database.options,
            )?)
        } else {
            None
        };

        let mut environment = BTreeMap::new();
        if let Some(db) = &database {
            environment.insert("DB_HOST".to_string(), EnvValue::Output(db.endpoint_hostname()));
        }
        if let Some(node_env) = &config.service.node_env {
            environment.insert("NODE_ENV".to_string(), EnvValue::Plain(node_env.clone()));
        }

        let injected = BTreeMap::from([
            (
                "PAYLOAD_SECRET".to_string(),
                payload_secret.field(&secrets.payload_secret_key),
            ),
            (
                "DB_USERNAME".to_string(),
                credentials.field(&secrets.username_field),
            ),
            (
                "DB_PASSWORD".to_string(),
                credentials.field(&secrets.password_field),
            ),
        ]);

        let service = ComputeCluster::deploy(
            &mut graph,
            &network,
            ContainerServiceOptions {
                image: config.service.image.clone(),
                limits: config.service.limits,
                port: config.service.port,
                environment,
                secrets: injected,
                desired_count: config.service.desired_count,
                log_retention_days: config.service.log_retention_days,
                depends_on: database.iter().map(|db| db.id.clone()).collect(),
            },
            &compute_sg,
        )?;

        let load_balancer = TrafficRouter::route(
            &mut graph,
            &network,
            &certificate,
            &service,
            config.health_check.clone(),
        )?;

        let fqdn = DnsBinder::declare(
            &mut graph,
            &hosted_zone,
            &config.backend_subdomain,
            &config.domain_name,
            &load_balancer,
        )?;

        graph.validate()?;
        info!(
            "Synthesized stack for {} with {} resources",
            fqdn,
            graph.len()
        );

        Ok(Stack {
            graph,
            outputs: BTreeMap::from([(BACKEND_URL_OUTPUT.to_string(), load_balancer.dns_name())]),
            fqdn,
            network,
            certificate,
            database,
            service,
            load_balancer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Peer, ResourceKind};

    fn config() -> StackConfig {
        StackConfig::new(DomainName::new("example.com").unwrap(), "api")
    }

    #[test]
    fn test_synth_declares_every_component() {
        let stack = StackBuilder::new(config()).synth().unwrap();
        let kinds: Vec<ResourceKind> = stack.graph.descriptors().map(|d| d.kind()).collect();

        for kind in [
            ResourceKind::Vpc,
            ResourceKind::HostedZone,
            ResourceKind::Certificate,
            ResourceKind::Secret,
            ResourceKind::DatabaseCluster,
            ResourceKind::TaskDefinition,
            ResourceKind::Service,
            ResourceKind::LoadBalancer,
            ResourceKind::Listener,
            ResourceKind::DnsRecord,
        ] {
            assert!(kinds.contains(&kind), "missing {kind}");
        }
        assert_eq!(stack.fqdn.as_str(), "api.example.com");
        assert!(stack.outputs.contains_key(BACKEND_URL_OUTPUT));
    }

    #[test]
    fn test_service_waits_for_database() {
        let stack = StackBuilder::new(config()).synth().unwrap();
        let db = stack.database.as_ref().unwrap();

        let order = stack.graph.creation_order().unwrap();
        let position = |id: &ResourceId| order.iter().position(|o| *o == id).unwrap();
        assert!(position(&db.id) < position(&stack.service.service));
    }

    #[test]
    fn test_without_database_no_db_host() {
        let mut config = config();
        config.database.enabled = false;
        let stack = StackBuilder::new(config).synth().unwrap();

        assert!(stack.database.is_none());
        let Some(ResourceSpec::TaskDefinition(spec)) = stack
            .graph
            .get(&stack.service.task_definition)
            .map(|d| &d.spec)
        else {
            panic!("task definition missing");
        };
        assert!(!spec.environment.contains_key("DB_HOST"));
        assert_eq!(spec.secrets.len(), 3);
    }

    #[test]
    fn test_service_admits_only_load_balancer() {
        let stack = StackBuilder::new(config()).synth().unwrap();
        let Some(ResourceSpec::SecurityGroup(sg)) = stack
            .graph
            .get(&stack.service.security_group)
            .map(|d| &d.spec)
        else {
            panic!("compute security group missing");
        };

        assert_eq!(sg.ingress.len(), 1);
        assert_eq!(
            sg.ingress[0].peer,
            Peer::SecurityGroup(stack.load_balancer.security_group.clone())
        );
        assert_eq!(sg.ingress[0].port, 3000);
    }
}
