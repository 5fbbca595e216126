// Copyright (c) 2025 - Cowboy AI, Inc.
//! Provisioning components
//!
//! Each component owns the resources it declares. At plan time it adds typed
//! descriptors and dependency edges to the [`ProvisioningGraph`] and returns
//! a handle whose fields are logical ids; at apply time the components that
//! talk to a provider directly (secrets, certificates, DNS) do their work
//! through the provider traits.
//!
//! [`ProvisioningGraph`]: crate::graph::ProvisioningGraph

pub mod certificate;
pub mod compute;
pub mod database;
pub mod dns;
pub mod network;
pub mod secrets;
pub mod traffic;

pub use certificate::{
    Certificate, CertificateIssuer, CertificateSpec, IssuedCertificate, ValidationMethod,
    ValidationSettings,
};
pub use compute::{
    render_task_definition, ClusterSpec, ComputeCluster, ContainerService,
    ContainerServiceOptions, EnvValue, ImageSource, LogGroupSpec, RegisteredTaskDefinition,
    ResourceLimits, ServiceSpec, TaskDefinitionSpec,
};
pub use database::{
    DatabaseCluster, DatabaseClusterSpec, DatabaseCredentials, DatabaseOptions,
    DatabaseProvisioner,
};
pub use dns::{AliasRecordSpec, DnsBinder};
pub use network::NetworkTopology;
pub use secrets::{generate_value, SecretsProvisioner};
pub use traffic::{
    HealthMonitor, ListenerSpec, LoadBalancer, LoadBalancerSpec, TargetGroupHealth,
    TargetGroupSpec, TargetType, TrafficRouter,
};
