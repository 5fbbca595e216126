// Copyright (c) 2025 - Cowboy AI, Inc.
//! Provisioning Domain Models
//!
//! Value objects shared by every provisioning component. All of them validate
//! on construction so an invalid CIDR, domain name or logical id is rejected
//! during synthesis, before any resource is created.
//!
//! # Value Objects with Invariants
//!
//! - [`ResourceId`] - Logical resource identifier
//! - [`DomainName`] - DNS-validated domain names (RFC 1123)
//! - [`Ipv4Cidr`] - Aligned IPv4 blocks
//! - [`SecurityGroup`] / [`IngressRule`] - Peer-scoped allow lists
//! - [`SecretRef`] / [`SecretFieldRef`] - Opaque secret handles

pub mod hostname;
pub mod network;
pub mod resource;
pub mod secret;
pub mod security_group;

pub use hostname::{DomainName, DomainNameError};
pub use network::{
    Ipv4Cidr, Network, NetworkError, Route, RouteTarget, Subnet, SubnetKind, SubnetSpec,
};
pub use resource::{RemovalPolicy, ResourceId, ResourceKind};
pub use secret::{GenerationPolicy, SecretDefinition, SecretFieldRef, SecretRef, SecretSchema};
pub use security_group::{IngressRule, Peer, Protocol, SecurityGroup};
