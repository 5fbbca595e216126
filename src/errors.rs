// Copyright (c) 2025 - Cowboy AI, Inc.
//! Error types for provisioning operations

use std::time::Duration;

use thiserror::Error;

use crate::domain::{DomainNameError, NetworkError, ResourceId};
use crate::state_machine::TransitionError;

/// Errors that can occur while synthesizing, applying or tearing down a stack
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Network value object or allocation error
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Domain name validation error
    #[error("Domain name error: {0}")]
    DomainName(#[from] DomainNameError),

    /// A resource definition violates a provisioning rule
    #[error("Validation error: {0}")]
    Validation(String),

    /// Two resources share a logical id
    #[error("Duplicate resource: {0}")]
    DuplicateResource(ResourceId),

    /// An edge references a resource that is not in the graph yet
    #[error("Resource {resource} depends on {dependency}, which is not in the graph")]
    MissingDependency {
        resource: ResourceId,
        dependency: ResourceId,
    },

    /// The graph is not acyclic
    #[error("Dependency cycle involving: {0:?}")]
    DependencyCycle(Vec<ResourceId>),

    /// A secret expected to exist out-of-band is absent from the store
    #[error("Secret not found: {0} (it must be created in the secret store before provisioning)")]
    SecretNotFound(String),

    /// A hosted zone lookup returned nothing
    #[error("Hosted zone not found for domain: {0}")]
    HostedZoneNotFound(String),

    /// DNS challenge validation did not complete in time
    #[error("Certificate validation for {domain} timed out after {waited:?}")]
    CertificateValidationTimeout { domain: String, waited: Duration },

    /// The certificate authority rejected the request
    #[error("Certificate validation failed for {domain}: {reason}")]
    CertificateValidationFailed { domain: String, reason: String },

    /// An output referenced by another resource has not been produced
    #[error("Output {attribute} of {resource} is not available")]
    OutputUnavailable {
        resource: ResourceId,
        attribute: String,
    },

    /// A resource was driven through an invalid lifecycle transition
    #[error("Lifecycle error for {resource}: {source}")]
    Lifecycle {
        resource: ResourceId,
        source: TransitionError,
    },

    /// Provider-side failure
    #[error("Backend error: {0}")]
    Backend(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// NATS connection error
    #[error("NATS connection error: {0}")]
    NatsConnection(String),

    /// NATS publish error
    #[error("NATS publish error: {0}")]
    NatsPublish(String),
}

/// Result type for provisioning operations
pub type ProvisionResult<T> = Result<T, ProvisionError>;

impl From<serde_json::Error> for ProvisionError {
    fn from(err: serde_json::Error) -> Self {
        ProvisionError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for ProvisionError {
    fn from(err: std::io::Error) -> Self {
        ProvisionError::Configuration(err.to_string())
    }
}
