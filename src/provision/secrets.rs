// Copyright (c) 2025 - Cowboy AI, Inc.
//! Secret provisioning
//!
//! Plan time declares secrets in the graph and hands out [`SecretRef`]s.
//! Apply time either resolves a pre-created secret (fatal when absent) or
//! generates a random value and writes it to the store. Generated values are
//! held as [`SecretString`] and never logged.

use rand::rngs::OsRng;
use rand::Rng;
use secrecy::SecretString;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::backend::{SecretMetadata, SecretStore};
use crate::domain::{GenerationPolicy, ResourceId, SecretDefinition, SecretRef, SecretSchema};
use crate::errors::{ProvisionError, ProvisionResult};
use crate::graph::{ProvisioningGraph, ResourceDescriptor, ResourceSpec};

/// Declares and provisions secrets
pub struct SecretsProvisioner<S: ?Sized> {
    store: Arc<S>,
}

impl SecretsProvisioner<()> {
    /// Declare a secret created out-of-band
    pub fn import(
        graph: &mut ProvisioningGraph,
        id: ResourceId,
        name: &str,
        schema: SecretSchema,
    ) -> ProvisionResult<SecretRef> {
        Self::declare(graph, id, name, schema, GenerationPolicy::External)
    }

    /// Declare a secret generated at apply time
    pub fn declare_generated(
        graph: &mut ProvisioningGraph,
        id: ResourceId,
        name: &str,
        policy: GenerationPolicy,
    ) -> ProvisionResult<SecretRef> {
        let schema = match &policy {
            GenerationPolicy::Random { key, .. } => SecretSchema::new([key.clone()]),
            GenerationPolicy::External => {
                return Err(ProvisionError::Validation(format!(
                    "Generated secret {name} needs a random generation policy"
                )))
            }
        };
        Self::declare(graph, id, name, schema, policy)
    }

    fn declare(
        graph: &mut ProvisioningGraph,
        id: ResourceId,
        name: &str,
        schema: SecretSchema,
        policy: GenerationPolicy,
    ) -> ProvisionResult<SecretRef> {
        let reference = SecretRef::new(id.clone(), name);
        graph.add_resource(ResourceDescriptor::new(
            id,
            ResourceSpec::Secret(SecretDefinition {
                reference: reference.clone(),
                schema,
                policy,
            }),
        ))?;
        Ok(reference)
    }
}

impl<S: SecretStore + ?Sized> SecretsProvisioner<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Look up a pre-created secret
    ///
    /// A missing secret, or one lacking a declared field, is fatal.
    pub async fn resolve_existing(
        &self,
        reference: &SecretRef,
        schema: &SecretSchema,
    ) -> ProvisionResult<SecretMetadata> {
        let metadata = self
            .store
            .describe_secret(reference.name())
            .await?
            .ok_or_else(|| ProvisionError::SecretNotFound(reference.name().to_string()))?;

        if let Some(field) = schema.fields.iter().find(|f| !metadata.fields.contains(*f)) {
            return Err(ProvisionError::Validation(format!(
                "Secret {} has no field {}",
                reference.name(),
                field
            )));
        }

        info!("Resolved existing secret {}", reference.name());
        Ok(metadata)
    }

    /// Generate a value for a declared secret and store it
    pub async fn generate(&self, definition: &SecretDefinition) -> ProvisionResult<SecretMetadata> {
        let GenerationPolicy::Random { key, .. } = &definition.policy else {
            return Err(ProvisionError::Validation(format!(
                "Secret {} is not generated",
                definition.reference.name()
            )));
        };

        let value = generate_value(&definition.policy)?;
        let metadata = self
            .store
            .put_secret(
                definition.reference.name(),
                BTreeMap::from([(key.clone(), value)]),
            )
            .await?;

        info!("Generated secret {}", definition.reference.name());
        Ok(metadata)
    }
}

/// Random value over the policy's alphabet, drawn from the OS RNG
pub fn generate_value(policy: &GenerationPolicy) -> ProvisionResult<SecretString> {
    let GenerationPolicy::Random { length, .. } = policy else {
        return Err(ProvisionError::Validation(
            "External secrets cannot be generated".into(),
        ));
    };

    let alphabet = policy.alphabet();
    if alphabet.is_empty() || *length == 0 {
        return Err(ProvisionError::Validation(
            "Secret generation needs a non-empty alphabet and length".into(),
        ));
    }

    let mut rng = OsRng;
    let value: String = (0..*length)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())])
        .collect();
    debug!("Generated {} character secret value", length);

    Ok(SecretString::from(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_generated_value_respects_policy() {
        let policy = GenerationPolicy::random("payloadSecret", "\"@/\\ ");

        for _ in 0..50 {
            let value = generate_value(&policy).unwrap();
            let value = value.expose_secret();
            assert_eq!(value.chars().count(), GenerationPolicy::DEFAULT_LENGTH);
            assert!(value.chars().all(|c| c.is_ascii_graphic()));
            assert!(!value.contains(['"', '@', '/', '\\', ' ']));
        }
    }

    #[test]
    fn test_values_differ() {
        let policy = GenerationPolicy::random("k", "");
        let a = generate_value(&policy).unwrap();
        let b = generate_value(&policy).unwrap();
        assert_ne!(a.expose_secret(), b.expose_secret());
    }

    #[test]
    fn test_external_cannot_be_generated() {
        assert!(generate_value(&GenerationPolicy::External).is_err());
    }

    #[test]
    fn test_declare_generated_requires_random_policy() {
        let mut graph = ProvisioningGraph::new();
        let result = SecretsProvisioner::declare_generated(
            &mut graph,
            ResourceId::new("Payload").unwrap(),
            "payload",
            GenerationPolicy::External,
        );
        assert!(result.is_err());
        assert!(graph.is_empty());
    }

    #[test]
    fn test_import_declares_imported_node() {
        let mut graph = ProvisioningGraph::new();
        let id = ResourceId::new("DbCredentials").unwrap();
        let secret = SecretsProvisioner::import(
            &mut graph,
            id.clone(),
            "universal/db/credentials",
            SecretSchema::new(["dbMainUsername", "dbMainPassword"]),
        )
        .unwrap();

        assert_eq!(secret.resource(), &id);
        assert!(graph.get(&id).unwrap().is_imported());
    }
}
