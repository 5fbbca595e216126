// Copyright (c) 2025 - Cowboy AI, Inc.
//! Secret handles
//!
//! The provisioning graph never holds secret values. It holds [`SecretRef`]
//! handles (which secret) and [`SecretFieldRef`] handles (which JSON field of
//! which secret). Neither type exposes or converts into a plain string value,
//! so a secret can only reach a container through the `secrets` map of a
//! container definition, where the provider resolves it at task start.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use super::ResourceId;

/// Opaque reference to a secret in the secret store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecretRef {
    resource: ResourceId,
    name: String,
}

impl SecretRef {
    pub fn new(resource: ResourceId, name: impl Into<String>) -> Self {
        Self {
            resource,
            name: name.into(),
        }
    }

    /// Graph node that owns or imports the secret
    pub fn resource(&self) -> &ResourceId {
        &self.resource
    }

    /// Name of the secret in the store
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reference to one JSON field of the secret
    pub fn field(&self, field: impl Into<String>) -> SecretFieldRef {
        SecretFieldRef {
            secret: self.clone(),
            field: field.into(),
        }
    }
}

impl fmt::Display for SecretRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "secret:{}", self.name)
    }
}

/// Opaque reference to one field of a JSON secret
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecretFieldRef {
    secret: SecretRef,
    field: String,
}

impl SecretFieldRef {
    pub fn secret(&self) -> &SecretRef {
        &self.secret
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    /// `valueFrom` form used in task definitions: `{secret}:{field}::`
    pub fn value_from(&self, secret_arn: &str) -> String {
        format!("{}:{}::", secret_arn, self.field)
    }
}

impl fmt::Display for SecretFieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.secret, self.field)
    }
}

/// Named fields a JSON secret is expected to carry
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SecretSchema {
    pub fields: BTreeSet<String>,
}

impl SecretSchema {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains(field)
    }
}

/// How a secret's value comes into existence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum GenerationPolicy {
    /// Created out-of-band; provisioning only looks it up
    External,
    /// Random printable ASCII generated at provisioning time
    Random {
        key: String,
        length: usize,
        excluded_characters: String,
    },
}

impl GenerationPolicy {
    /// Default length of generated secret strings
    pub const DEFAULT_LENGTH: usize = 32;

    pub fn random(key: impl Into<String>, excluded_characters: impl Into<String>) -> Self {
        GenerationPolicy::Random {
            key: key.into(),
            length: Self::DEFAULT_LENGTH,
            excluded_characters: excluded_characters.into(),
        }
    }

    /// Characters a random value may contain
    pub fn alphabet(&self) -> Vec<char> {
        match self {
            GenerationPolicy::External => Vec::new(),
            GenerationPolicy::Random {
                excluded_characters,
                ..
            } => (0x21u8..=0x7e)
                .map(char::from)
                .chain(std::iter::once(' '))
                .filter(|c| !excluded_characters.contains(*c))
                .collect(),
        }
    }
}

/// Secret declared in the provisioning graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretDefinition {
    pub reference: SecretRef,
    pub schema: SecretSchema,
    pub policy: GenerationPolicy,
}

impl SecretDefinition {
    pub fn is_external(&self) -> bool {
        matches!(self.policy, GenerationPolicy::External)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_reference() {
        let secret = SecretRef::new(
            ResourceId::new("DocDbCredentials").unwrap(),
            "universal/db/credentials",
        );
        let field = secret.field("dbMainUsername");

        assert_eq!(field.field(), "dbMainUsername");
        assert_eq!(field.secret().name(), "universal/db/credentials");
        assert_eq!(
            field.value_from("arn:secret:creds"),
            "arn:secret:creds:dbMainUsername::"
        );
        assert_eq!(
            field.to_string(),
            "secret:universal/db/credentials#dbMainUsername"
        );
    }

    #[test]
    fn test_alphabet_excludes_characters() {
        let policy = GenerationPolicy::random("payloadSecret", "\"@/\\ ");
        let alphabet = policy.alphabet();

        for excluded in ['"', '@', '/', '\\', ' '] {
            assert!(!alphabet.contains(&excluded));
        }
        assert!(alphabet.contains(&'a'));
        assert!(alphabet.contains(&'~'));
        assert_eq!(alphabet.len(), 95 - 5);
    }

    #[test]
    fn test_external_has_no_alphabet() {
        assert!(GenerationPolicy::External.alphabet().is_empty());
    }
}
