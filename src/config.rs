// Copyright (c) 2025 - Cowboy AI, Inc.
//! Stack and service configuration
//!
//! [`StackConfig`] is read from the same `config.json` the stack has always
//! used: only `domain_name` and `backend_subdomain` are required, every other
//! section falls back to the defaults of the reference deployment.
//! [`ServerConfig`] is read from the container environment.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::domain::{DomainName, Ipv4Cidr, SubnetKind, SubnetSpec};
use crate::errors::{ProvisionError, ProvisionResult};
use crate::provision::{DatabaseOptions, ImageSource, ResourceLimits, ValidationSettings};
use crate::state_machine::HealthCheck;

/// Characters the generated application secret never contains
pub const PAYLOAD_SECRET_EXCLUDED: &str = "\"@/\\ ";

/// Top-level stack configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackConfig {
    pub domain_name: DomainName,
    pub backend_subdomain: String,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub secrets: SecretsConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub health_check: HealthCheck,
    #[serde(default)]
    pub certificate: CertificateConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub cidr: Ipv4Cidr,
    pub availability_zones: Vec<String>,
    pub subnets: Vec<SubnetSpec>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            cidr: Ipv4Cidr::DEFAULT_VPC,
            availability_zones: vec!["us-east-1a".to_string(), "us-east-1b".to_string()],
            subnets: vec![
                SubnetSpec::new("public", 24, SubnetKind::Public),
                SubnetSpec::new("private", 24, SubnetKind::PrivateIsolated),
            ],
        }
    }
}

/// Names of the pre-created credentials secret and the generated secret
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretsConfig {
    pub credentials_name: String,
    pub username_field: String,
    pub password_field: String,
    pub payload_secret_name: String,
    pub payload_secret_key: String,
    pub payload_secret_length: usize,
    pub payload_secret_excluded: String,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            credentials_name: "universal/db/credentials".to_string(),
            username_field: "dbMainUsername".to_string(),
            password_field: "dbMainPassword".to_string(),
            payload_secret_name: "PayloadSecret".to_string(),
            payload_secret_key: "payloadSecret".to_string(),
            payload_secret_length: 32,
            payload_secret_excluded: PAYLOAD_SECRET_EXCLUDED.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub image: ImageSource,
    pub limits: ResourceLimits,
    pub port: u16,
    pub desired_count: u32,
    pub log_retention_days: u32,
    /// Value of `NODE_ENV` inside the container
    pub node_env: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            image: ImageSource::Asset("server".to_string()),
            limits: ResourceLimits::default(),
            port: 3000,
            desired_count: 1,
            log_retention_days: 1,
            node_env: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub enabled: bool,
    #[serde(flatten)]
    pub options: DatabaseOptions,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            options: DatabaseOptions::default(),
        }
    }
}

/// Certificate validation polling, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CertificateConfig {
    pub validation_timeout_secs: u64,
    pub poll_interval_secs: u64,
}

impl Default for CertificateConfig {
    fn default() -> Self {
        let defaults = ValidationSettings::default();
        Self {
            validation_timeout_secs: defaults.timeout.as_secs(),
            poll_interval_secs: defaults.poll_interval.as_secs(),
        }
    }
}

impl CertificateConfig {
    pub fn settings(&self) -> ValidationSettings {
        ValidationSettings {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            timeout: Duration::from_secs(self.validation_timeout_secs),
        }
    }
}

impl StackConfig {
    /// Minimal configuration with every optional section defaulted
    pub fn new(domain_name: DomainName, backend_subdomain: impl Into<String>) -> Self {
        Self {
            domain_name,
            backend_subdomain: backend_subdomain.into(),
            network: NetworkConfig::default(),
            secrets: SecretsConfig::default(),
            service: ServiceConfig::default(),
            database: DatabaseConfig::default(),
            health_check: HealthCheck::default(),
            certificate: CertificateConfig::default(),
        }
    }

    /// Load and validate a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> ProvisionResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProvisionError::Configuration(format!("Cannot read {}: {}", path.display(), e))
        })?;
        debug!("Loaded configuration from {}", path.display());
        Self::from_json(&content)
    }

    /// Parse and validate a JSON configuration
    pub fn from_json(content: &str) -> ProvisionResult<Self> {
        let config: Self = serde_json::from_str(content)
            .map_err(|e| ProvisionError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check everything that can be checked without a provider
    pub fn validate(&self) -> ProvisionResult<()> {
        DomainName::validate_label(&self.backend_subdomain)?;
        self.service.limits.validate()?;
        self.health_check.validate()?;

        if self.service.port == 0 {
            return Err(ProvisionError::Configuration(
                "Service port must be non-zero".into(),
            ));
        }
        if self.service.desired_count == 0 {
            return Err(ProvisionError::Configuration(
                "Desired count must be at least 1".into(),
            ));
        }
        if self.secrets.payload_secret_length == 0 {
            return Err(ProvisionError::Configuration(
                "Generated secret length must be at least 1".into(),
            ));
        }
        if self.secrets.username_field == self.secrets.password_field {
            return Err(ProvisionError::Configuration(
                "Username and password fields of the credentials secret must differ".into(),
            ));
        }
        if self.certificate.poll_interval_secs == 0
            || self.certificate.poll_interval_secs > self.certificate.validation_timeout_secs
        {
            return Err(ProvisionError::Configuration(format!(
                "Certificate poll interval {}s must be between 1s and the validation timeout {}s",
                self.certificate.poll_interval_secs, self.certificate.validation_timeout_secs
            )));
        }
        Ok(())
    }

    /// `{backend_subdomain}.{domain_name}`
    pub fn backend_fqdn(&self) -> ProvisionResult<DomainName> {
        Ok(self.domain_name.subdomain(&self.backend_subdomain)?)
    }
}

/// Runtime configuration of the HTTP service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    pub node_env: Option<String>,
    pub collection: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            node_env: None,
            collection: "random_values".to_string(),
        }
    }
}

impl ServerConfig {
    /// Read `PORT`, `NODE_ENV` and `DB_COLLECTION`
    pub fn from_env() -> ProvisionResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ServerConfig::from_env`] with an explicit lookup
    pub fn from_lookup<F>(lookup: F) -> ProvisionResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let port = match lookup("PORT") {
            Some(raw) => raw.parse().map_err(|_| {
                ProvisionError::Configuration(format!("PORT is not a valid port: {raw}"))
            })?,
            None => defaults.port,
        };

        Ok(Self {
            port,
            node_env: lookup("NODE_ENV"),
            collection: lookup("DB_COLLECTION").unwrap_or(defaults.collection),
        })
    }
}
