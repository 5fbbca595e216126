// Copyright (c) 2025 - Cowboy AI, Inc.
//! Test Fixtures for backend-stack
//!
//! Deterministic configuration plus a seeded in-memory provider. Secret
//! values are distinctive strings so tests can search serialized output
//! for them.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use backend_stack::backend::{FailureInjection, InMemoryCloud};
use backend_stack::config::StackConfig;
use backend_stack::deploy::Deployer;
use backend_stack::domain::DomainName;
use backend_stack::events::MemoryEventSink;
use backend_stack::provision::ValidationSettings;
use backend_stack::stack::{Stack, StackBuilder};

pub const DOMAIN: &str = "example.com";
pub const SUBDOMAIN: &str = "api";
pub const DB_USERNAME: &str = "fixture-db-admin";
pub const DB_PASSWORD: &str = "fixture-Pa55w0rd-never-logged";

/// Configuration equivalent to the original `config.json`
pub fn config() -> StackConfig {
    StackConfig::new(
        DomainName::new(DOMAIN).expect("Invalid fixture domain"),
        SUBDOMAIN,
    )
}

pub fn stack() -> Stack {
    StackBuilder::new(config())
        .synth()
        .expect("Fixture stack must synthesize")
}

/// Provider holding the credentials secret and the hosted zone
pub fn seeded_cloud(config: &StackConfig) -> InMemoryCloud {
    InMemoryCloud::new()
        .with_secret(
            &config.secrets.credentials_name,
            [
                (config.secrets.username_field.as_str(), DB_USERNAME),
                (config.secrets.password_field.as_str(), DB_PASSWORD),
            ],
        )
        .with_hosted_zone(&config.domain_name)
}

pub fn failing_cloud(config: &StackConfig, failures: FailureInjection) -> InMemoryCloud {
    seeded_cloud(config).with_failures(failures)
}

/// Validation settings that poll fast and give up quickly
pub fn fast_validation() -> ValidationSettings {
    ValidationSettings {
        poll_interval: Duration::from_millis(5),
        timeout: Duration::from_millis(200),
    }
}

pub fn deployer(
    cloud: Arc<InMemoryCloud>,
    events: Arc<MemoryEventSink>,
) -> Deployer<InMemoryCloud> {
    Deployer::new(cloud)
        .with_events(events)
        .with_validation(fast_validation())
}
