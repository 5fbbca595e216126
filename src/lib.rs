// Copyright (c) 2025 - Cowboy AI, Inc.
//! Provisioning graph and runtime service for a TLS-fronted container backend
//!
//! A backend stack is a network, a DNS-validated certificate, secrets, an
//! optional managed document database, a container service, a load balancer
//! and a DNS alias. This crate models it as an explicit dependency graph,
//! applies it against a provider in dependency order, tears it down in
//! reverse, and ships the HTTP service the stack runs.
//!
//! # Layers
//!
//! - [`domain`]: validated value objects (CIDRs, domain names, secret handles)
//! - [`graph`]: typed resource descriptors and the DAG that orders them
//! - [`provision`]: components that declare resources at plan time and do
//!   provider work at apply time
//! - [`stack`]: wires the components into the backend stack
//! - [`deploy`]: apply and teardown with lifecycle tracking
//! - [`backend`]: provider traits and an in-memory provider
//! - [`events`], [`nats`], [`subjects`]: provisioning events
//! - [`server`]: the deployed HTTP service

pub mod backend;
pub mod config;
pub mod deploy;
pub mod domain;
pub mod errors;
pub mod events;
pub mod graph;
pub mod nats;
pub mod provision;
pub mod server;
pub mod stack;
pub mod state_machine;
pub mod subjects;

pub use config::{ServerConfig, StackConfig};
pub use deploy::{Deployer, StackState};
pub use errors::{ProvisionError, ProvisionResult};
pub use stack::{Stack, StackBuilder};
