// Copyright (c) 2025 - Cowboy AI, Inc.
//! DNS alias binding
//!
//! Points `{subdomain}.{domain}` at the load balancer with an alias A record.
//! The write is an UPSERT keyed by record name and type, so repeated runs
//! converge on a single record.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::traffic::LoadBalancer;
use crate::backend::{AliasTarget, DnsRecord, HostedZone, HostedZones, RecordType, RecordValue};
use crate::domain::{DomainName, ResourceId};
use crate::errors::{ProvisionError, ProvisionResult};
use crate::graph::{ProvisioningGraph, ResourceDescriptor, ResourceSpec};

pub const ALIAS_RECORD_ID: &str = "BackendPayloadARecord";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasRecordSpec {
    pub hosted_zone: ResourceId,
    pub subdomain: String,
    pub domain: DomainName,
    pub load_balancer: ResourceId,
}

impl AliasRecordSpec {
    pub fn record_name(&self) -> ProvisionResult<DomainName> {
        Ok(self.domain.subdomain(&self.subdomain)?)
    }
}

/// Writes alias records into a hosted zone
pub struct DnsBinder<Z: ?Sized> {
    zones: Arc<Z>,
}

impl DnsBinder<()> {
    /// Declare the alias record for `{subdomain}.{domain}`
    pub fn declare(
        graph: &mut ProvisioningGraph,
        hosted_zone: &ResourceId,
        subdomain: &str,
        domain: &DomainName,
        load_balancer: &LoadBalancer,
    ) -> ProvisionResult<DomainName> {
        let spec = AliasRecordSpec {
            hosted_zone: hosted_zone.clone(),
            subdomain: subdomain.to_string(),
            domain: domain.clone(),
            load_balancer: load_balancer.id.clone(),
        };
        let fqdn = spec.record_name()?;

        let id = graph.add_resource(ResourceDescriptor::new(
            ResourceId::new(ALIAS_RECORD_ID)?,
            ResourceSpec::DnsRecord(spec),
        ))?;
        graph.add_dependency(&id, hosted_zone)?;
        graph.add_dependency(&id, &load_balancer.id)?;
        Ok(fqdn)
    }
}

impl<Z: HostedZones + ?Sized> DnsBinder<Z> {
    pub fn new(zones: Arc<Z>) -> Self {
        Self { zones }
    }

    /// UPSERT the alias A record for `{subdomain}.{domain}`
    pub async fn bind(
        &self,
        zone: &HostedZone,
        subdomain: &str,
        domain: &DomainName,
        target: &AliasTarget,
    ) -> ProvisionResult<DnsRecord> {
        let name = domain.subdomain(subdomain)?;
        if !name.is_within(&zone.name) {
            return Err(ProvisionError::Validation(format!(
                "{} is not within hosted zone {}",
                name, zone.name
            )));
        }

        let record = DnsRecord {
            name: name.to_string(),
            record_type: RecordType::A,
            value: RecordValue::Alias(target.clone()),
        };
        self.zones.upsert_record(&zone.zone_id, record.clone()).await?;

        info!("Bound {} to {}", name, target.dns_name);
        Ok(record)
    }
}
