// Copyright (c) 2025 - Cowboy AI, Inc.
//! Certificate issuance with DNS validation
//!
//! The certificate covers the domain and its wildcard. Issuance writes the
//! authority's challenge records into the hosted zone and then polls until
//! the certificate is issued, fails, or the validation timeout elapses. This
//! is the only blocking wait of a deployment.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::backend::{
    CertificateAuthority, CertificateRequest, CertificateStatus, DnsRecord, HostedZone,
    HostedZones, RecordType, RecordValue,
};
use crate::domain::{DomainName, ResourceId};
use crate::errors::{ProvisionError, ProvisionResult};
use crate::graph::{attributes, OutputRef, ProvisioningGraph, ResourceDescriptor, ResourceSpec};

/// How ownership of the domain is proven
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMethod {
    #[default]
    Dns,
}

/// Requested certificate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateSpec {
    pub domain: DomainName,
    pub alternative_names: Vec<String>,
    pub hosted_zone: ResourceId,
    pub validation: ValidationMethod,
}

/// Plan-time handle to a certificate node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    pub id: ResourceId,
    pub domain: DomainName,
    pub alternative_names: Vec<String>,
}

impl Certificate {
    pub fn arn(&self) -> OutputRef {
        OutputRef::new(self.id.clone(), attributes::CERTIFICATE_ARN)
    }
}

/// Certificate that passed validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedCertificate {
    pub arn: String,
    pub domain: DomainName,
    pub alternative_names: Vec<String>,
}

/// Polling settings of an issuer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationSettings {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(15),
            timeout: Duration::from_secs(30 * 60),
        }
    }
}

/// Requests and validates certificates
pub struct CertificateIssuer<P: ?Sized> {
    provider: Arc<P>,
    settings: ValidationSettings,
}

impl CertificateIssuer<()> {
    /// Declare a DNS-validated certificate for `domain` and `*.domain`
    pub fn declare(
        graph: &mut ProvisioningGraph,
        id: ResourceId,
        domain: &DomainName,
        hosted_zone: &ResourceId,
    ) -> ProvisionResult<Certificate> {
        let alternative_names = vec![domain.wildcard()];
        graph.add_resource(ResourceDescriptor::new(
            id.clone(),
            ResourceSpec::Certificate(CertificateSpec {
                domain: domain.clone(),
                alternative_names: alternative_names.clone(),
                hosted_zone: hosted_zone.clone(),
                validation: ValidationMethod::Dns,
            }),
        ))?;
        graph.add_dependency(&id, hosted_zone)?;

        Ok(Certificate {
            id,
            domain: domain.clone(),
            alternative_names,
        })
    }
}

impl<P> CertificateIssuer<P>
where
    P: CertificateAuthority + HostedZones + ?Sized,
{
    pub fn new(provider: Arc<P>, settings: ValidationSettings) -> Self {
        Self { provider, settings }
    }

    /// Request, validate through `zone`, and wait for issuance
    pub async fn issue(
        &self,
        spec: &CertificateSpec,
        zone: &HostedZone,
    ) -> ProvisionResult<IssuedCertificate> {
        if !spec.domain.is_within(&zone.name) {
            return Err(ProvisionError::Validation(format!(
                "{} is not within hosted zone {}",
                spec.domain, zone.name
            )));
        }

        let request = self
            .provider
            .request_certificate(&spec.domain, &spec.alternative_names)
            .await?;
        info!(
            "Requested certificate {} for {} ({} alternative names)",
            request.arn,
            spec.domain,
            spec.alternative_names.len()
        );

        match self.validate(spec, zone, &request).await {
            Ok(()) => {
                info!("Certificate {} issued", request.arn);
                Ok(IssuedCertificate {
                    arn: request.arn,
                    domain: spec.domain.clone(),
                    alternative_names: spec.alternative_names.clone(),
                })
            }
            Err(err) => {
                if let Err(cleanup) = self.provider.delete_certificate(&request.arn).await {
                    warn!(
                        "Could not delete unvalidated certificate {}: {}",
                        request.arn, cleanup
                    );
                } else {
                    info!("Deleted unvalidated certificate {}", request.arn);
                }
                Err(err)
            }
        }
    }

    async fn validate(
        &self,
        spec: &CertificateSpec,
        zone: &HostedZone,
        request: &CertificateRequest,
    ) -> ProvisionResult<()> {
        // The apex and its wildcard share one challenge record.
        let challenges: BTreeSet<(String, String)> = request
            .validation_records
            .iter()
            .map(|r| (r.record_name.clone(), r.record_value.clone()))
            .collect();

        for (name, value) in challenges {
            debug!("Upserting validation record {}", name);
            self.provider
                .upsert_record(
                    &zone.zone_id,
                    DnsRecord {
                        name,
                        record_type: RecordType::Cname,
                        value: RecordValue::Values(vec![value]),
                    },
                )
                .await?;
        }

        let waited = tokio::time::timeout(self.settings.timeout, self.wait_issued(&request.arn))
            .await
            .map_err(|_| {
                warn!("Certificate for {} did not validate in time", spec.domain);
                ProvisionError::CertificateValidationTimeout {
                    domain: spec.domain.to_string(),
                    waited: self.settings.timeout,
                }
            })?;

        match waited? {
            CertificateStatus::Failed(reason) => Err(ProvisionError::CertificateValidationFailed {
                domain: spec.domain.to_string(),
                reason,
            }),
            _ => Ok(()),
        }
    }

    async fn wait_issued(&self, arn: &str) -> ProvisionResult<CertificateStatus> {
        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        loop {
            ticker.tick().await;
            match self.provider.certificate_status(arn).await? {
                CertificateStatus::PendingValidation => {
                    debug!("Certificate {} pending validation", arn)
                }
                status => return Ok(status),
            }
        }
    }
}
