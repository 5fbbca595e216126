// Copyright (c) 2025 - Cowboy AI, Inc.
//! Load-balanced ingress
//!
//! An internet-facing load balancer in the public subnets terminates TLS on
//! 443 with the stack's certificate and forwards to an IP target group on
//! the service port. The load balancer has its own security group open on
//! 443; the service security group admits the service port from that group
//! only.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::certificate::Certificate;
use super::compute::ContainerService;
use crate::domain::{
    IngressRule, Ipv4Cidr, Network, Peer, ResourceId, SecurityGroup, SubnetKind,
};
use crate::errors::{ProvisionError, ProvisionResult};
use crate::graph::{attributes, OutputRef, ProvisioningGraph, ResourceDescriptor, ResourceSpec};
use crate::state_machine::target_health::probe_with_timeout;
use crate::state_machine::{HealthCheck, HealthProtocol, ProbeOutcome, TargetHealth, TargetState};

pub const LOAD_BALANCER_SECURITY_GROUP_ID: &str = "LoadBalancerSecurityGroup";
pub const LOAD_BALANCER_ID: &str = "LoadBalancer";
pub const TARGET_GROUP_ID: &str = "ECSTargetGroup";
pub const LISTENER_ID: &str = "Listener";
pub const HTTPS_PORT: u16 = 443;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancerSpec {
    pub network: ResourceId,
    pub subnets: Vec<Ipv4Cidr>,
    pub security_group: ResourceId,
    pub internet_facing: bool,
}

/// How targets are addressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    #[default]
    Ip,
    Instance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetGroupSpec {
    pub network: ResourceId,
    pub port: u16,
    pub protocol: HealthProtocol,
    pub target_type: TargetType,
    pub health_check: HealthCheck,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerSpec {
    pub load_balancer: ResourceId,
    pub port: u16,
    pub protocol: HealthProtocol,
    pub certificate: ResourceId,
    pub default_target_group: ResourceId,
}

/// Plan-time handle to the ingress
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBalancer {
    pub id: ResourceId,
    pub security_group: ResourceId,
    pub target_group: ResourceId,
    pub listener: ResourceId,
}

impl LoadBalancer {
    pub fn dns_name(&self) -> OutputRef {
        OutputRef::new(self.id.clone(), attributes::DNS_NAME)
    }

    pub fn canonical_hosted_zone_id(&self) -> OutputRef {
        OutputRef::new(self.id.clone(), attributes::CANONICAL_HOSTED_ZONE_ID)
    }
}

pub struct TrafficRouter;

impl TrafficRouter {
    /// Declare load balancer, listener and target group, and attach the service
    pub fn route(
        graph: &mut ProvisioningGraph,
        network: &Network,
        certificate: &Certificate,
        service: &ContainerService,
        health_check: HealthCheck,
    ) -> ProvisionResult<LoadBalancer> {
        health_check.validate()?;
        let subnets: Vec<Ipv4Cidr> = network
            .subnets_of(SubnetKind::Public)
            .iter()
            .map(|s| s.cidr)
            .collect();
        if subnets.is_empty() {
            return Err(ProvisionError::Validation(format!(
                "Network {} has no public subnets for the load balancer",
                network.id
            )));
        }

        let lb_sg = ResourceId::new(LOAD_BALANCER_SECURITY_GROUP_ID)?;
        graph.add_resource(ResourceDescriptor::new(
            lb_sg.clone(),
            ResourceSpec::SecurityGroup(SecurityGroup::new(
                lb_sg.clone(),
                network.id.clone(),
                "Security group for the load balancer",
            )),
        ))?;
        graph.add_dependency(&lb_sg, &network.id)?;
        graph.add_ingress_rule(
            &lb_sg,
            IngressRule::tcp(Peer::any_ipv4(), HTTPS_PORT, "Allow HTTPS traffic from anywhere"),
        )?;
        graph.add_ingress_rule(
            &service.security_group,
            IngressRule::tcp(
                Peer::SecurityGroup(lb_sg.clone()),
                service.port,
                "Allow traffic from the load balancer",
            ),
        )?;

        let load_balancer = graph.add_resource(ResourceDescriptor::new(
            ResourceId::new(LOAD_BALANCER_ID)?,
            ResourceSpec::LoadBalancer(LoadBalancerSpec {
                network: network.id.clone(),
                subnets,
                security_group: lb_sg.clone(),
                internet_facing: true,
            }),
        ))?;
        graph.add_dependency(&load_balancer, &network.id)?;
        graph.add_dependency(&load_balancer, &lb_sg)?;

        let target_group = graph.add_resource(ResourceDescriptor::new(
            ResourceId::new(TARGET_GROUP_ID)?,
            ResourceSpec::TargetGroup(TargetGroupSpec {
                network: network.id.clone(),
                port: service.port,
                protocol: HealthProtocol::Http,
                target_type: TargetType::Ip,
                health_check,
            }),
        ))?;
        graph.add_dependency(&target_group, &network.id)?;

        let listener = graph.add_resource(ResourceDescriptor::new(
            ResourceId::new(LISTENER_ID)?,
            ResourceSpec::Listener(ListenerSpec {
                load_balancer: load_balancer.clone(),
                port: HTTPS_PORT,
                protocol: HealthProtocol::Https,
                certificate: certificate.id.clone(),
                default_target_group: target_group.clone(),
            }),
        ))?;
        for dependency in [&load_balancer, &target_group, &certificate.id] {
            graph.add_dependency(&listener, dependency)?;
        }

        // Tasks register with the target group once the listener forwards to it.
        graph.add_dependency(&service.service, &listener)?;
        if let Some(ResourceSpec::Service(spec)) =
            graph.get_mut(&service.service).map(|d| &mut d.spec)
        {
            spec.target_group = Some(target_group.clone());
        }

        Ok(LoadBalancer {
            id: load_balancer,
            security_group: lb_sg,
            target_group,
            listener,
        })
    }
}

/// Health of every target registered with a target group
#[derive(Debug, Clone)]
pub struct TargetGroupHealth {
    check: HealthCheck,
    targets: BTreeMap<String, TargetHealth>,
}

impl TargetGroupHealth {
    pub fn new(check: HealthCheck) -> Self {
        Self {
            check,
            targets: BTreeMap::new(),
        }
    }

    pub fn check(&self) -> &HealthCheck {
        &self.check
    }

    /// Register a target; it starts in `Initial` and receives no traffic
    pub fn register(&mut self, target: impl Into<String>) {
        let check = &self.check;
        self.targets
            .entry(target.into())
            .or_insert_with(|| TargetHealth::new(check));
    }

    pub fn deregister(&mut self, target: &str) -> bool {
        self.targets.remove(target).is_some()
    }

    pub fn state_of(&self, target: &str) -> Option<TargetState> {
        self.targets.get(target).map(|t| t.state)
    }

    /// Apply a probe result, returning the new state if it changed
    pub fn record(&mut self, target: &str, outcome: ProbeOutcome) -> Option<TargetState> {
        let health = self.targets.get_mut(target)?;
        let changed = health.record(outcome);
        match changed {
            Some(TargetState::Unhealthy) => warn!("Target {} is unhealthy", target),
            Some(state) => info!("Target {} is {}", target, state),
            None => {}
        }
        changed
    }

    /// Targets eligible for traffic
    pub fn healthy_targets(&self) -> Vec<&str> {
        self.targets
            .iter()
            .filter(|(_, health)| health.receives_traffic())
            .map(|(target, _)| target.as_str())
            .collect()
    }

    /// Probe every target once, bounded by the check's timeout
    pub async fn probe_all<F, Fut>(&mut self, probe: F)
    where
        F: Fn(&str) -> Fut,
        Fut: Future<Output = bool>,
    {
        let timeout = self.check.timeout();
        for target in self.targets() {
            let outcome = probe_with_timeout(timeout, probe(&target)).await;
            self.record(&target, outcome);
        }
    }

    fn targets(&self) -> Vec<String> {
        self.targets.keys().cloned().collect()
    }

    /// Probe every target once per check interval in a background task
    ///
    /// The first round runs one interval after the call.
    pub fn monitor<F, Fut>(self, probe: F) -> HealthMonitor
    where
        F: Fn(&str) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let interval = self.check.interval();
        let timeout = self.check.timeout();
        let group = Arc::new(Mutex::new(self));
        let shared = group.clone();

        info!("Probing targets every {:?}", interval);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let targets = shared.lock().await.targets();
                debug!("Probing {} targets", targets.len());
                // The lock is not held while a probe runs.
                for target in targets {
                    let outcome = probe_with_timeout(timeout, probe(&target)).await;
                    shared.lock().await.record(&target, outcome);
                }
            }
        });

        HealthMonitor { group, task }
    }
}

/// Running health checks of one target group
///
/// Dropping the monitor stops probing.
pub struct HealthMonitor {
    group: Arc<Mutex<TargetGroupHealth>>,
    task: JoinHandle<()>,
}

impl HealthMonitor {
    pub async fn state_of(&self, target: &str) -> Option<TargetState> {
        self.group.lock().await.state_of(target)
    }

    pub async fn healthy_targets(&self) -> Vec<String> {
        self.group
            .lock()
            .await
            .healthy_targets()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    pub async fn register(&self, target: impl Into<String>) {
        self.group.lock().await.register(target);
    }

    pub async fn deregister(&self, target: &str) -> bool {
        self.group.lock().await.deregister(target)
    }

    /// Stop probing and wait for the probe task to end
    pub async fn stop(mut self) {
        self.task.abort();
        if let Err(err) = (&mut self.task).await {
            if !err.is_cancelled() {
                warn!("Health monitor ended abnormally: {}", err);
            }
        }
        info!("Stopped probing targets");
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}
