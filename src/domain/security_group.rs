// Copyright (c) 2025 - Cowboy AI, Inc.
//! Security Group Value Objects
//!
//! A security group is a stateful allow-list attached to a resource's network
//! interface. Ingress rules name their peer either by CIDR or by another
//! security group's logical id; the latter becomes a dependency edge in the
//! provisioning graph.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{Ipv4Cidr, ResourceId};

/// Transport protocol of a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
        }
    }
}

/// Source of ingress traffic
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Peer {
    /// Members of another security group
    SecurityGroup(ResourceId),
    /// Addresses within a block
    Cidr(Ipv4Cidr),
}

impl Peer {
    /// Any IPv4 address
    pub fn any_ipv4() -> Self {
        Peer::Cidr(Ipv4Cidr::ANY)
    }

    /// Security group this peer depends on, if any
    pub fn security_group(&self) -> Option<&ResourceId> {
        match self {
            Peer::SecurityGroup(id) => Some(id),
            Peer::Cidr(_) => None,
        }
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Peer::SecurityGroup(id) => write!(f, "sg:{}", id),
            Peer::Cidr(cidr) => write!(f, "{}", cidr),
        }
    }
}

/// Allow rule for inbound traffic
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IngressRule {
    pub peer: Peer,
    pub port: u16,
    pub protocol: Protocol,
    pub description: String,
}

impl IngressRule {
    pub fn tcp(peer: Peer, port: u16, description: impl Into<String>) -> Self {
        Self {
            peer,
            port,
            protocol: Protocol::Tcp,
            description: description.into(),
        }
    }

    /// Whether this rule admits `protocol` traffic on `port` from `peer`
    pub fn admits(&self, peer: &Peer, port: u16, protocol: Protocol) -> bool {
        self.peer == *peer && self.port == port && self.protocol == protocol
    }
}

impl fmt::Display for IngressRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "allow {}/{} from {} ({})",
            self.protocol, self.port, self.peer, self.description
        )
    }
}

/// Security group definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroup {
    pub id: ResourceId,
    /// Owning network
    pub network: ResourceId,
    pub description: String,
    pub ingress: Vec<IngressRule>,
    pub allow_all_outbound: bool,
}

impl SecurityGroup {
    pub fn new(id: ResourceId, network: ResourceId, description: impl Into<String>) -> Self {
        Self {
            id,
            network,
            description: description.into(),
            ingress: Vec::new(),
            allow_all_outbound: true,
        }
    }

    /// Append a rule; an identical peer/port/protocol triple is kept once
    pub fn add_ingress_rule(&mut self, rule: IngressRule) -> bool {
        if self
            .ingress
            .iter()
            .any(|existing| existing.admits(&rule.peer, rule.port, rule.protocol))
        {
            return false;
        }
        self.ingress.push(rule);
        true
    }

    /// Security groups referenced as peers
    pub fn peer_groups(&self) -> impl Iterator<Item = &ResourceId> {
        self.ingress.iter().filter_map(|rule| rule.peer.security_group())
    }

    /// Rules admitting traffic on the given port
    pub fn rules_for_port(&self, port: u16) -> Vec<&IngressRule> {
        self.ingress.iter().filter(|rule| rule.port == port).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sg(id: &str) -> SecurityGroup {
        SecurityGroup::new(
            ResourceId::new(id).unwrap(),
            ResourceId::new("Vpc").unwrap(),
            "test",
        )
    }

    #[test]
    fn test_duplicate_rules_collapse() {
        let mut group = sg("DbSg");
        let peer = Peer::SecurityGroup(ResourceId::new("EcsSg").unwrap());

        assert!(group.add_ingress_rule(IngressRule::tcp(peer.clone(), 27017, "first")));
        assert!(!group.add_ingress_rule(IngressRule::tcp(peer, 27017, "second")));
        assert_eq!(group.ingress.len(), 1);
    }

    #[test]
    fn test_peer_groups() {
        let mut group = sg("EcsSg");
        group.add_ingress_rule(IngressRule::tcp(
            Peer::SecurityGroup(ResourceId::new("AlbSg").unwrap()),
            3000,
            "from alb",
        ));
        group.add_ingress_rule(IngressRule::tcp(Peer::any_ipv4(), 443, "https"));

        let peers: Vec<_> = group.peer_groups().map(|id| id.as_str()).collect();
        assert_eq!(peers, vec!["AlbSg"]);
        assert_eq!(group.rules_for_port(443).len(), 1);
    }

    #[test]
    fn test_rule_display() {
        let rule = IngressRule::tcp(Peer::any_ipv4(), 443, "https");
        assert_eq!(rule.to_string(), "allow tcp/443 from 0.0.0.0/0 (https)");
    }
}
