// Copyright (c) 2025 - Cowboy AI, Inc.
//! Network topology allocation
//!
//! Carves a VPC block into one subnet per group per availability zone.
//! Allocation walks the block from its first address: each subnet starts at
//! the next address aligned to its own size. Groups are allocated in
//! declaration order, zones in the given order within each group.

use tracing::debug;

use crate::domain::{
    Ipv4Cidr, Network, NetworkError, ResourceId, Route, RouteTarget, Subnet, SubnetKind,
    SubnetSpec,
};
use crate::errors::ProvisionResult;
use crate::graph::{ProvisioningGraph, ResourceDescriptor, ResourceSpec};

/// Smallest subnet a provider accepts
pub const MAX_SUBNET_PREFIX: u8 = 28;

/// Subnet allocator
pub struct NetworkTopology;

impl NetworkTopology {
    /// Allocate subnets for every group in every zone
    ///
    /// Fails when a group is malformed, when the groups lack a public or a
    /// private-isolated group, or when the block runs out of addresses.
    pub fn allocate(
        id: ResourceId,
        cidr: Ipv4Cidr,
        groups: &[SubnetSpec],
        availability_zones: &[String],
    ) -> Result<Network, NetworkError> {
        if availability_zones.is_empty() {
            return Err(NetworkError::NoAvailabilityZones);
        }
        Self::validate_groups(cidr, groups)?;

        let mut cursor = cidr.first();
        let mut subnets = Vec::with_capacity(groups.len() * availability_zones.len());

        for group in groups {
            let size = 1u64 << (32 - u32::from(group.cidr_mask));
            for zone in availability_zones {
                let start = cursor.div_ceil(size) * size;
                if start + size > cidr.end() {
                    return Err(NetworkError::AddressSpaceExhausted {
                        cidr,
                        group: group.name.clone(),
                        zone: zone.clone(),
                    });
                }

                let address = std::net::Ipv4Addr::from(start as u32);
                let block = Ipv4Cidr::new(address, group.cidr_mask)?;
                debug!("Allocated {} for {} in {}", block, group.name, zone);

                subnets.push(Subnet {
                    group: group.name.clone(),
                    kind: group.kind,
                    availability_zone: zone.clone(),
                    cidr: block,
                    routes: Self::routes_for(cidr, group.kind),
                });
                cursor = start + size;
            }
        }

        Self::check_disjoint(&subnets)?;

        Ok(Network {
            id,
            cidr,
            availability_zones: availability_zones.to_vec(),
            groups: groups.to_vec(),
            internet_gateway: groups.iter().any(|g| g.kind.has_internet_route()),
            subnets,
        })
    }

    /// Add the network to the graph
    pub fn declare(graph: &mut ProvisioningGraph, network: &Network) -> ProvisionResult<ResourceId> {
        graph.add_resource(ResourceDescriptor::new(
            network.id.clone(),
            ResourceSpec::Vpc(network.clone()),
        ))
    }

    fn validate_groups(cidr: Ipv4Cidr, groups: &[SubnetSpec]) -> Result<(), NetworkError> {
        for (i, group) in groups.iter().enumerate() {
            if groups[..i].iter().any(|g| g.name == group.name) {
                return Err(NetworkError::DuplicateSubnetGroup(group.name.clone()));
            }
            if group.cidr_mask < cidr.prefix_length() || group.cidr_mask > MAX_SUBNET_PREFIX {
                return Err(NetworkError::InvalidSubnetMask {
                    name: group.name.clone(),
                    mask: group.cidr_mask,
                    min: cidr.prefix_length(),
                    max: MAX_SUBNET_PREFIX,
                });
            }
        }

        for kind in [SubnetKind::Public, SubnetKind::PrivateIsolated] {
            if !groups.iter().any(|g| g.kind == kind) {
                return Err(NetworkError::MissingSubnetKind(kind));
            }
        }
        Ok(())
    }

    fn routes_for(cidr: Ipv4Cidr, kind: SubnetKind) -> Vec<Route> {
        let mut routes = vec![Route {
            destination: cidr,
            target: RouteTarget::Local,
        }];
        if kind.has_internet_route() {
            routes.push(Route {
                destination: Ipv4Cidr::ANY,
                target: RouteTarget::InternetGateway,
            });
        }
        routes
    }

    fn check_disjoint(subnets: &[Subnet]) -> Result<(), NetworkError> {
        for (i, a) in subnets.iter().enumerate() {
            if let Some(b) = subnets[i + 1..].iter().find(|b| a.cidr.overlaps(&b.cidr)) {
                return Err(NetworkError::OverlappingSubnets(a.cidr, b.cidr));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn zones(n: usize) -> Vec<String> {
        (0..n)
            .map(|i| format!("us-east-1{}", char::from(b'a' + i as u8)))
            .collect()
    }

    fn default_groups() -> Vec<SubnetSpec> {
        vec![
            SubnetSpec::new("public", 24, SubnetKind::Public),
            SubnetSpec::new("private", 24, SubnetKind::PrivateIsolated),
        ]
    }

    fn allocate(cidr: &str, groups: &[SubnetSpec], az: usize) -> Result<Network, NetworkError> {
        NetworkTopology::allocate(
            ResourceId::new("Vpc").unwrap(),
            cidr.parse().unwrap(),
            groups,
            &zones(az),
        )
    }

    #[test]
    fn test_default_layout() {
        let network = allocate("10.0.0.0/16", &default_groups(), 2).unwrap();

        let cidrs: Vec<String> = network.subnets.iter().map(|s| s.cidr.to_string()).collect();
        assert_eq!(
            cidrs,
            vec!["10.0.0.0/24", "10.0.1.0/24", "10.0.2.0/24", "10.0.3.0/24"]
        );
        assert_eq!(network.subnet_group("public").len(), 2);
        assert!(network.internet_gateway);
    }

    #[test]
    fn test_routes_by_kind() {
        let network = allocate("10.0.0.0/16", &default_groups(), 2).unwrap();

        for subnet in network.subnets_of(SubnetKind::Public) {
            assert!(subnet.routes_to_internet());
        }
        for subnet in network.subnets_of(SubnetKind::PrivateIsolated) {
            assert_eq!(subnet.routes.len(), 1);
            assert_eq!(subnet.routes[0].target, RouteTarget::Local);
        }
    }

    #[test]
    fn test_mixed_masks_stay_aligned() {
        let groups = vec![
            SubnetSpec::new("public", 26, SubnetKind::Public),
            SubnetSpec::new("private", 24, SubnetKind::PrivateIsolated),
        ];
        let network = allocate("10.0.0.0/16", &groups, 3).unwrap();

        let private: Vec<String> = network
            .subnet_group("private")
            .iter()
            .map(|s| s.cidr.to_string())
            .collect();
        assert_eq!(private, vec!["10.0.1.0/24", "10.0.2.0/24", "10.0.3.0/24"]);
    }

    #[test]
    fn test_exhaustion() {
        let result = allocate("10.0.0.0/24", &default_groups(), 2);
        assert!(matches!(
            result,
            Err(NetworkError::AddressSpaceExhausted { .. })
        ));
    }

    #[test]
    fn test_group_validation() {
        let missing_private = vec![SubnetSpec::new("public", 24, SubnetKind::Public)];
        assert_eq!(
            allocate("10.0.0.0/16", &missing_private, 2).unwrap_err(),
            NetworkError::MissingSubnetKind(SubnetKind::PrivateIsolated)
        );

        let duplicate = vec![
            SubnetSpec::new("a", 24, SubnetKind::Public),
            SubnetSpec::new("a", 24, SubnetKind::PrivateIsolated),
        ];
        assert!(matches!(
            allocate("10.0.0.0/16", &duplicate, 2),
            Err(NetworkError::DuplicateSubnetGroup(_))
        ));

        let too_small = vec![
            SubnetSpec::new("public", 29, SubnetKind::Public),
            SubnetSpec::new("private", 24, SubnetKind::PrivateIsolated),
        ];
        assert!(matches!(
            allocate("10.0.0.0/16", &too_small, 2),
            Err(NetworkError::InvalidSubnetMask { mask: 29, .. })
        ));

        assert_eq!(
            allocate("10.0.0.0/16", &default_groups(), 0).unwrap_err(),
            NetworkError::NoAvailabilityZones
        );
    }
}
