// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Subnet Allocation
//!
//! Whatever the address block, masks and zone count, an allocation that
//! succeeds must produce disjoint subnets inside the block, and isolated
//! subnets must never route outside the network.

use backend_stack::domain::{Ipv4Cidr, NetworkError, ResourceId, SubnetKind, SubnetSpec};
use backend_stack::provision::NetworkTopology;
use proptest::prelude::*;
use std::net::Ipv4Addr;

// ============================================================================
// Strategies
// ============================================================================

/// Aligned block with a /8 to /24 prefix
fn vpc_block() -> impl Strategy<Value = Ipv4Cidr> {
    (any::<u32>(), 8u8..=24).prop_map(|(raw, prefix)| {
        let mask = u32::MAX << (32 - u32::from(prefix));
        Ipv4Cidr::new(Ipv4Addr::from(raw & mask), prefix).unwrap()
    })
}

fn zones() -> impl Strategy<Value = Vec<String>> {
    (1usize..=4).prop_map(|n| {
        (0..n)
            .map(|i| format!("us-east-1{}", char::from(b'a' + i as u8)))
            .collect()
    })
}

/// One public and one isolated group, masks relative to the block
fn groups(block: Ipv4Cidr) -> impl Strategy<Value = Vec<SubnetSpec>> {
    let min = block.prefix_length();
    (min..=28u8, min..=28u8).prop_map(|(public, private)| {
        vec![
            SubnetSpec::new("public", public, SubnetKind::Public),
            SubnetSpec::new("private", private, SubnetKind::PrivateIsolated),
        ]
    })
}

fn layout() -> impl Strategy<Value = (Ipv4Cidr, Vec<SubnetSpec>, Vec<String>)> {
    vpc_block().prop_flat_map(|block| (Just(block), groups(block), zones()))
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    /// Property: Allocated subnets never overlap and stay inside the block
    #[test]
    fn prop_subnets_disjoint_and_contained((block, groups, zones) in layout()) {
        let id = ResourceId::new("VPC").unwrap();
        match NetworkTopology::allocate(id, block, &groups, &zones) {
            Ok(network) => {
                prop_assert_eq!(network.subnets.len(), groups.len() * zones.len());
                for (i, a) in network.subnets.iter().enumerate() {
                    prop_assert!(block.contains(&a.cidr), "{} outside {}", a.cidr, block);
                    for b in &network.subnets[i + 1..] {
                        prop_assert!(!a.cidr.overlaps(&b.cidr), "{} overlaps {}", a.cidr, b.cidr);
                    }
                }
            }
            Err(err) => {
                prop_assert!(
                    matches!(err, NetworkError::AddressSpaceExhausted { .. }),
                    "unexpected error {}", err
                );
            }
        }
    }

    /// Property: Isolated subnets only route locally
    #[test]
    fn prop_isolated_subnets_have_no_internet_route((block, groups, zones) in layout()) {
        let id = ResourceId::new("VPC").unwrap();
        if let Ok(network) = NetworkTopology::allocate(id, block, &groups, &zones) {
            for subnet in network.subnets_of(SubnetKind::PrivateIsolated) {
                prop_assert!(!subnet.routes_to_internet());
                for route in &subnet.routes {
                    prop_assert_eq!(route.destination, block);
                }
            }
            for subnet in network.subnets_of(SubnetKind::Public) {
                prop_assert!(subnet.routes_to_internet());
            }
        }
    }

    /// Property: Allocation is deterministic
    #[test]
    fn prop_allocation_is_deterministic((block, groups, zones) in layout()) {
        let first = NetworkTopology::allocate(ResourceId::new("VPC").unwrap(), block, &groups, &zones);
        let second = NetworkTopology::allocate(ResourceId::new("VPC").unwrap(), block, &groups, &zones);
        prop_assert_eq!(first.ok(), second.ok());
    }
}
