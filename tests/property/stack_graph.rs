// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Stack Synthesis
//!
//! For any valid configuration the synthesized graph orders every
//! dependency before its dependent, tears down in exact reverse, and keeps
//! the database reachable from the service only.

use backend_stack::config::StackConfig;
use backend_stack::domain::{DomainName, Peer};
use backend_stack::graph::ResourceSpec;
use backend_stack::stack::StackBuilder;
use proptest::prelude::*;
use std::collections::HashMap;

fn stack_config() -> impl Strategy<Value = StackConfig> {
    (
        "[a-z][a-z0-9]{0,10}",
        any::<bool>(),
        1024u16..=49151,
        1u32..=4,
        1usize..=3,
    )
        .prop_map(|(subdomain, database, port, desired_count, zones)| {
            let mut config = StackConfig::new(DomainName::new("example.com").unwrap(), subdomain);
            config.database.enabled = database;
            config.service.port = port;
            config.service.desired_count = desired_count;
            config.network.availability_zones = (0..zones)
                .map(|i| format!("us-east-1{}", char::from(b'a' + i as u8)))
                .collect();
            config
        })
}

proptest! {
    /// Property: Dependencies are created first and deleted last
    #[test]
    fn prop_creation_respects_dependencies(config in stack_config()) {
        let stack = StackBuilder::new(config).synth().unwrap();
        let order = stack.graph.creation_order().unwrap();
        let position: HashMap<_, _> = order.iter().enumerate().map(|(i, id)| (*id, i)).collect();

        prop_assert_eq!(order.len(), stack.graph.len());
        for (dependent, dependency) in stack.graph.edges() {
            prop_assert!(position[dependency] < position[dependent]);
        }

        let mut reversed = order.clone();
        reversed.reverse();
        prop_assert_eq!(stack.graph.teardown_order().unwrap(), reversed);
    }

    /// Property: No wave contains both ends of an edge
    #[test]
    fn prop_waves_are_independent(config in stack_config()) {
        let stack = StackBuilder::new(config).synth().unwrap();
        let waves = stack.graph.creation_waves().unwrap();
        let wave_of: HashMap<_, _> = waves
            .iter()
            .enumerate()
            .flat_map(|(n, wave)| wave.iter().map(move |d| (&d.id, n)))
            .collect();

        for (dependent, dependency) in stack.graph.edges() {
            prop_assert!(wave_of[dependency] < wave_of[dependent]);
        }
    }

    /// Property: The database admits exactly one peer, the service
    #[test]
    fn prop_database_admits_only_the_service(config in stack_config()) {
        let enabled = config.database.enabled;
        let stack = StackBuilder::new(config).synth().unwrap();
        prop_assert_eq!(stack.database.is_some(), enabled);

        if let Some(database) = &stack.database {
            let Some(ResourceSpec::SecurityGroup(sg)) =
                stack.graph.get(&database.security_group).map(|d| &d.spec)
            else {
                panic!("database security group missing");
            };
            prop_assert_eq!(sg.ingress.len(), 1);
            prop_assert_eq!(
                &sg.ingress[0].peer,
                &Peer::SecurityGroup(stack.service.security_group.clone())
            );
            prop_assert_eq!(sg.ingress[0].port, database.port);
        }
    }
}
