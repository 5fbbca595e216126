// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Target Health
//!
//! A target changes state only after a full run of consecutive probe
//! results: `unhealthy_threshold` failures to go unhealthy and
//! `healthy_threshold` successes to go (or come back) healthy.

use backend_stack::provision::TargetGroupHealth;
use backend_stack::state_machine::{HealthCheck, ProbeOutcome, TargetHealth, TargetState};
use proptest::prelude::*;

fn outcome() -> impl Strategy<Value = ProbeOutcome> {
    prop_oneof![Just(ProbeOutcome::Success), Just(ProbeOutcome::Failure)]
}

fn check(healthy: u32, unhealthy: u32) -> HealthCheck {
    HealthCheck {
        healthy_threshold: healthy,
        unhealthy_threshold: unhealthy,
        ..HealthCheck::default()
    }
}

/// Length of the run of `outcome` at the end of `history`
fn trailing(history: &[ProbeOutcome], outcome: ProbeOutcome) -> u32 {
    history.iter().rev().take_while(|o| **o == outcome).count() as u32
}

proptest! {
    /// Property: State changes only at the end of a full run
    #[test]
    fn prop_changes_need_consecutive_runs(
        healthy in 1u32..=5,
        unhealthy in 1u32..=5,
        probes in prop::collection::vec(outcome(), 0..60),
    ) {
        let mut target = TargetHealth::new(&check(healthy, unhealthy));
        let mut history = Vec::new();

        for probe in probes {
            history.push(probe);
            let changed = target.record(probe);

            match changed {
                Some(TargetState::Unhealthy) => {
                    prop_assert!(trailing(&history, ProbeOutcome::Failure) >= unhealthy);
                }
                Some(TargetState::Healthy) => {
                    prop_assert!(trailing(&history, ProbeOutcome::Success) >= healthy);
                }
                Some(TargetState::Initial) => prop_assert!(false, "never returns to initial"),
                None => {}
            }

            if trailing(&history, ProbeOutcome::Failure) >= unhealthy {
                prop_assert_eq!(target.state, TargetState::Unhealthy);
            }
            if trailing(&history, ProbeOutcome::Success) >= healthy {
                prop_assert_eq!(target.state, TargetState::Healthy);
            }
            prop_assert_eq!(target.receives_traffic(), target.state == TargetState::Healthy);
        }
    }

    /// Property: Fewer than the threshold of failures never removes a healthy target
    #[test]
    fn prop_short_failure_runs_keep_target_healthy(
        healthy in 1u32..=5,
        unhealthy in 2u32..=6,
        runs in prop::collection::vec(1u32..6, 1..10),
    ) {
        let mut target = TargetHealth::new(&check(healthy, unhealthy));
        for _ in 0..healthy {
            target.record(ProbeOutcome::Success);
        }
        prop_assert_eq!(target.state, TargetState::Healthy);

        for run in runs {
            for _ in 0..run.min(unhealthy - 1) {
                target.record(ProbeOutcome::Failure);
            }
            target.record(ProbeOutcome::Success);
            prop_assert_eq!(target.state, TargetState::Healthy);
        }
    }

    /// Property: Probing a group agrees with replaying each target's outcomes
    #[test]
    fn prop_group_probes_match_single_targets(
        healthy in 1u32..=4,
        unhealthy in 1u32..=4,
        rounds in prop::collection::vec(prop::collection::vec(any::<bool>(), 3), 0..20),
    ) {
        let check = check(healthy, unhealthy);
        let targets = ["10.0.0.10", "10.0.1.10", "10.0.2.10"];
        let mut group = TargetGroupHealth::new(check.clone());
        let mut expected: Vec<TargetHealth> =
            targets.iter().map(|_| TargetHealth::new(&check)).collect();
        for target in targets {
            group.register(target);
        }

        for round in &rounds {
            tokio_test::block_on(group.probe_all(|target| {
                let index = targets.iter().position(|t| *t == target);
                let up = index.map(|i| round[i]).unwrap_or(false);
                async move { up }
            }));
            for (health, up) in expected.iter_mut().zip(round) {
                let outcome = if *up { ProbeOutcome::Success } else { ProbeOutcome::Failure };
                health.record(outcome);
            }

            for (target, health) in targets.iter().zip(&expected) {
                prop_assert_eq!(group.state_of(target), Some(health.state));
            }
        }
    }
}
