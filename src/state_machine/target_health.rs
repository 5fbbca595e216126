// Copyright (c) 2025 - Cowboy AI, Inc.
//! Target Health State Machine
//!
//! Load balancer view of one registered target. Probes arrive every
//! `interval`; a probe that does not finish within `timeout` counts as a
//! failure.
//!
//! ```text
//! Initial ──(healthy_threshold successes)──▶ Healthy
//! Initial ──(unhealthy_threshold failures)─▶ Unhealthy
//! Healthy ──(unhealthy_threshold failures)─▶ Unhealthy
//! Unhealthy ─(healthy_threshold successes)─▶ Healthy
//! ```
//!
//! Counters are consecutive: a success clears the failure count and a
//! failure clears the success count. Only `Healthy` targets receive traffic.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;

use super::{StateInvariant, StateMachine, TransitionResult};
use crate::errors::{ProvisionError, ProvisionResult};

/// Protocol used for health probes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthProtocol {
    #[default]
    Http,
    Https,
}

impl fmt::Display for HealthProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthProtocol::Http => write!(f, "HTTP"),
            HealthProtocol::Https => write!(f, "HTTPS"),
        }
    }
}

/// Health check configuration of a target group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheck {
    pub path: String,
    pub interval_secs: u64,
    pub timeout_secs: u64,
    pub healthy_threshold: u32,
    pub unhealthy_threshold: u32,
    pub protocol: HealthProtocol,
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self {
            path: "/health".to_string(),
            interval_secs: 30,
            timeout_secs: 5,
            healthy_threshold: 2,
            unhealthy_threshold: 3,
            protocol: HealthProtocol::Http,
        }
    }
}

impl HealthCheck {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> ProvisionResult<()> {
        if !self.path.starts_with('/') {
            return Err(ProvisionError::Validation(format!(
                "Health check path must start with '/': {}",
                self.path
            )));
        }
        if self.healthy_threshold == 0 || self.unhealthy_threshold == 0 {
            return Err(ProvisionError::Validation(
                "Health check thresholds must be at least 1".into(),
            ));
        }
        if self.timeout_secs == 0 || self.timeout_secs >= self.interval_secs {
            return Err(ProvisionError::Validation(format!(
                "Health check timeout {}s must be positive and shorter than the interval {}s",
                self.timeout_secs, self.interval_secs
            )));
        }
        Ok(())
    }
}

/// Health state of a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetState {
    #[default]
    Initial,
    Healthy,
    Unhealthy,
}

impl fmt::Display for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetState::Initial => write!(f, "initial"),
            TargetState::Healthy => write!(f, "healthy"),
            TargetState::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Result of one probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeOutcome {
    Success,
    Failure,
}

/// Health of one target with its consecutive counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetHealth {
    pub state: TargetState,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
    healthy_threshold: u32,
    unhealthy_threshold: u32,
}

impl TargetHealth {
    pub fn new(check: &HealthCheck) -> Self {
        Self {
            state: TargetState::Initial,
            consecutive_successes: 0,
            consecutive_failures: 0,
            healthy_threshold: check.healthy_threshold.max(1),
            unhealthy_threshold: check.unhealthy_threshold.max(1),
        }
    }

    /// Apply a probe result in place, returning the new state if it changed
    pub fn record(&mut self, outcome: ProbeOutcome) -> Option<TargetState> {
        // Every outcome is a valid input in every state.
        match self.transition(&outcome) {
            Ok((next, changed)) => {
                *self = next;
                changed
            }
            Err(_) => None,
        }
    }

    pub fn receives_traffic(&self) -> bool {
        self.state == TargetState::Healthy
    }
}

impl StateMachine for TargetHealth {
    type Input = ProbeOutcome;
    /// New state when the probe caused a state change
    type Output = Option<TargetState>;

    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)> {
        let mut next = self.clone();

        let target = match input {
            ProbeOutcome::Success => {
                next.consecutive_successes = next.consecutive_successes.saturating_add(1);
                next.consecutive_failures = 0;
                (next.state != TargetState::Healthy
                    && next.consecutive_successes >= next.healthy_threshold)
                    .then_some(TargetState::Healthy)
            }
            ProbeOutcome::Failure => {
                next.consecutive_failures = next.consecutive_failures.saturating_add(1);
                next.consecutive_successes = 0;
                (next.state != TargetState::Unhealthy
                    && next.consecutive_failures >= next.unhealthy_threshold)
                    .then_some(TargetState::Unhealthy)
            }
        };

        if let Some(state) = target {
            next.state = state;
        }
        Ok((next, target))
    }

    fn valid_inputs(&self) -> Vec<Self::Input> {
        vec![ProbeOutcome::Success, ProbeOutcome::Failure]
    }
}

impl StateInvariant for TargetHealth {
    fn check_invariants(&self) -> Result<(), String> {
        if self.consecutive_successes > 0 && self.consecutive_failures > 0 {
            return Err(format!(
                "both counters non-zero: {} successes, {} failures",
                self.consecutive_successes, self.consecutive_failures
            ));
        }
        Ok(())
    }
}

/// Run one probe, treating a timeout as a failure
pub async fn probe_with_timeout<F>(timeout: Duration, probe: F) -> ProbeOutcome
where
    F: Future<Output = bool>,
{
    match tokio::time::timeout(timeout, probe).await {
        Ok(true) => ProbeOutcome::Success,
        Ok(false) | Err(_) => ProbeOutcome::Failure,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(health: &mut TargetHealth, outcomes: &[ProbeOutcome]) {
        for outcome in outcomes {
            health.record(*outcome);
            health.check_invariants().unwrap();
        }
    }

    #[test]
    fn test_defaults() {
        let check = HealthCheck::default();
        assert_eq!(check.path, "/health");
        assert_eq!(check.interval(), Duration::from_secs(30));
        assert_eq!(check.timeout(), Duration::from_secs(5));
        assert_eq!(check.healthy_threshold, 2);
        assert_eq!(check.unhealthy_threshold, 3);
        assert_eq!(check.protocol, HealthProtocol::Http);
        assert!(check.validate().is_ok());
    }

    #[test]
    fn test_becomes_healthy_after_threshold() {
        let mut health = TargetHealth::new(&HealthCheck::default());

        assert_eq!(health.record(ProbeOutcome::Success), None);
        assert!(!health.receives_traffic());
        assert_eq!(
            health.record(ProbeOutcome::Success),
            Some(TargetState::Healthy)
        );
        assert!(health.receives_traffic());
    }

    #[test]
    fn test_unhealthy_only_after_consecutive_failures() {
        let mut health = TargetHealth::new(&HealthCheck::default());
        run(&mut health, &[ProbeOutcome::Success, ProbeOutcome::Success]);

        run(
            &mut health,
            &[
                ProbeOutcome::Failure,
                ProbeOutcome::Failure,
                ProbeOutcome::Success,
                ProbeOutcome::Failure,
                ProbeOutcome::Failure,
            ],
        );
        assert_eq!(health.state, TargetState::Healthy);

        assert_eq!(
            health.record(ProbeOutcome::Failure),
            Some(TargetState::Unhealthy)
        );
        assert!(!health.receives_traffic());
    }

    #[test]
    fn test_recovers_after_healthy_threshold() {
        let mut health = TargetHealth::new(&HealthCheck::default());
        run(&mut health, &[ProbeOutcome::Failure; 3]);
        assert_eq!(health.state, TargetState::Unhealthy);

        run(&mut health, &[ProbeOutcome::Success, ProbeOutcome::Success]);
        assert_eq!(health.state, TargetState::Healthy);
    }

    #[test]
    fn test_invalid_check_rejected() {
        let check = HealthCheck {
            timeout_secs: 30,
            ..HealthCheck::default()
        };
        assert!(check.validate().is_err());

        let check = HealthCheck {
            path: "health".into(),
            ..HealthCheck::default()
        };
        assert!(check.validate().is_err());
    }

    #[tokio::test]
    async fn test_probe_timeout_is_failure() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            true
        };
        assert_eq!(
            probe_with_timeout(Duration::from_millis(10), slow).await,
            ProbeOutcome::Failure
        );
        assert_eq!(
            probe_with_timeout(Duration::from_millis(100), async { true }).await,
            ProbeOutcome::Success
        );
    }
}
