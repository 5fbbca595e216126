// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource Lifecycle State Machine
//!
//! Tracks one graph node through apply and teardown.
//!
//! # States
//!
//! - Planned: in the graph, nothing done yet
//! - Imported: looked up during preflight, never created or deleted
//! - Creating / Created: provider call in flight / succeeded
//! - Failed: provider call failed (terminal for this run)
//! - Deleting / Deleted: teardown in flight / succeeded
//! - Retained: left in place on teardown
//!
//! # Inputs
//!
//! - BeginCreate: Planned → Creating
//! - CreateSucceeded: Creating → Created
//! - CreateFailed: Creating → Failed
//! - Import: Planned → Imported
//! - BeginDelete: Created → Deleting
//! - DeleteSucceeded: Deleting → Deleted
//! - DeleteFailed: Deleting → Failed
//! - Retain: Created | Imported → Retained
//!
//! Every accepted input yields the [`LifecycleChange`] published as a
//! provisioning event.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{StateMachine, TransitionError, TransitionResult};

/// Lifecycle state of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceLifecycle {
    #[default]
    Planned,
    Imported,
    Creating,
    Created,
    Failed,
    Deleting,
    Deleted,
    Retained,
}

impl ResourceLifecycle {
    /// Whether the resource exists in the provider after this state
    pub fn exists(&self) -> bool {
        matches!(
            self,
            ResourceLifecycle::Created | ResourceLifecycle::Deleting | ResourceLifecycle::Imported
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ResourceLifecycle::Failed | ResourceLifecycle::Deleted | ResourceLifecycle::Retained
        )
    }
}

impl fmt::Display for ResourceLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceLifecycle::Planned => "planned",
            ResourceLifecycle::Imported => "imported",
            ResourceLifecycle::Creating => "creating",
            ResourceLifecycle::Created => "created",
            ResourceLifecycle::Failed => "failed",
            ResourceLifecycle::Deleting => "deleting",
            ResourceLifecycle::Deleted => "deleted",
            ResourceLifecycle::Retained => "retained",
        };
        write!(f, "{name}")
    }
}

/// Lifecycle input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "reason")]
pub enum LifecycleInput {
    BeginCreate,
    CreateSucceeded,
    CreateFailed(String),
    Import,
    BeginDelete,
    DeleteSucceeded,
    DeleteFailed(String),
    Retain,
}

/// Observable change produced by a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleChange {
    Creating,
    Created,
    Failed,
    Imported,
    Deleting,
    Deleted,
    Retained,
}

impl LifecycleChange {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleChange::Creating => "creating",
            LifecycleChange::Created => "created",
            LifecycleChange::Failed => "failed",
            LifecycleChange::Imported => "imported",
            LifecycleChange::Deleting => "deleting",
            LifecycleChange::Deleted => "deleted",
            LifecycleChange::Retained => "retained",
        }
    }
}

impl fmt::Display for LifecycleChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl StateMachine for ResourceLifecycle {
    type Input = LifecycleInput;
    type Output = LifecycleChange;

    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)> {
        use LifecycleInput::*;
        use ResourceLifecycle as S;

        match (self, input) {
            (S::Planned, BeginCreate) => Ok((S::Creating, LifecycleChange::Creating)),
            (S::Planned, Import) => Ok((S::Imported, LifecycleChange::Imported)),

            (S::Creating, CreateSucceeded) => Ok((S::Created, LifecycleChange::Created)),
            (S::Creating, CreateFailed(_)) => Ok((S::Failed, LifecycleChange::Failed)),

            (S::Created, BeginDelete) => Ok((S::Deleting, LifecycleChange::Deleting)),
            (S::Created | S::Imported, Retain) => Ok((S::Retained, LifecycleChange::Retained)),

            (S::Deleting, DeleteSucceeded) => Ok((S::Deleted, LifecycleChange::Deleted)),
            (S::Deleting, DeleteFailed(_)) => Ok((S::Failed, LifecycleChange::Failed)),

            (from, input) => Err(TransitionError::new(from, input)),
        }
    }

    fn valid_inputs(&self) -> Vec<Self::Input> {
        use LifecycleInput::*;

        match self {
            ResourceLifecycle::Planned => vec![BeginCreate, Import],
            ResourceLifecycle::Creating => {
                vec![CreateSucceeded, CreateFailed(String::new())]
            }
            ResourceLifecycle::Created => vec![BeginDelete, Retain],
            ResourceLifecycle::Imported => vec![Retain],
            ResourceLifecycle::Deleting => {
                vec![DeleteSucceeded, DeleteFailed(String::new())]
            }
            ResourceLifecycle::Failed
            | ResourceLifecycle::Deleted
            | ResourceLifecycle::Retained => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    const ALL_STATES: [ResourceLifecycle; 8] = [
        ResourceLifecycle::Planned,
        ResourceLifecycle::Imported,
        ResourceLifecycle::Creating,
        ResourceLifecycle::Created,
        ResourceLifecycle::Failed,
        ResourceLifecycle::Deleting,
        ResourceLifecycle::Deleted,
        ResourceLifecycle::Retained,
    ];

    #[test_case(ResourceLifecycle::Planned, LifecycleInput::BeginCreate, ResourceLifecycle::Creating ; "begin create")]
    #[test_case(ResourceLifecycle::Creating, LifecycleInput::CreateSucceeded, ResourceLifecycle::Created ; "create succeeded")]
    #[test_case(ResourceLifecycle::Creating, LifecycleInput::CreateFailed("boom".into()), ResourceLifecycle::Failed ; "create failed")]
    #[test_case(ResourceLifecycle::Planned, LifecycleInput::Import, ResourceLifecycle::Imported ; "import")]
    #[test_case(ResourceLifecycle::Created, LifecycleInput::BeginDelete, ResourceLifecycle::Deleting ; "begin delete")]
    #[test_case(ResourceLifecycle::Deleting, LifecycleInput::DeleteSucceeded, ResourceLifecycle::Deleted ; "delete succeeded")]
    #[test_case(ResourceLifecycle::Created, LifecycleInput::Retain, ResourceLifecycle::Retained ; "retain created")]
    #[test_case(ResourceLifecycle::Imported, LifecycleInput::Retain, ResourceLifecycle::Retained ; "retain imported")]
    fn test_valid_transitions(from: ResourceLifecycle, input: LifecycleInput, to: ResourceLifecycle) {
        let (next, _) = from.transition(&input).unwrap();
        assert_eq!(next, to);
    }

    #[test]
    fn test_imported_resources_cannot_be_deleted() {
        assert!(ResourceLifecycle::Imported
            .transition(&LifecycleInput::BeginDelete)
            .is_err());
    }

    #[test]
    fn test_terminal_states_accept_nothing() {
        for state in ALL_STATES.iter().filter(|s| s.is_terminal()) {
            assert!(state.valid_inputs().is_empty());
            assert!(!state.can_transition(&LifecycleInput::BeginCreate));
        }
    }

    #[test]
    fn test_valid_inputs_are_accepted() {
        for state in ALL_STATES {
            for input in state.valid_inputs() {
                assert!(state.can_transition(&input), "{state} rejects {input:?}");
            }
        }
    }
}
