// Copyright (c) 2025 - Cowboy AI, Inc.
//! Finite State Machine Abstractions
//!
//! Generic state machine types shared by the provisioning lifecycle and the
//! load balancer's target health checks. Transitions are pure functions;
//! callers decide when to apply them and record history if they need it.
//!
//! # Machines
//!
//! - [`ResourceLifecycle`]: Planned → Creating → Created, down to Deleted or
//!   Retained on teardown
//! - [`TargetHealth`]: consecutive probe counting with thresholds
//!
//! Both are **Mealy machines**: the output depends on the current state and
//! the input.
//!
//! ```text
//! (State, Input) → (State, Output)
//! ```
//!
//! # Example
//!
//! ```rust
//! use backend_stack::state_machine::{
//!     LifecycleInput, ResourceLifecycle, StateMachine, StateMachineWithHistory,
//! };
//!
//! let mut fsm = StateMachineWithHistory::new(ResourceLifecycle::Planned);
//! fsm.transition_with_history(LifecycleInput::BeginCreate, chrono::Utc::now())
//!     .unwrap();
//! fsm.transition_with_history(LifecycleInput::CreateSucceeded, chrono::Utc::now())
//!     .unwrap();
//! assert_eq!(*fsm.current_state(), ResourceLifecycle::Created);
//! ```

pub mod resource_lifecycle;
pub mod target_health;

pub use resource_lifecycle::{LifecycleChange, LifecycleInput, ResourceLifecycle};
pub use target_health::{HealthCheck, HealthProtocol, ProbeOutcome, TargetHealth, TargetState};

use chrono::{DateTime, Utc};
use std::fmt;

pub type TransitionResult<S> = Result<S, TransitionError>;

/// Input not accepted in the current state
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid transition from {from} on {input}")]
pub struct TransitionError {
    pub from: String,
    pub input: String,
}

impl TransitionError {
    pub fn new(from: impl fmt::Display, input: impl fmt::Debug) -> Self {
        Self {
            from: from.to_string(),
            input: format!("{input:?}"),
        }
    }
}

/// Pure `(state, input) -> (state, output)` machine
pub trait StateMachine: Sized + Clone {
    type Input;
    type Output;

    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)>;

    fn can_transition(&self, input: &Self::Input) -> bool {
        self.transition(input).is_ok()
    }

    /// Inputs accepted in this state; empty for terminal states
    fn valid_inputs(&self) -> Vec<Self::Input>;
}

/// Consistency check run by tests after every transition
pub trait StateInvariant {
    fn check_invariants(&self) -> Result<(), String>;
}

/// One applied transition
#[derive(Debug, Clone)]
pub struct TransitionRecord<S, I> {
    pub from: S,
    pub to: S,
    pub input: I,
    pub at: DateTime<Utc>,
}

/// Machine plus the transitions applied to it, oldest first
#[derive(Debug, Clone)]
pub struct StateMachineWithHistory<M: StateMachine> {
    current: M,
    history: Vec<TransitionRecord<M, M::Input>>,
}

impl<M: StateMachine> StateMachineWithHistory<M> {
    pub fn new(initial: M) -> Self {
        Self {
            current: initial,
            history: Vec::new(),
        }
    }

    /// Apply `input`; a rejected input leaves state and history unchanged
    pub fn transition_with_history(
        &mut self,
        input: M::Input,
        at: DateTime<Utc>,
    ) -> TransitionResult<M::Output> {
        let (next, output) = self.current.transition(&input)?;
        let from = std::mem::replace(&mut self.current, next);
        self.history.push(TransitionRecord {
            from,
            to: self.current.clone(),
            input,
            at,
        });
        Ok(output)
    }

    pub fn history(&self) -> &[TransitionRecord<M, M::Input>] {
        &self.history
    }

    pub fn current_state(&self) -> &M {
        &self.current
    }
}
