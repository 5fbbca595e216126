// Copyright (c) 2025 - Cowboy AI, Inc.

//! NATS subject hierarchy for provisioning events
//!
//! # Subject Pattern
//!
//! ```text
//! {root}.{kind}.{change}
//! ```
//!
//! The root defaults to `stack` and can be set per stack, which allows:
//! - Precise subscriptions (`stack.database_cluster.created`)
//! - Kind-level wildcards (`stack.certificate.>`)
//! - Global subscriptions (`stack.>`)
//!
//! # Examples
//!
//! ```rust
//! use backend_stack::domain::ResourceKind;
//! use backend_stack::state_machine::LifecycleChange;
//! use backend_stack::subjects::SubjectBuilder;
//!
//! let subject = SubjectBuilder::new(ResourceKind::DatabaseCluster)
//!     .change(LifecycleChange::Created)
//!     .build();
//! assert_eq!(subject, "stack.database_cluster.created");
//!
//! let wildcard = SubjectBuilder::new(ResourceKind::Certificate).build();
//! assert_eq!(wildcard, "stack.certificate.>");
//! ```

use crate::domain::ResourceKind;
use crate::state_machine::LifecycleChange;

/// Default root namespace for provisioning subjects
pub const STACK_ROOT: &str = "stack";

/// Builder for provisioning NATS subjects
#[derive(Debug, Clone)]
pub struct SubjectBuilder {
    root: String,
    kind: ResourceKind,
    change: Option<LifecycleChange>,
}

impl SubjectBuilder {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            root: STACK_ROOT.to_string(),
            kind,
            change: None,
        }
    }

    /// Use a different root, e.g. one per stack name
    pub fn root(mut self, root: impl Into<String>) -> Self {
        self.root = root.into();
        self
    }

    pub fn change(mut self, change: LifecycleChange) -> Self {
        self.change = Some(change);
        self
    }

    /// `{root}.{kind}.{change}`, or `{root}.{kind}.>` without a change
    pub fn build(self) -> String {
        match self.change {
            Some(change) => format!("{}.{}.{}", self.root, self.kind, change),
            None => format!("{}.{}.>", self.root, self.kind),
        }
    }

    /// Subscription for every provisioning event under `root`
    pub fn build_all(root: &str) -> String {
        format!("{}.>", root)
    }
}
