// Copyright (c) 2025 - Cowboy AI, Inc.
//! Provisioning Graph
//!
//! An explicit DAG of [`ResourceDescriptor`]s. Edges point from a dependent
//! to the resource it needs. Creation proceeds in waves computed with Kahn's
//! algorithm; members of a wave have no edges between them and may be created
//! concurrently. Teardown is the exact reverse.
//!
//! Ordering is deterministic: within a wave, resources appear in insertion
//! order.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut graph = ProvisioningGraph::new();
//! graph.add_resource(vpc)?;
//! graph.add_resource(security_group)?;
//! graph.add_dependency(&security_group_id, &vpc_id)?;
//!
//! for wave in graph.creation_waves()? {
//!     // create every member of `wave` concurrently
//! }
//! ```

mod descriptor;

pub use descriptor::{
    attributes, HostedZoneLookup, OutputRef, OutputTable, ResourceDescriptor, ResourceOutputs,
    ResourceSpec,
};

use std::collections::{BTreeSet, HashMap, VecDeque};

use crate::domain::{IngressRule, ResourceId, ResourceKind};
use crate::errors::{ProvisionError, ProvisionResult};

/// Directed acyclic graph of resources
#[derive(Debug, Clone, Default)]
pub struct ProvisioningGraph {
    nodes: Vec<ResourceDescriptor>,
    index: HashMap<ResourceId, usize>,
    /// node -> nodes it depends on
    dependencies: Vec<BTreeSet<usize>>,
    /// node -> nodes depending on it
    dependents: Vec<BTreeSet<usize>>,
}

impl ProvisioningGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.index.contains_key(id)
    }

    /// Add a resource; ids must be unique
    pub fn add_resource(&mut self, descriptor: ResourceDescriptor) -> ProvisionResult<ResourceId> {
        if self.index.contains_key(&descriptor.id) {
            return Err(ProvisionError::DuplicateResource(descriptor.id));
        }

        let id = descriptor.id.clone();
        self.index.insert(id.clone(), self.nodes.len());
        self.nodes.push(descriptor);
        self.dependencies.push(BTreeSet::new());
        self.dependents.push(BTreeSet::new());
        Ok(id)
    }

    /// Record that `dependent` must be created after `dependency`
    ///
    /// Both resources must already be in the graph. Edges that would close a
    /// cycle are rejected, so the graph stays acyclic at all times.
    pub fn add_dependency(
        &mut self,
        dependent: &ResourceId,
        dependency: &ResourceId,
    ) -> ProvisionResult<()> {
        let missing = |id: &ResourceId| ProvisionError::MissingDependency {
            resource: dependent.clone(),
            dependency: id.clone(),
        };
        let from = *self.index.get(dependent).ok_or_else(|| missing(dependent))?;
        let to = *self.index.get(dependency).ok_or_else(|| missing(dependency))?;

        if from == to || self.reaches(to, from) {
            return Err(ProvisionError::DependencyCycle(vec![
                dependent.clone(),
                dependency.clone(),
            ]));
        }

        self.dependencies[from].insert(to);
        self.dependents[to].insert(from);
        Ok(())
    }

    /// Authorize ingress on a security group and order it after its peer
    pub fn add_ingress_rule(
        &mut self,
        group: &ResourceId,
        rule: IngressRule,
    ) -> ProvisionResult<bool> {
        match self.get(group).map(|d| d.kind()) {
            Some(ResourceKind::SecurityGroup) => {}
            Some(other) => {
                return Err(ProvisionError::Validation(format!(
                    "{group} is a {other}, not a security group"
                )))
            }
            None => {
                return Err(ProvisionError::Validation(format!(
                    "Unknown security group: {group}"
                )))
            }
        }

        if let Some(peer) = rule.peer.security_group().cloned() {
            self.add_dependency(group, &peer)?;
        }

        match self.get_mut(group).map(|d| &mut d.spec) {
            Some(ResourceSpec::SecurityGroup(sg)) => Ok(sg.add_ingress_rule(rule)),
            _ => Ok(false),
        }
    }

    pub fn get(&self, id: &ResourceId) -> Option<&ResourceDescriptor> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn get_mut(&mut self, id: &ResourceId) -> Option<&mut ResourceDescriptor> {
        match self.index.get(id) {
            Some(&i) => self.nodes.get_mut(i),
            None => None,
        }
    }

    /// Resources in insertion order
    pub fn descriptors(&self) -> impl Iterator<Item = &ResourceDescriptor> {
        self.nodes.iter()
    }

    /// Direct dependencies of a resource, in insertion order
    pub fn dependencies_of(&self, id: &ResourceId) -> Vec<&ResourceId> {
        self.index
            .get(id)
            .map(|&i| {
                self.dependencies[i]
                    .iter()
                    .map(|&j| &self.nodes[j].id)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Direct dependents of a resource, in insertion order
    pub fn dependents_of(&self, id: &ResourceId) -> Vec<&ResourceId> {
        self.index
            .get(id)
            .map(|&i| self.dependents[i].iter().map(|&j| &self.nodes[j].id).collect())
            .unwrap_or_default()
    }

    /// Every edge as `(dependent, dependency)`
    pub fn edges(&self) -> Vec<(&ResourceId, &ResourceId)> {
        self.dependencies
            .iter()
            .enumerate()
            .flat_map(|(from, deps)| {
                deps.iter()
                    .map(move |&to| (&self.nodes[from].id, &self.nodes[to].id))
            })
            .collect()
    }

    /// Check the graph is acyclic
    pub fn validate(&self) -> ProvisionResult<()> {
        self.waves().map(|_| ())
    }

    /// Batches of resources that can be created concurrently
    pub fn creation_waves(&self) -> ProvisionResult<Vec<Vec<&ResourceDescriptor>>> {
        Ok(self
            .waves()?
            .into_iter()
            .map(|wave| wave.into_iter().map(|i| &self.nodes[i]).collect())
            .collect())
    }

    /// Flattened creation order
    pub fn creation_order(&self) -> ProvisionResult<Vec<&ResourceId>> {
        Ok(self
            .waves()?
            .into_iter()
            .flatten()
            .map(|i| &self.nodes[i].id)
            .collect())
    }

    /// Creation waves reversed, each wave reversed
    pub fn teardown_waves(&self) -> ProvisionResult<Vec<Vec<&ResourceDescriptor>>> {
        let mut waves = self.creation_waves()?;
        waves.reverse();
        for wave in &mut waves {
            wave.reverse();
        }
        Ok(waves)
    }

    /// Exact reverse of [`creation_order`](Self::creation_order)
    pub fn teardown_order(&self) -> ProvisionResult<Vec<&ResourceId>> {
        let mut order = self.creation_order()?;
        order.reverse();
        Ok(order)
    }

    /// Whether `to` is reachable from `from` along dependency edges
    fn reaches(&self, from: usize, to: usize) -> bool {
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = vec![from];
        while let Some(node) = stack.pop() {
            if node == to {
                return true;
            }
            if std::mem::replace(&mut seen[node], true) {
                continue;
            }
            stack.extend(self.dependencies[node].iter().copied());
        }
        false
    }

    /// Kahn's algorithm, one level at a time
    fn waves(&self) -> ProvisionResult<Vec<Vec<usize>>> {
        let mut remaining: Vec<usize> = self.dependencies.iter().map(BTreeSet::len).collect();
        let mut ready: VecDeque<usize> = (0..self.nodes.len())
            .filter(|&i| remaining[i] == 0)
            .collect();
        let mut waves = Vec::new();
        let mut placed = 0;

        while !ready.is_empty() {
            let mut wave: Vec<usize> = ready.drain(..).collect();
            wave.sort_unstable();

            let mut next = Vec::new();
            for &node in &wave {
                for &dependent in &self.dependents[node] {
                    remaining[dependent] -= 1;
                    if remaining[dependent] == 0 {
                        next.push(dependent);
                    }
                }
            }

            placed += wave.len();
            waves.push(wave);
            ready.extend(next);
        }

        if placed != self.nodes.len() {
            let stuck = (0..self.nodes.len())
                .filter(|&i| remaining[i] > 0)
                .map(|i| self.nodes[i].id.clone())
                .collect();
            return Err(ProvisionError::DependencyCycle(stuck));
        }

        Ok(waves)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        DomainName, GenerationPolicy, Peer, SecretDefinition, SecretRef, SecretSchema,
        SecurityGroup,
    };
    use pretty_assertions::assert_eq;

    fn id(s: &str) -> ResourceId {
        ResourceId::new(s).unwrap()
    }

    fn zone(name: &str) -> ResourceDescriptor {
        ResourceDescriptor::new(
            id(name),
            ResourceSpec::HostedZone(HostedZoneLookup {
                domain: DomainName::new("example.com").unwrap(),
            }),
        )
    }

    fn secret(name: &str) -> ResourceDescriptor {
        ResourceDescriptor::new(
            id(name),
            ResourceSpec::Secret(SecretDefinition {
                reference: SecretRef::new(id(name), name),
                schema: SecretSchema::default(),
                policy: GenerationPolicy::random("k", ""),
            }),
        )
    }

    fn sg(name: &str) -> ResourceDescriptor {
        ResourceDescriptor::new(
            id(name),
            ResourceSpec::SecurityGroup(SecurityGroup::new(id(name), id("Vpc"), name)),
        )
    }

    fn names<'a>(ids: impl IntoIterator<Item = &'a ResourceId>) -> Vec<&'a str> {
        ids.into_iter().map(ResourceId::as_str).collect()
    }

    #[test]
    fn test_duplicate_resource_rejected() {
        let mut graph = ProvisioningGraph::new();
        graph.add_resource(zone("Zone")).unwrap();
        assert!(matches!(
            graph.add_resource(zone("Zone")),
            Err(ProvisionError::DuplicateResource(_))
        ));
    }

    #[test]
    fn test_dangling_dependency_rejected() {
        let mut graph = ProvisioningGraph::new();
        graph.add_resource(zone("Zone")).unwrap();
        let result = graph.add_dependency(&id("Zone"), &id("Missing"));
        assert!(matches!(
            result,
            Err(ProvisionError::MissingDependency { .. })
        ));
    }

    #[test]
    fn test_cycle_rejected() {
        let mut graph = ProvisioningGraph::new();
        graph.add_resource(secret("A")).unwrap();
        graph.add_resource(secret("B")).unwrap();
        graph.add_resource(secret("C")).unwrap();
        graph.add_dependency(&id("B"), &id("A")).unwrap();
        graph.add_dependency(&id("C"), &id("B")).unwrap();

        assert!(matches!(
            graph.add_dependency(&id("A"), &id("C")),
            Err(ProvisionError::DependencyCycle(_))
        ));
        assert!(graph.add_dependency(&id("A"), &id("A")).is_err());
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn test_waves_follow_insertion_order() {
        let mut graph = ProvisioningGraph::new();
        for name in ["Vpc", "Zone", "Cert", "Secret"] {
            graph.add_resource(secret(name)).unwrap();
        }
        graph.add_dependency(&id("Cert"), &id("Zone")).unwrap();

        let waves: Vec<Vec<&str>> = graph
            .creation_waves()
            .unwrap()
            .into_iter()
            .map(|wave| wave.into_iter().map(|d| d.id.as_str()).collect())
            .collect();
        assert_eq!(waves, vec![vec!["Vpc", "Zone", "Secret"], vec!["Cert"]]);

        assert_eq!(
            names(graph.teardown_order().unwrap()),
            vec!["Cert", "Secret", "Zone", "Vpc"]
        );
    }

    #[test]
    fn test_teardown_waves_flatten_to_reverse_order() {
        let mut graph = ProvisioningGraph::new();
        for name in ["A", "B", "C", "D"] {
            graph.add_resource(secret(name)).unwrap();
        }
        graph.add_dependency(&id("C"), &id("A")).unwrap();
        graph.add_dependency(&id("D"), &id("C")).unwrap();
        graph.add_dependency(&id("D"), &id("B")).unwrap();

        let flattened: Vec<&str> = graph
            .teardown_waves()
            .unwrap()
            .into_iter()
            .flatten()
            .map(|d| d.id.as_str())
            .collect();
        assert_eq!(flattened, names(graph.teardown_order().unwrap()));
        assert_eq!(names(graph.dependencies_of(&id("D"))), vec!["B", "C"]);
        assert_eq!(names(graph.dependents_of(&id("A"))), vec!["C"]);
    }

    #[test]
    fn test_ingress_rule_adds_edge() {
        let mut graph = ProvisioningGraph::new();
        graph.add_resource(sg("EcsSg")).unwrap();
        graph.add_resource(sg("DbSg")).unwrap();

        let rule = IngressRule::tcp(Peer::SecurityGroup(id("EcsSg")), 27017, "db");
        assert!(graph.add_ingress_rule(&id("DbSg"), rule.clone()).unwrap());
        assert!(!graph.add_ingress_rule(&id("DbSg"), rule).unwrap());

        assert_eq!(names(graph.dependencies_of(&id("DbSg"))), vec!["EcsSg"]);
        assert_eq!(graph.edges().len(), 1);
    }

    #[test]
    fn test_ingress_rule_requires_known_peer() {
        let mut graph = ProvisioningGraph::new();
        graph.add_resource(sg("DbSg")).unwrap();
        let rule = IngressRule::tcp(Peer::SecurityGroup(id("Nope")), 27017, "db");
        assert!(graph.add_ingress_rule(&id("DbSg"), rule).is_err());
    }
}
