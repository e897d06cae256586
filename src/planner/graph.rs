// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Dependency graph of plan nodes.
//!
//! Nodes live in an arena and are addressed by [`NodeId`]. A node may only
//! depend on nodes that are already in the arena, so the graph is acyclic by
//! construction and insertion order is always a valid realization order.

use crate::error::{PlannerError, Result};
use crate::planner::resources::Resource;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlanNode {
    pub id: NodeId,
    pub name: String,
    pub resource: Resource,
    pub depends_on: Vec<NodeId>,
}

#[derive(Serialize, Clone, Debug, Default)]
pub struct PlanGraph {
    nodes: Vec<PlanNode>,
    #[serde(skip)]
    by_name: BTreeMap<String, NodeId>,
}

impl PlanGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node. Names are unique and every dependency must already exist.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        resource: Resource,
        depends_on: &[NodeId],
    ) -> Result<NodeId> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(PlannerError::InvalidConfiguration(format!(
                "duplicate plan node '{}'",
                name
            )));
        }

        let id = NodeId(self.nodes.len());
        if let Some(missing) = depends_on.iter().find(|d| d.0 >= id.0) {
            return Err(PlannerError::InvalidConfiguration(format!(
                "plan node '{}' depends on unknown node #{}",
                name, missing.0
            )));
        }

        let mut deps: Vec<NodeId> = depends_on.to_vec();
        deps.sort();
        deps.dedup();

        self.by_name.insert(name.clone(), id);
        self.nodes.push(PlanNode {
            id,
            name,
            resource,
            depends_on: deps,
        });
        Ok(id)
    }

    pub fn get(&self, id: NodeId) -> &PlanNode {
        &self.nodes[id.0]
    }

    pub fn find(&self, name: &str) -> Option<&PlanNode> {
        self.by_name.get(name).map(|id| &self.nodes[id.0])
    }

    pub fn id_of(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(name).copied()
    }

    pub fn nodes(&self) -> &[PlanNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// True when `upstream` must be realized before `node`, directly or transitively
    pub fn precedes(&self, upstream: NodeId, node: NodeId) -> bool {
        let mut stack = vec![node];
        let mut seen = BTreeSet::new();
        while let Some(current) = stack.pop() {
            for dep in &self.nodes[current.0].depends_on {
                if *dep == upstream {
                    return true;
                }
                if seen.insert(*dep) {
                    stack.push(*dep);
                }
            }
        }
        false
    }

    /// Group nodes into waves; every member of a wave only depends on nodes
    /// in earlier waves, so a wave can be realized in parallel.
    pub fn waves(&self) -> Vec<Vec<NodeId>> {
        let mut level = vec![0usize; self.nodes.len()];
        let mut waves: Vec<Vec<NodeId>> = Vec::new();

        for node in &self.nodes {
            let l = node
                .depends_on
                .iter()
                .map(|d| level[d.0] + 1)
                .max()
                .unwrap_or(0);
            level[node.id.0] = l;
            if waves.len() <= l {
                waves.resize_with(l + 1, Vec::new);
            }
            waves[l].push(node.id);
        }

        waves
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::resources::NamespaceDescriptor;

    fn ns(name: &str) -> Resource {
        Resource::Namespace(NamespaceDescriptor {
            name: name.to_string(),
        })
    }

    #[test]
    fn test_add_rejects_duplicate_names() {
        let mut g = PlanGraph::new();
        g.add("a", ns("a"), &[]).unwrap();
        assert!(g.add("a", ns("a"), &[]).is_err());
    }

    #[test]
    fn test_add_rejects_forward_reference() {
        let mut g = PlanGraph::new();
        let a = g.add("a", ns("a"), &[]).unwrap();
        let bogus = NodeId(a.0 + 5);
        assert!(g.add("b", ns("b"), &[bogus]).is_err());
    }

    #[test]
    fn test_precedes_is_transitive() {
        let mut g = PlanGraph::new();
        let a = g.add("a", ns("a"), &[]).unwrap();
        let b = g.add("b", ns("b"), &[a]).unwrap();
        let c = g.add("c", ns("c"), &[b]).unwrap();
        let d = g.add("d", ns("d"), &[]).unwrap();

        assert!(g.precedes(a, c));
        assert!(g.precedes(b, c));
        assert!(!g.precedes(c, a));
        assert!(!g.precedes(d, c));
    }

    #[test]
    fn test_waves_group_independent_nodes() {
        let mut g = PlanGraph::new();
        let a = g.add("a", ns("a"), &[]).unwrap();
        let b = g.add("b", ns("b"), &[]).unwrap();
        let c = g.add("c", ns("c"), &[a, b]).unwrap();
        let d = g.add("d", ns("d"), &[a]).unwrap();

        let waves = g.waves();
        assert_eq!(waves, vec![vec![a, b], vec![c, d]]);
    }

    #[test]
    fn test_dependencies_are_deduplicated() {
        let mut g = PlanGraph::new();
        let a = g.add("a", ns("a"), &[]).unwrap();
        let b = g.add("b", ns("b"), &[a, a]).unwrap();
        assert_eq!(g.get(b).depends_on, vec![a]);
        assert_eq!(g.find("b").map(|n| n.id), Some(b));
    }
}
