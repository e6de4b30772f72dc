// src/plan/graph.rs

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::errors::{QueuedagError, Result};
use crate::plan::step::{Step, StepKey};

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone, Default)]
struct PlanNode {
    /// Direct dependencies that are steps of this plan.
    deps: Vec<StepKey>,
    /// Direct dependents: steps that depend on this one.
    dependents: Vec<StepKey>,
}

/// Adjacency information for the steps of a plan, keyed by step key.
///
/// Dependencies on keys outside the plan are not represented here; the plan
/// checks them against its externally-satisfied set.
#[derive(Debug, Clone, Default)]
pub struct PlanGraph {
    nodes: HashMap<StepKey, PlanNode>,
}

impl PlanGraph {
    /// Build the graph and reject cycles.
    pub fn build(steps: &[Step]) -> Result<Self> {
        let mut nodes: HashMap<StepKey, PlanNode> = steps
            .iter()
            .map(|s| (s.key.clone(), PlanNode::default()))
            .collect();

        for step in steps {
            for dep in &step.deps {
                if let Some(dep_node) = nodes.get_mut(dep) {
                    dep_node.dependents.push(step.key.clone());
                } else {
                    continue;
                }
                if let Some(node) = nodes.get_mut(&step.key) {
                    node.deps.push(dep.clone());
                }
            }
        }

        let graph = Self { nodes };
        graph.ensure_acyclic(steps)?;
        Ok(graph)
    }

    fn ensure_acyclic(&self, steps: &[Step]) -> Result<()> {
        // Edge direction: dep -> step.
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

        for step in steps {
            graph.add_node(step.key.as_str());
        }
        for step in steps {
            for dep in self.dependencies_of(&step.key) {
                graph.add_edge(dep.as_str(), step.key.as_str(), ());
            }
        }

        match toposort(&graph, None) {
            Ok(_order) => Ok(()),
            Err(cycle) => Err(QueuedagError::DagCycle(format!(
                "cycle detected in plan involving step '{}'",
                cycle.node_id()
            ))),
        }
    }

    /// Immediate in-plan dependencies of a step.
    pub fn dependencies_of(&self, key: &str) -> &[StepKey] {
        self.nodes
            .get(key)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a step.
    pub fn dependents_of(&self, key: &str) -> &[StepKey] {
        self.nodes
            .get(key)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }
}
