// src/plan/mod.rs

//! Immutable execution plans.
//!
//! - [`step`] defines a single schedulable step.
//! - [`tags`] gives typed access to the recognised step and run tags.
//! - [`graph`] keeps dependency/dependent adjacency and rejects cycles.

pub mod graph;
pub mod step;
pub mod tags;

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::errors::{QueuedagError, Result};

pub use graph::PlanGraph;
pub use step::{Step, StepKey};
pub use tags::{RunTags, StepTags};

/// A DAG of steps plus the subset selected for this run.
///
/// Steps keep the order they were supplied in ("plan order"). Dependencies
/// must name either a step of the plan or a key listed as externally
/// satisfied. A dependency that is in the plan but not selected counts as
/// already satisfied.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    steps: Vec<Step>,
    index: HashMap<StepKey, usize>,
    graph: PlanGraph,
    selected: BTreeSet<StepKey>,
    external: BTreeSet<StepKey>,
}

impl ExecutionPlan {
    /// Build a plan that selects every step and has no external dependencies.
    pub fn new(steps: Vec<Step>) -> Result<Self> {
        Self::try_new(steps, None, Vec::new())
    }

    /// Build and validate a plan.
    ///
    /// `selected = None` selects every step.
    pub fn try_new(
        steps: Vec<Step>,
        selected: Option<Vec<StepKey>>,
        external: Vec<StepKey>,
    ) -> Result<Self> {
        let mut index = HashMap::with_capacity(steps.len());
        for (i, step) in steps.iter().enumerate() {
            if index.insert(step.key.clone(), i).is_some() {
                return Err(QueuedagError::PlanError(format!(
                    "duplicate step key '{}'",
                    step.key
                )));
            }
        }

        let external: BTreeSet<StepKey> = external.into_iter().collect();

        for step in &steps {
            for dep in &step.deps {
                if dep == &step.key {
                    return Err(QueuedagError::PlanError(format!(
                        "step '{}' cannot depend on itself",
                        step.key
                    )));
                }
                if !index.contains_key(dep) && !external.contains(dep) {
                    return Err(QueuedagError::PlanError(format!(
                        "step '{}' has unknown dependency '{}'",
                        step.key, dep
                    )));
                }
            }
        }

        let graph = PlanGraph::build(&steps)?;

        let selected: BTreeSet<StepKey> = match selected {
            None => steps.iter().map(|s| s.key.clone()).collect(),
            Some(keys) => {
                for key in &keys {
                    if !index.contains_key(key) {
                        return Err(QueuedagError::PlanError(format!(
                            "selected step '{key}' is not part of the plan"
                        )));
                    }
                }
                keys.into_iter().collect()
            }
        };

        debug!(
            steps = steps.len(),
            selected = selected.len(),
            external = external.len(),
            "execution plan built"
        );

        Ok(Self {
            steps,
            index,
            graph,
            selected,
            external,
        })
    }

    /// All steps, in plan order.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn get_step_by_key(&self, key: &str) -> Option<&Step> {
        self.index.get(key).map(|&i| &self.steps[i])
    }

    /// Position of a step in plan order.
    pub fn position_of(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }

    /// Selected steps, in plan order.
    pub fn steps_to_execute(&self) -> impl Iterator<Item = &Step> {
        self.steps
            .iter()
            .filter(|s| self.selected.contains(&s.key))
    }

    pub fn step_keys_to_execute(&self) -> &BTreeSet<StepKey> {
        &self.selected
    }

    pub fn is_selected(&self, key: &str) -> bool {
        self.selected.contains(key)
    }

    /// Keys satisfied outside the plan.
    pub fn external_keys(&self) -> &BTreeSet<StepKey> {
        &self.external
    }

    pub fn graph(&self) -> &PlanGraph {
        &self.graph
    }
}
