#![allow(dead_code)]

use std::collections::BTreeMap;

use queuedag::errors::Result;
use queuedag::plan::tags::{QUEUE_TAG, STEP_PRIORITY_TAG};
use queuedag::plan::{ExecutionPlan, Step};

/// Builder for `ExecutionPlan` to simplify test setup.
///
/// Steps keep the order they were added in.
pub struct PlanBuilder {
    steps: Vec<Step>,
    select: Option<Vec<String>>,
    external: Vec<String>,
}

impl PlanBuilder {
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            select: None,
            external: Vec::new(),
        }
    }

    pub fn with_step(mut self, step: StepBuilder) -> Self {
        self.steps.push(step.build());
        self
    }

    /// Restrict the run to these keys.
    pub fn select(mut self, keys: &[&str]) -> Self {
        self.select = Some(keys.iter().map(|k| k.to_string()).collect());
        self
    }

    pub fn with_external(mut self, key: &str) -> Self {
        self.external.push(key.to_string());
        self
    }

    pub fn try_build(self) -> Result<ExecutionPlan> {
        ExecutionPlan::try_new(self.steps, self.select, self.external)
    }

    pub fn build(self) -> ExecutionPlan {
        self.try_build()
            .expect("Failed to build valid plan from builder")
    }
}

impl Default for PlanBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `Step`.
pub struct StepBuilder {
    key: String,
    deps: Vec<String>,
    tags: BTreeMap<String, String>,
    command: Option<String>,
}

impl StepBuilder {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            deps: Vec::new(),
            tags: BTreeMap::new(),
            command: None,
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.deps.push(dep.to_string());
        self
    }

    pub fn priority(self, priority: i64) -> Self {
        self.tag(STEP_PRIORITY_TAG, &priority.to_string())
    }

    pub fn queue(self, queue: &str) -> Self {
        self.tag(QUEUE_TAG, queue)
    }

    pub fn tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }

    pub fn cmd(mut self, cmd: &str) -> Self {
        self.command = Some(cmd.to_string());
        self
    }

    pub fn try_build(self) -> Result<Step> {
        Step::new(self.key, self.deps, self.tags, self.command)
    }

    pub fn build(self) -> Step {
        self.try_build()
            .expect("Failed to build valid step from builder")
    }
}
