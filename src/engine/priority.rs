// src/engine/priority.rs

use tracing::warn;

use crate::plan::tags::{GENERIC_PRIORITY_TAG, STEP_PRIORITY_TAG};
use crate::plan::{ExecutionPlan, RunTags, Step};

/// Orders steps by combined step and run priority.
///
/// The run priority is resolved once, when the resolver is built, since it is
/// fixed for the run and the sort key is recomputed every tick.
#[derive(Debug, Clone, Copy)]
pub struct PriorityResolver {
    default_priority: i64,
    run_priority: i64,
}

impl PriorityResolver {
    pub fn new(default_priority: i64, run_tags: &RunTags) -> Self {
        run_tags.warn_if_invalid();
        Self {
            default_priority,
            run_priority: run_tags.run_priority(),
        }
    }

    pub fn run_priority(&self) -> i64 {
        self.run_priority
    }

    pub fn step_priority(&self, step: &Step) -> i64 {
        step.tags.priority.unwrap_or(self.default_priority)
    }

    /// Priority handed to the task queue: step priority plus run priority.
    pub fn submission_priority(&self, step: &Step) -> i64 {
        self.step_priority(step).saturating_add(self.run_priority)
    }

    /// Ascending sort key; higher priorities sort first.
    pub fn sort_key(&self, step: &Step) -> i64 {
        self.step_priority(step)
            .saturating_neg()
            .saturating_add(self.run_priority.saturating_neg())
    }

    /// Stable sort, so equal priorities keep their incoming order.
    pub fn sort_steps(&self, steps: &mut [&Step]) {
        steps.sort_by_key(|step| self.sort_key(step));
    }
}

/// Warn about selected steps that set the generic priority tag, which has no
/// effect on queue ordering, without setting the step priority tag.
///
/// Returns the offending keys.
pub fn warn_on_priority_misuse(plan: &ExecutionPlan) -> Vec<String> {
    let bad_keys: Vec<String> = plan
        .steps_to_execute()
        .filter(|s| s.tags.has_misused_priority())
        .map(|s| s.key.clone())
        .collect();

    if !bad_keys.is_empty() {
        warn!(
            steps = ?bad_keys,
            "steps set \"{GENERIC_PRIORITY_TAG}\" but not \"{STEP_PRIORITY_TAG}\"; \
             only \"{STEP_PRIORITY_TAG}\" affects task queue ordering"
        );
    }

    bad_keys
}
