// src/active/state.rs

//! Per-step execution state and run-level snapshots.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::plan::StepKey;

/// State of a selected step within the active execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    /// Waiting on at least one upstream step.
    NotReady,
    /// Dependencies satisfied; not yet handed to the task queue.
    Ready,
    /// Submitted; waiting for the outcome.
    InFlight,
    Succeeded,
    Failed,
    /// Never ran because an upstream step did not succeed.
    Skipped,
}

impl StepState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepState::Succeeded | StepState::Failed | StepState::Skipped
        )
    }
}

/// What the orchestrator knows about the run so far. Handed to the task
/// queue with every submission so workers can see upstream outcomes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KnownExecutionState {
    pub succeeded: BTreeSet<StepKey>,
    pub failed: BTreeSet<StepKey>,
    pub skipped: BTreeSet<StepKey>,
    /// Number of retries already granted per step.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub retries: BTreeMap<StepKey, u32>,
}

/// Final outcome of a run, in plan order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub succeeded: Vec<StepKey>,
    pub failed: Vec<StepKey>,
    pub skipped: Vec<StepKey>,
    /// Selected steps that never reached a terminal state (interrupted runs,
    /// or runs halted by step errors).
    pub unfinished: Vec<StepKey>,
    pub interrupted: bool,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
            && self.skipped.is_empty()
            && self.unfinished.is_empty()
            && !self.interrupted
    }
}
