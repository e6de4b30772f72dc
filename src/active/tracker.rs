// src/active/tracker.rs

use std::collections::{HashMap, VecDeque};

use tracing::{debug, error, info, warn};

use crate::active::state::{KnownExecutionState, RunSummary, StepState};
use crate::engine::events::{StepEvent, StepEventKind};
use crate::engine::interrupt::InterruptHandle;
use crate::errors::{ErrorInfo, QueuedagError, Result};
use crate::plan::{ExecutionPlan, Step, StepKey};
use crate::types::RetryMode;

/// Mutable state machine over an [`ExecutionPlan`].
///
/// It is responsible for:
/// - releasing steps whose dependencies have succeeded, exactly once
/// - recording success/failure reported by workers
/// - skipping everything downstream of a step that did not succeed
/// - noticing operator interrupts and refusing to release new work afterwards
///
/// It never talks to the task queue itself and never retries on its own;
/// retries only happen when a worker asks for one and [`RetryMode`] allows it.
#[derive(Debug)]
pub struct ActiveExecution<'a> {
    plan: &'a ExecutionPlan,
    states: HashMap<StepKey, StepState>,
    retries: HashMap<StepKey, u32>,
    retry_mode: RetryMode,
    interrupt: InterruptHandle,
    interrupted: bool,
    /// Synthetic events (cascading skips, forced failures) not yet drained.
    pending_events: VecDeque<StepEvent>,
}

impl<'a> ActiveExecution<'a> {
    pub fn new(plan: &'a ExecutionPlan, retry_mode: RetryMode, interrupt: InterruptHandle) -> Self {
        let states = plan
            .steps_to_execute()
            .map(|s| (s.key.clone(), StepState::NotReady))
            .collect();

        let mut active = Self {
            plan,
            states,
            retries: HashMap::new(),
            retry_mode,
            interrupt,
            interrupted: false,
            pending_events: VecDeque::new(),
        };
        active.update_ready();
        active
    }

    pub fn get_step_by_key(&self, key: &str) -> Option<&'a Step> {
        self.plan.get_step_by_key(key)
    }

    /// Current state of a selected step, `None` for keys that are not part of
    /// this execution.
    pub fn state_of(&self, key: &str) -> Option<StepState> {
        self.states.get(key).copied()
    }

    /// Steps that are ready to run, in plan order. Each returned step is
    /// marked in-flight, so it will not be returned again.
    ///
    /// Returns nothing once the execution has been interrupted.
    pub fn get_steps_to_execute(&mut self) -> Vec<&'a Step> {
        if self.interrupted {
            return Vec::new();
        }

        let plan = self.plan;
        let mut ready = Vec::new();

        for step in plan.steps_to_execute() {
            if let Some(state) = self.states.get_mut(&step.key) {
                if *state == StepState::Ready {
                    *state = StepState::InFlight;
                    debug!(step = %step.key, "dependencies satisfied; marking in-flight");
                    ready.push(step);
                }
            }
        }

        ready
    }

    /// Apply a step event reported by a worker.
    pub fn handle_event(&mut self, event: &StepEvent) {
        let key = event.step_key.as_str();

        let Some(state) = self.states.get(key).copied() else {
            warn!(step = %key, "event for step that is not part of this execution; ignoring");
            return;
        };

        if matches!(event.kind, StepEventKind::Started) {
            debug!(step = %key, "step started");
            return;
        }

        if state != StepState::InFlight {
            warn!(
                step = %key,
                state = ?state,
                "outcome event for step that is not in flight; ignoring"
            );
            return;
        }

        match &event.kind {
            StepEventKind::Started => {}
            StepEventKind::Success => {
                self.set_state(key, StepState::Succeeded);
                debug!(step = %key, "step succeeded");
                self.update_ready();
            }
            StepEventKind::Failure { .. } => {
                self.set_state(key, StepState::Failed);
                warn!(step = %key, "step failed; skipping downstream steps");
                self.skip_dependents(key);
            }
            StepEventKind::Skipped { .. } => {
                self.set_state(key, StepState::Skipped);
                debug!(step = %key, "step reported skipped; skipping downstream steps");
                self.skip_dependents(key);
            }
            StepEventKind::UpForRetry { .. } => {
                let attempts = self.retries.get(key).copied().unwrap_or(0);
                if self.retry_mode.allows_retry(attempts) {
                    self.retries.insert(key.to_string(), attempts + 1);
                    self.set_state(key, StepState::Ready);
                    info!(step = %key, retry = attempts + 1, "step up for retry; re-queueing");
                } else {
                    self.set_state(key, StepState::Failed);
                    warn!(
                        step = %key,
                        retries = attempts,
                        "step requested a retry but none remain; treating as failure"
                    );
                    self.skip_dependents(key);
                }
            }
        }
    }

    /// Check a step whose result has been fully consumed.
    ///
    /// A step still in flight here finished without a success or failure
    /// event (its task was revoked or crashed). It is marked failed so the
    /// plan can still complete. A step that was never released is a lost
    /// state and is reported as a consistency failure.
    pub fn verify_complete(&mut self, key: &str) -> Result<()> {
        match self.states.get(key).copied() {
            None => Err(QueuedagError::Consistency(format!(
                "result consumed for unknown step '{key}'"
            ))),
            Some(state) if state.is_terminal() => Ok(()),
            Some(StepState::Ready) if self.retries.contains_key(key) => Ok(()),
            Some(StepState::InFlight) => {
                error!(
                    step = %key,
                    "step finished without success or failure event; downstream steps will not execute"
                );
                self.set_state(key, StepState::Failed);
                self.pending_events.push_back(StepEvent::failure(
                    key,
                    ErrorInfo::new("step finished without success or failure event"),
                ));
                self.skip_dependents(key);
                Ok(())
            }
            Some(state) => Err(QueuedagError::Consistency(format!(
                "result consumed for step '{key}' which was never released (state {state:?})"
            ))),
        }
    }

    /// Every selected step has reached a terminal state.
    pub fn is_complete(&self) -> bool {
        self.states.values().all(StepState::is_terminal)
    }

    /// Poll for an operator stop request without blocking.
    pub fn check_for_interrupts(&self) -> bool {
        self.interrupt.take()
    }

    /// Stop releasing new steps, even if their dependencies are satisfied.
    pub fn mark_interrupted(&mut self) {
        if !self.interrupted {
            info!("execution interrupted; no further steps will be released");
        }
        self.interrupted = true;
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted
    }

    /// Drain the synthetic events produced since the last call.
    pub fn plan_events_iterator(&mut self) -> impl Iterator<Item = StepEvent> + '_ {
        self.pending_events.drain(..)
    }

    pub fn get_known_state(&self) -> KnownExecutionState {
        let mut known = KnownExecutionState::default();
        for (key, state) in &self.states {
            match state {
                StepState::Succeeded => {
                    known.succeeded.insert(key.clone());
                }
                StepState::Failed => {
                    known.failed.insert(key.clone());
                }
                StepState::Skipped => {
                    known.skipped.insert(key.clone());
                }
                _ => {}
            }
        }
        known.retries = self
            .retries
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        known
    }

    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary {
            interrupted: self.interrupted,
            ..RunSummary::default()
        };
        for step in self.plan.steps_to_execute() {
            let key = step.key.clone();
            match self.states.get(&step.key) {
                Some(StepState::Succeeded) => summary.succeeded.push(key),
                Some(StepState::Failed) => summary.failed.push(key),
                Some(StepState::Skipped) => summary.skipped.push(key),
                _ => summary.unfinished.push(key),
            }
        }
        summary
    }

    fn set_state(&mut self, key: &str, state: StepState) {
        if let Some(s) = self.states.get_mut(key) {
            *s = state;
        }
    }

    /// Whether a dependency counts as satisfied. Dependencies that are not
    /// selected for this run (unselected plan steps, external keys) are
    /// satisfied by definition.
    fn dep_satisfied(&self, dep: &str) -> bool {
        match self.states.get(dep) {
            Some(state) => *state == StepState::Succeeded,
            None => true,
        }
    }

    /// Promote not-ready steps whose dependencies have all succeeded.
    fn update_ready(&mut self) {
        let plan = self.plan;
        let promotable: Vec<&StepKey> = plan
            .steps_to_execute()
            .filter(|s| self.states.get(&s.key) == Some(&StepState::NotReady))
            .filter(|s| s.deps.iter().all(|d| self.dep_satisfied(d)))
            .map(|s| &s.key)
            .collect();

        for key in promotable {
            debug!(step = %key, "step is ready to execute");
            self.set_state(key, StepState::Ready);
        }
    }

    /// Mark every not-ready step downstream of `root` as skipped, queueing a
    /// skip event for each. Traversal stops at steps outside this execution.
    fn skip_dependents(&mut self, root: &str) {
        let plan = self.plan;
        let graph = plan.graph();
        let mut stack: Vec<(StepKey, StepKey)> = graph
            .dependents_of(root)
            .iter()
            .map(|d| (d.clone(), root.to_string()))
            .collect();

        while let Some((key, upstream)) = stack.pop() {
            if self.states.get(&key) != Some(&StepState::NotReady) {
                continue;
            }
            self.set_state(&key, StepState::Skipped);
            debug!(step = %key, upstream = %upstream, "skipping step due to upstream outcome");
            self.pending_events.push_back(StepEvent::skipped(
                key.clone(),
                format!("upstream step '{upstream}' did not succeed"),
            ));
            stack.extend(
                graph
                    .dependents_of(&key)
                    .iter()
                    .map(|d| (d.clone(), key.clone())),
            );
        }
    }
}
