// src/engine/dispatch.rs

//! The dispatch loop.
//!
//! A single cooperative polling loop owns every pending result handle. Each
//! tick it:
//!
//! 1. reacts to an operator interrupt (enter draining, revoke in-flight work)
//! 2. fetches every ready result, in priority order, and feeds the events to
//!    the tracker
//! 3. drops settled handles and verifies the tracker saw them finish
//! 4. publishes cascading skip events
//! 5. submits newly ready steps, highest priority first, unless draining or a
//!    step error has been recorded
//! 6. sleeps for the configured tick interval
//!
//! Nothing ever blocks on a particular result. A revoked handle that is still
//! not ready after [`ExecutorConfig::revoke_grace`] is abandoned: the loop
//! reports it as revoked and the tracker fails the step.

use std::collections::BTreeMap;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::active::{ActiveExecution, RunSummary};
use crate::engine::context::RunContext;
use crate::engine::events::ExecutionEvent;
use crate::engine::priority::{PriorityResolver, warn_on_priority_misuse};
use crate::engine::ExecutorConfig;
use crate::errors::{AggregateFailure, ErrorInfo, QueuedagError, Result, StepErrorRecord};
use crate::exec::{FetchError, PendingResult, SubmitRequest, TaskQueue};
use crate::plan::{ExecutionPlan, StepKey};

/// Loop phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Running,
    /// Interrupted: nothing new is submitted; in-flight work settles.
    Draining,
    Done,
}

/// Drives an [`ExecutionPlan`] to completion through a [`TaskQueue`].
#[derive(Debug)]
pub struct DispatchLoop<Q: TaskQueue> {
    plan: ExecutionPlan,
    context: RunContext,
    queue: Q,
    config: ExecutorConfig,
}

impl<Q: TaskQueue> DispatchLoop<Q> {
    pub fn new(plan: ExecutionPlan, context: RunContext, queue: Q, config: ExecutorConfig) -> Self {
        Self {
            plan,
            context,
            queue,
            config,
        }
    }

    /// Run the plan.
    ///
    /// Returns the run summary when no step error was recorded (including
    /// interrupted runs, see [`RunSummary::interrupted`]). Step errors are
    /// collected while sibling work finishes and returned together as
    /// [`QueuedagError::StepFailures`]. Submission failures and lost step
    /// state abort immediately.
    pub async fn run(self) -> Result<RunSummary> {
        let DispatchLoop {
            plan,
            context,
            mut queue,
            config,
        } = self;

        warn_on_priority_misuse(&plan);

        let mut state = DispatchState {
            priorities: PriorityResolver::new(config.default_priority, context.tags()),
            active: ActiveExecution::new(&plan, config.retry_mode, context.interrupt_handle()),
            plan: &plan,
            context: &context,
            config: &config,
            queue: &mut queue,
            outstanding: BTreeMap::new(),
            step_errors: Vec::new(),
            phase: LoopPhase::Running,
        };

        info!(
            steps = plan.step_keys_to_execute().len(),
            run_priority = state.priorities.run_priority(),
            tick_ms = config.tick_interval.as_millis() as u64,
            "dispatch loop started"
        );

        while state.should_continue() {
            state.tick()?;
            tokio::time::sleep(config.tick_interval).await;
        }
        state.phase = LoopPhase::Done;

        state.finish()
    }
}

/// Result handle plus when it was revoked, if it was.
struct Outstanding<H> {
    handle: H,
    revoked_at: Option<Instant>,
}

struct DispatchState<'a, Q: TaskQueue> {
    plan: &'a ExecutionPlan,
    context: &'a RunContext,
    config: &'a ExecutorConfig,
    priorities: PriorityResolver,
    active: ActiveExecution<'a>,
    queue: &'a mut Q,
    outstanding: BTreeMap<StepKey, Outstanding<Q::Handle>>,
    step_errors: Vec<StepErrorRecord>,
    phase: LoopPhase,
}

impl<'a, Q: TaskQueue> DispatchState<'a, Q> {
    /// No new work is started once draining or once any step error exists.
    fn halted(&self) -> bool {
        self.phase == LoopPhase::Draining || !self.step_errors.is_empty()
    }

    fn should_continue(&self) -> bool {
        (!self.active.is_complete() && !self.halted()) || !self.outstanding.is_empty()
    }

    fn tick(&mut self) -> Result<()> {
        self.handle_interrupts();
        let mut settled = self.collect_ready_results();
        for key in &settled {
            self.outstanding.remove(key);
        }
        settled.extend(self.abandon_stale_revokes());

        for key in settled {
            if let Err(err) = self.active.verify_complete(&key) {
                self.context.emit(ExecutionEvent::EngineError {
                    step_key: Some(key),
                    error: ErrorInfo::from_error(&err),
                });
                return Err(err);
            }
        }

        for event in self.active.plan_events_iterator() {
            self.context.emit(ExecutionEvent::Step(event));
        }

        if self.halted() {
            return Ok(());
        }

        self.submit_ready_steps()
    }

    fn handle_interrupts(&mut self) {
        if !self.active.check_for_interrupts() || self.phase != LoopPhase::Running {
            return;
        }

        self.context.emit(ExecutionEvent::Interrupted {
            in_flight: self.outstanding.keys().cloned().collect(),
        });
        self.phase = LoopPhase::Draining;
        self.active.mark_interrupted();

        let now = Instant::now();
        for (key, pending) in self.outstanding.iter_mut() {
            if pending.revoked_at.is_none() {
                debug!(step = %key, "revoking in-flight task");
                pending.handle.revoke();
                pending.revoked_at = Some(now);
            }
        }
    }

    /// Drop revoked handles that did not settle within the grace period.
    /// Returns their keys.
    fn abandon_stale_revokes(&mut self) -> Vec<StepKey> {
        let grace = self.config.revoke_grace;
        let stale: Vec<StepKey> = self
            .outstanding
            .iter()
            .filter(|(_, pending)| {
                pending
                    .revoked_at
                    .is_some_and(|at| at.elapsed() >= grace)
            })
            .map(|(key, _)| key.clone())
            .collect();

        for key in &stale {
            self.outstanding.remove(key);
            warn!(
                step = %key,
                grace_ms = grace.as_millis() as u64,
                "revoked task did not settle; abandoning it"
            );
            self.context.emit(ExecutionEvent::StepRevoked {
                step_key: key.clone(),
            });
        }

        stale
    }

    /// Fetch every ready result, highest priority first. Returns the keys of
    /// the handles that settled.
    fn collect_ready_results(&mut self) -> Vec<StepKey> {
        let mut keys: Vec<StepKey> = self.outstanding.keys().cloned().collect();
        let plan = self.plan;
        let priorities = self.priorities;
        keys.sort_by_key(|key| match plan.get_step_by_key(key) {
            Some(step) => (priorities.sort_key(step), plan.position_of(key)),
            None => (0, None),
        });

        let mut settled = Vec::new();

        for key in keys {
            let Some(pending) = self.outstanding.get_mut(&key) else {
                continue;
            };
            if !pending.handle.is_ready() {
                continue;
            }

            match pending.handle.fetch() {
                Ok(events) => {
                    for event in events {
                        self.context.emit(ExecutionEvent::Step(event.clone()));
                        self.active.handle_event(&event);
                    }
                }
                Err(FetchError::Revoked) => {
                    self.context.emit(ExecutionEvent::StepRevoked {
                        step_key: key.clone(),
                    });
                }
                Err(FetchError::Remote(error)) => {
                    self.context.emit(ExecutionEvent::StepErrored {
                        step_key: key.clone(),
                        error: error.clone(),
                    });
                    self.step_errors.push(StepErrorRecord {
                        step_key: key.clone(),
                        error,
                    });
                }
            }

            settled.push(key);
        }

        settled
    }

    fn submit_ready_steps(&mut self) -> Result<()> {
        let mut steps = self.active.get_steps_to_execute();
        self.priorities.sort_steps(&mut steps);

        for step in steps {
            let queue = step
                .tags
                .queue
                .as_deref()
                .unwrap_or(self.config.default_queue.as_str());
            let priority = self.priorities.submission_priority(step);

            self.context.emit(ExecutionEvent::StepSubmitted {
                step_key: step.key.clone(),
                queue: queue.to_string(),
                priority,
            });

            let request = SubmitRequest {
                step,
                queue,
                priority,
                route: step.tags.route.as_deref(),
                exchange: step.tags.exchange.as_deref(),
                known_state: self.active.get_known_state(),
            };

            match self.queue.submit(request) {
                Ok(handle) => {
                    self.outstanding.insert(
                        step.key.clone(),
                        Outstanding {
                            handle,
                            revoked_at: None,
                        },
                    );
                }
                Err(source) => {
                    self.context.emit(ExecutionEvent::EngineError {
                        step_key: Some(step.key.clone()),
                        error: ErrorInfo::from_error(&source),
                    });
                    return Err(QueuedagError::Submission {
                        step_key: step.key.clone(),
                        source,
                    });
                }
            }
        }

        Ok(())
    }

    fn finish(self) -> Result<RunSummary> {
        let summary = self.active.summary();
        info!(
            succeeded = summary.succeeded.len(),
            failed = summary.failed.len(),
            skipped = summary.skipped.len(),
            unfinished = summary.unfinished.len(),
            interrupted = summary.interrupted,
            "dispatch loop finished"
        );

        if self.step_errors.is_empty() {
            return Ok(summary);
        }

        let failure = AggregateFailure {
            errors: self.step_errors,
        };
        self.context.emit(ExecutionEvent::AggregateFailure {
            failure: failure.clone(),
        });
        Err(QueuedagError::StepFailures(failure))
    }
}
