// src/exec/local.rs

//! In-process task queue backed by tokio workers.

use std::collections::HashMap;

use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tracing::debug;

use crate::engine::events::StepEvent;
use crate::errors::ErrorInfo;
use crate::exec::backend::{FetchError, PendingResult, QueueError, SubmitRequest, TaskQueue};
use crate::exec::pool::{WorkerPermit, WorkerPool};
use crate::exec::task_runner::{StepJob, StepOutcome, run_step};
use crate::plan::StepKey;

/// Task queue that runs steps on a fixed pool of workers per named queue.
///
/// Each submission spawns a tokio task that waits for a free worker and then
/// runs the step's command. A freed worker goes to the waiting step with the
/// highest submission priority. Submitting to a queue that was not configured
/// fails, the same way a remote broker rejects an unknown route.
///
/// Route and exchange hints have no local meaning and are only logged.
#[derive(Debug)]
pub struct LocalTaskQueue {
    pools: HashMap<String, WorkerPool>,
}

impl LocalTaskQueue {
    /// Create a queue with `workers_per_queue` workers for each named queue.
    ///
    /// `workers_per_queue` is clamped to at least 1.
    pub fn new<I, S>(queues: I, workers_per_queue: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pools = queues
            .into_iter()
            .map(|name| (name.into(), WorkerPool::new(workers_per_queue)))
            .collect();
        Self { pools }
    }

    pub fn has_queue(&self, name: &str) -> bool {
        self.pools.contains_key(name)
    }

    /// Idle workers on `queue`, or `None` for an unknown queue.
    pub fn idle_workers(&self, queue: &str) -> Option<usize> {
        self.pools.get(queue).map(WorkerPool::available)
    }
}

impl TaskQueue for LocalTaskQueue {
    type Handle = LocalHandle;

    fn submit(&mut self, request: SubmitRequest<'_>) -> Result<LocalHandle, QueueError> {
        let pool = self
            .pools
            .get(request.queue)
            .cloned()
            .ok_or_else(|| QueueError::UnknownQueue(request.queue.to_string()))?;

        let job = StepJob {
            step_key: request.step.key.clone(),
            command: request.step.command.clone(),
            queue: request.queue.to_string(),
            priority: request.priority,
            known_state: request.known_state,
        };

        let (outcome_tx, outcome_rx) = oneshot::channel::<StepOutcome>();
        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();
        let step_key = job.step_key.clone();

        debug!(
            step = %step_key,
            queue = %job.queue,
            priority = job.priority,
            route = ?request.route,
            exchange = ?request.exchange,
            "enqueued step on local queue"
        );

        tokio::spawn(async move {
            let outcome = match acquire_worker(&pool, job.priority, &mut cancel_rx).await {
                WorkerSlot::Acquired(_permit) => run_step(&job, &mut cancel_rx).await,
                WorkerSlot::Revoked => Err(FetchError::Revoked),
                WorkerSlot::Closed => Err(FetchError::Remote(ErrorInfo::new(
                    "worker pool closed before the step could run",
                ))),
            };
            if outcome_tx.send(outcome).is_err() {
                debug!(step = %job.step_key, "result handle dropped before outcome was delivered");
            }
        });

        Ok(LocalHandle {
            step_key,
            outcome_rx: Some(outcome_rx),
            outcome: None,
            cancel: Some(cancel_tx),
        })
    }
}

enum WorkerSlot {
    Acquired(WorkerPermit),
    Revoked,
    Closed,
}

async fn acquire_worker(
    pool: &WorkerPool,
    priority: i64,
    cancel_rx: &mut oneshot::Receiver<()>,
) -> WorkerSlot {
    tokio::select! {
        biased;
        _ = cancel_rx => WorkerSlot::Revoked,
        permit = pool.acquire(priority) => match permit {
            Some(permit) => WorkerSlot::Acquired(permit),
            None => WorkerSlot::Closed,
        },
    }
}

/// Pending result of a step submitted to a [`LocalTaskQueue`].
#[derive(Debug)]
pub struct LocalHandle {
    step_key: StepKey,
    outcome_rx: Option<oneshot::Receiver<StepOutcome>>,
    outcome: Option<StepOutcome>,
    cancel: Option<oneshot::Sender<()>>,
}

impl PendingResult for LocalHandle {
    fn is_ready(&mut self) -> bool {
        if self.outcome.is_some() {
            return true;
        }
        let Some(rx) = self.outcome_rx.as_mut() else {
            return false;
        };
        match rx.try_recv() {
            Ok(outcome) => {
                self.outcome = Some(outcome);
                self.outcome_rx = None;
                true
            }
            Err(TryRecvError::Empty) => false,
            Err(TryRecvError::Closed) => {
                // The worker task went away without reporting (panicked).
                self.outcome = Some(Err(FetchError::Remote(ErrorInfo::new(
                    "worker exited without reporting a result",
                ))));
                self.outcome_rx = None;
                true
            }
        }
    }

    fn fetch(&mut self) -> Result<Vec<StepEvent>, FetchError> {
        self.is_ready();
        self.outcome.take().unwrap_or_else(|| {
            Err(FetchError::Remote(ErrorInfo::new(format!(
                "result for step '{}' is not available (not ready or already fetched)",
                self.step_key
            ))))
        })
    }

    fn revoke(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            debug!(step = %self.step_key, "revoking local task");
            if cancel.send(()).is_err() {
                debug!(step = %self.step_key, "task already finished while revoking");
            }
        }
    }
}
