// src/exec/backend.rs

//! Pluggable task queue abstraction.
//!
//! The dispatch loop talks to a [`TaskQueue`] instead of a concrete broker.
//! This keeps the scheduling core independent of how steps actually run:
//!
//! - [`LocalTaskQueue`](super::LocalTaskQueue) runs steps on in-process tokio
//!   workers and is what the `queuedag` binary uses.
//! - Tests can provide their own queue that scripts outcomes per step.
//!
//! Every operation here must return promptly. Readiness is polled; nothing
//! waits on a particular result.

use thiserror::Error;

use crate::active::KnownExecutionState;
use crate::engine::events::StepEvent;
use crate::errors::ErrorInfo;
use crate::plan::Step;

/// Everything a queue needs to enqueue one step.
#[derive(Debug, Clone)]
pub struct SubmitRequest<'a> {
    pub step: &'a Step,
    pub queue: &'a str,
    pub priority: i64,
    pub route: Option<&'a str>,
    pub exchange: Option<&'a str>,
    pub known_state: KnownExecutionState,
}

/// Enqueue-time failure. Fatal to the whole run.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("unknown queue '{0}'")]
    UnknownQueue(String),

    #[error("task queue unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Why a ready result could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The task was revoked before producing a result.
    #[error("task was revoked")]
    Revoked,

    /// The remote task crashed or raised.
    #[error("remote task failed: {0}")]
    Remote(ErrorInfo),
}

/// Trait abstracting the queue that steps are submitted to.
pub trait TaskQueue {
    type Handle: PendingResult;

    /// Enqueue a step. Must not wait for a worker to pick it up.
    fn submit(&mut self, request: SubmitRequest<'_>) -> Result<Self::Handle, QueueError>;
}

/// Handle to a submitted step's eventual outcome.
pub trait PendingResult {
    /// Non-blocking readiness check.
    fn is_ready(&mut self) -> bool;

    /// Fetch the step's events. Only called after `is_ready` returned true.
    fn fetch(&mut self) -> Result<Vec<StepEvent>, FetchError>;

    /// Request best-effort cancellation. Idempotent; never blocks.
    fn revoke(&mut self);
}
