// src/engine/events.rs

//! Structured events.
//!
//! [`StepEvent`]s are produced by workers (and by the tracker for cascading
//! skips) and drive the tracker's state machine. [`ExecutionEvent`] is what
//! the dispatch loop publishes to the run's observability sink.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{AggregateFailure, ErrorInfo};
use crate::plan::StepKey;

/// What happened to a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepEventKind {
    /// The worker started executing the step. Informational.
    Started,
    Success,
    Failure { error: ErrorInfo },
    /// The step did not run, either reported by the worker or synthesized
    /// because an upstream step did not succeed.
    Skipped { reason: String },
    /// The step failed but asked to be retried.
    UpForRetry { error: ErrorInfo },
}

/// An event about a single step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepEvent {
    pub step_key: StepKey,
    #[serde(flatten)]
    pub kind: StepEventKind,
}

impl StepEvent {
    pub fn started(step_key: impl Into<StepKey>) -> Self {
        Self::new(step_key, StepEventKind::Started)
    }

    pub fn success(step_key: impl Into<StepKey>) -> Self {
        Self::new(step_key, StepEventKind::Success)
    }

    pub fn failure(step_key: impl Into<StepKey>, error: ErrorInfo) -> Self {
        Self::new(step_key, StepEventKind::Failure { error })
    }

    pub fn skipped(step_key: impl Into<StepKey>, reason: impl Into<String>) -> Self {
        Self::new(
            step_key,
            StepEventKind::Skipped {
                reason: reason.into(),
            },
        )
    }

    pub fn up_for_retry(step_key: impl Into<StepKey>, error: ErrorInfo) -> Self {
        Self::new(step_key, StepEventKind::UpForRetry { error })
    }

    fn new(step_key: impl Into<StepKey>, kind: StepEventKind) -> Self {
        Self {
            step_key: step_key.into(),
            kind,
        }
    }
}

/// Events published by the dispatch loop, in the order they happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecutionEvent {
    /// A step event reported by a worker or synthesized by the tracker.
    Step(StepEvent),
    StepSubmitted {
        step_key: StepKey,
        queue: String,
        priority: i64,
    },
    /// The step's task was revoked before it produced a result.
    StepRevoked { step_key: StepKey },
    /// Fetching the step's result failed; recorded as a step error.
    StepErrored { step_key: StepKey, error: ErrorInfo },
    /// An operator asked the run to stop; in-flight tasks are being revoked.
    Interrupted { in_flight: Vec<StepKey> },
    /// A fatal engine failure (submission error, lost step state).
    EngineError {
        step_key: Option<StepKey>,
        error: ErrorInfo,
    },
    /// The run finished with step errors.
    AggregateFailure { failure: AggregateFailure },
}

impl ExecutionEvent {
    pub fn step_key(&self) -> Option<&str> {
        match self {
            ExecutionEvent::Step(e) => Some(&e.step_key),
            ExecutionEvent::StepSubmitted { step_key, .. }
            | ExecutionEvent::StepRevoked { step_key }
            | ExecutionEvent::StepErrored { step_key, .. } => Some(step_key),
            ExecutionEvent::EngineError { step_key, .. } => step_key.as_deref(),
            ExecutionEvent::Interrupted { .. } | ExecutionEvent::AggregateFailure { .. } => None,
        }
    }
}

impl fmt::Display for ExecutionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionEvent::Step(e) => match &e.kind {
                StepEventKind::Started => write!(f, "step \"{}\" started", e.step_key),
                StepEventKind::Success => write!(f, "step \"{}\" succeeded", e.step_key),
                StepEventKind::Failure { error } => {
                    write!(f, "step \"{}\" failed: {}", e.step_key, error)
                }
                StepEventKind::Skipped { reason } => {
                    write!(f, "step \"{}\" skipped: {}", e.step_key, reason)
                }
                StepEventKind::UpForRetry { error } => {
                    write!(f, "step \"{}\" up for retry: {}", e.step_key, error)
                }
            },
            ExecutionEvent::StepSubmitted {
                step_key, queue, ..
            } => write!(f, "submitting task for step \"{step_key}\" to queue \"{queue}\""),
            ExecutionEvent::StepRevoked { step_key } => {
                write!(f, "task for running step \"{step_key}\" was revoked")
            }
            ExecutionEvent::StepErrored { step_key, error } => {
                write!(f, "task for step \"{step_key}\" raised: {error}")
            }
            ExecutionEvent::Interrupted { in_flight } => write!(
                f,
                "received termination signal; revoking {} active task(s)",
                in_flight.len()
            ),
            ExecutionEvent::EngineError { error, .. } => write!(f, "engine error: {error}"),
            ExecutionEvent::AggregateFailure { failure } => write!(f, "{failure}"),
        }
    }
}
