// src/errors.rs

//! Crate-wide error types and aliases.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::exec::QueueError;
use crate::plan::StepKey;

#[derive(Error, Debug)]
pub enum QueuedagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Plan error: {0}")]
    PlanError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Cycle detected in plan: {0}")]
    DagCycle(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// The task queue refused a step. Fatal to the whole run.
    #[error("failed to submit step '{step_key}': {source}")]
    Submission {
        step_key: StepKey,
        #[source]
        source: QueueError,
    },

    /// The tracker lost track of a step's state.
    #[error("execution state consistency failure: {0}")]
    Consistency(String),

    /// One or more steps failed remotely; raised after the run drained.
    #[error(transparent)]
    StepFailures(AggregateFailure),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, QueuedagError>;

/// Serializable description of a failure, detached from the original error
/// value so it can cross process boundaries and be stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub message: String,
    /// `Display` output of each `source()` in the chain, outermost first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<String>,
}

impl ErrorInfo {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            causes: Vec::new(),
        }
    }

    /// Capture an error and its whole `source()` chain.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut causes = Vec::new();
        let mut current = err.source();
        while let Some(cause) = current {
            causes.push(cause.to_string());
            current = cause.source();
        }
        Self {
            message: err.to_string(),
            causes,
        }
    }

    /// Capture an `anyhow` error with its context chain.
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        Self {
            message: err.to_string(),
            causes: err.chain().skip(1).map(|c| c.to_string()).collect(),
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        for cause in &self.causes {
            write!(f, ": {cause}")?;
        }
        Ok(())
    }
}

/// A failure recorded against a single step during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepErrorRecord {
    pub step_key: StepKey,
    pub error: ErrorInfo,
}

impl fmt::Display for StepErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]: {}", self.step_key, self.error)
    }
}

/// Every step error recorded during a run, in the order they were observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateFailure {
    pub errors: Vec<StepErrorRecord>,
}

impl AggregateFailure {
    /// Keys of the failed steps, in recording order.
    pub fn step_keys(&self) -> Vec<&str> {
        self.errors.iter().map(|e| e.step_key.as_str()).collect()
    }
}

impl fmt::Display for AggregateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "errors occurred while executing steps on the task queue:")?;
        for record in &self.errors {
            write!(f, "\n{record}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateFailure {}
