// src/plan/tags.rs

//! Typed views over the free-form string tags attached to steps and runs.
//!
//! Only the keys below are interpreted. Any other key is kept verbatim in
//! `extra`, ignored by the scheduler and forwarded to the task queue.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::warn;

use crate::errors::{QueuedagError, Result};

/// Step-level priority. Higher values are submitted first.
pub const STEP_PRIORITY_TAG: &str = "queuedag/priority";
/// Run-level priority, added to every step's priority.
pub const RUN_PRIORITY_TAG: &str = "queuedag/run_priority";
/// Name of the queue a step is routed to.
pub const QUEUE_TAG: &str = "queuedag/queue";
/// Routing key hint for brokers that support one.
pub const ROUTE_TAG: &str = "queuedag/route";
/// Exchange hint for brokers that support one.
pub const EXCHANGE_TAG: &str = "queuedag/exchange";
/// Generic priority key that has no effect on queue ordering.
pub const GENERIC_PRIORITY_TAG: &str = "priority";

/// Tags recognised on a step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StepTags {
    pub priority: Option<i64>,
    pub queue: Option<String>,
    pub route: Option<String>,
    pub exchange: Option<String>,
    /// Unrecognised keys.
    pub extra: BTreeMap<String, String>,
}

impl StepTags {
    /// Parse a raw tag map for the step `step_key`.
    ///
    /// A priority tag that is not an integer is rejected: step tags are fixed
    /// when the plan is built, so a bad value is a plan error rather than
    /// something to paper over on every tick.
    pub fn parse(step_key: &str, raw: BTreeMap<String, String>) -> Result<Self> {
        let mut tags = StepTags::default();

        for (key, value) in raw {
            match key.as_str() {
                STEP_PRIORITY_TAG => {
                    let parsed = value.trim().parse::<i64>().map_err(|_| {
                        QueuedagError::PlanError(format!(
                            "step '{step_key}' has non-integer {STEP_PRIORITY_TAG} tag '{value}'"
                        ))
                    })?;
                    tags.priority = Some(parsed);
                }
                QUEUE_TAG => tags.queue = Some(value),
                ROUTE_TAG => tags.route = Some(value),
                EXCHANGE_TAG => tags.exchange = Some(value),
                _ => {
                    tags.extra.insert(key, value);
                }
            }
        }

        Ok(tags)
    }

    /// True if the step sets the generic `priority` tag without the
    /// queue-aware priority tag, which is almost always a mistake.
    pub fn has_misused_priority(&self) -> bool {
        self.priority.is_none() && self.extra.contains_key(GENERIC_PRIORITY_TAG)
    }
}

/// Tags recognised on a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunTags {
    /// Raw run priority as supplied; parsed leniently by [`RunTags::run_priority`].
    pub run_priority: Option<String>,
    pub extra: BTreeMap<String, String>,
}

impl RunTags {
    pub fn from_map(raw: BTreeMap<String, String>) -> Self {
        let mut tags = RunTags::default();
        for (key, value) in raw {
            if key == RUN_PRIORITY_TAG {
                tags.run_priority = Some(value);
            } else {
                tags.extra.insert(key, value);
            }
        }
        tags
    }

    pub fn with_run_priority(mut self, value: impl Into<String>) -> Self {
        self.run_priority = Some(value.into());
        self
    }

    /// Run priority as an integer. Missing or unparseable values resolve to 0.
    pub fn run_priority(&self) -> i64 {
        match self.run_priority.as_deref() {
            None => 0,
            Some(raw) => raw.trim().parse::<i64>().unwrap_or(0),
        }
    }

    /// Log a warning if the run priority tag is present but not an integer.
    pub fn warn_if_invalid(&self) {
        if let Some(raw) = self.run_priority.as_deref() {
            if raw.trim().parse::<i64>().is_err() {
                warn!(
                    tag = RUN_PRIORITY_TAG,
                    value = %raw,
                    "run priority tag is not an integer; using 0"
                );
            }
        }
    }
}
