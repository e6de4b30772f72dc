// src/plan/step.rs

use std::collections::BTreeMap;

use serde::Serialize;

use crate::errors::Result;
use crate::plan::tags::StepTags;

/// Canonical step key type used throughout the crate.
pub type StepKey = String;

/// A single schedulable unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Step {
    pub key: StepKey,
    pub tags: StepTags,
    /// Direct upstream dependencies.
    pub deps: Vec<StepKey>,
    /// Shell command run by the local task queue. Remote queues ignore it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl Step {
    /// Build a step from raw string tags.
    pub fn new(
        key: impl Into<StepKey>,
        deps: Vec<StepKey>,
        tags: BTreeMap<String, String>,
        command: Option<String>,
    ) -> Result<Self> {
        let key = key.into();
        let tags = StepTags::parse(&key, tags)?;
        Ok(Self {
            key,
            tags,
            deps,
            command,
        })
    }
}
