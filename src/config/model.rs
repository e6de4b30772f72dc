// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::engine::{DEFAULT_QUEUE, ExecutorConfig};
use crate::plan::{ExecutionPlan, RunTags};
use crate::types::RetryPolicy;

/// Top-level plan file as read from TOML.
///
/// ```toml
/// [executor]
/// default_queue = "default"
/// tick_ms = 1000
/// revoke_grace_ms = 30000
/// retries = "disabled"
///
/// [run]
/// tags = { "queuedag/run_priority" = "5" }
///
/// [step.extract]
/// cmd = "python extract.py"
///
/// [step.load]
/// cmd = "python load.py"
/// after = ["extract"]
/// tags = { "queuedag/priority" = "10", "queuedag/queue" = "io" }
/// ```
///
/// All sections are optional and have reasonable defaults. Steps are keyed
/// by name; plan order is the sorted order of the keys.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawPlanFile {
    /// Dispatch loop and local worker settings from `[executor]`.
    #[serde(default)]
    pub executor: ExecutorSection,

    /// Run-scoped settings from `[run]`.
    #[serde(default)]
    pub run: RunSection,

    /// All steps from `[step.<key>]`.
    #[serde(default)]
    pub step: BTreeMap<String, StepConfig>,
}

/// `[executor]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorSection {
    /// Priority for steps without a `queuedag/priority` tag.
    #[serde(default)]
    pub default_priority: i64,

    /// Queue for steps without a `queuedag/queue` tag.
    #[serde(default = "default_queue")]
    pub default_queue: String,

    /// Milliseconds between two scans of outstanding results.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Milliseconds a revoked task may take to settle before it is abandoned.
    #[serde(default = "default_revoke_grace_ms")]
    pub revoke_grace_ms: u64,

    /// `"disabled"` (default) or `"enabled"`.
    #[serde(default)]
    pub retries: RetryPolicy,

    /// Maximum retries per step when `retries = "enabled"`.
    #[serde(default)]
    pub max_retries: u32,

    /// Local workers per queue.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Queues the local task queue serves. Empty means only `default_queue`.
    #[serde(default)]
    pub queues: Vec<String>,
}

fn default_queue() -> String {
    DEFAULT_QUEUE.to_string()
}

fn default_tick_ms() -> u64 {
    1000
}

fn default_revoke_grace_ms() -> u64 {
    30_000
}

fn default_workers() -> usize {
    4
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            default_priority: 0,
            default_queue: default_queue(),
            tick_ms: default_tick_ms(),
            revoke_grace_ms: default_revoke_grace_ms(),
            retries: RetryPolicy::default(),
            max_retries: 0,
            workers: default_workers(),
            queues: Vec::new(),
        }
    }
}

impl ExecutorSection {
    /// Queues the local task queue should serve.
    pub fn effective_queues(&self) -> Vec<String> {
        if self.queues.is_empty() {
            vec![self.default_queue.clone()]
        } else {
            self.queues.clone()
        }
    }
}

/// `[run]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RunSection {
    /// Run-level tags, e.g. `queuedag/run_priority`.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,

    /// Steps to execute. If `None`, every step is selected.
    #[serde(default)]
    pub select: Option<Vec<String>>,

    /// Dependency keys already satisfied outside this plan.
    #[serde(default)]
    pub external: Vec<String>,
}

/// `[step.<key>]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct StepConfig {
    /// Shell command run by the local task queue. No command means the step
    /// succeeds as soon as a worker picks it up.
    #[serde(default)]
    pub cmd: Option<String>,

    /// Steps that must succeed before this one runs.
    #[serde(default)]
    pub after: Vec<String>,

    /// Free-form tags. See `plan::tags` for the recognised keys.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// A validated plan file.
///
/// Construct via `PlanFile::try_from(raw)`.
#[derive(Debug, Clone)]
pub struct PlanFile {
    pub executor: ExecutorConfig,
    pub workers: usize,
    pub queues: Vec<String>,
    pub run_tags: RunTags,
    pub plan: ExecutionPlan,
}
