// src/config/validate.rs

use std::time::Duration;

use tracing::debug;

use crate::config::model::{PlanFile, RawPlanFile};
use crate::engine::ExecutorConfig;
use crate::errors::{QueuedagError, Result};
use crate::plan::{ExecutionPlan, RunTags, Step};
use crate::types::{RetryMode, RetryPolicy};

impl TryFrom<RawPlanFile> for PlanFile {
    type Error = QueuedagError;

    /// Validate a raw plan file.
    ///
    /// This checks:
    /// - there is at least one step
    /// - `[executor]` values are usable (tick, retries, workers, queues)
    /// - step tags parse (see `StepTags::parse`)
    /// - dependencies exist, no step depends on itself, no cycles, and every
    ///   selected key is a step (see `ExecutionPlan::try_new`)
    fn try_from(raw: RawPlanFile) -> std::result::Result<Self, Self::Error> {
        ensure_has_steps(&raw)?;
        validate_executor(&raw)?;

        let steps = raw
            .step
            .into_iter()
            .map(|(key, cfg)| Step::new(key, cfg.after, cfg.tags, cfg.cmd))
            .collect::<Result<Vec<_>>>()?;

        let plan = ExecutionPlan::try_new(steps, raw.run.select, raw.run.external)?;

        let executor = ExecutorConfig {
            default_priority: raw.executor.default_priority,
            default_queue: raw.executor.default_queue.clone(),
            tick_interval: Duration::from_millis(raw.executor.tick_ms),
            retry_mode: RetryMode::new(raw.executor.retries, raw.executor.max_retries),
            revoke_grace: Duration::from_millis(raw.executor.revoke_grace_ms),
        };

        debug!(?executor, "plan file validated");

        Ok(PlanFile {
            queues: raw.executor.effective_queues(),
            workers: raw.executor.workers,
            executor,
            run_tags: RunTags::from_map(raw.run.tags),
            plan,
        })
    }
}

fn ensure_has_steps(cfg: &RawPlanFile) -> Result<()> {
    if cfg.step.is_empty() {
        return Err(QueuedagError::ConfigError(
            "plan must contain at least one [step.<key>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_executor(cfg: &RawPlanFile) -> Result<()> {
    let executor = &cfg.executor;

    if executor.tick_ms == 0 {
        return Err(QueuedagError::ConfigError(
            "[executor].tick_ms must be >= 1 (got 0)".to_string(),
        ));
    }

    if executor.retries == RetryPolicy::Enabled && executor.max_retries == 0 {
        return Err(QueuedagError::ConfigError(
            "[executor].retries = \"enabled\" requires [executor].max_retries >= 1".to_string(),
        ));
    }

    if executor.workers == 0 {
        return Err(QueuedagError::ConfigError(
            "[executor].workers must be >= 1 (got 0)".to_string(),
        ));
    }

    if executor.default_queue.trim().is_empty() {
        return Err(QueuedagError::ConfigError(
            "[executor].default_queue must not be empty".to_string(),
        ));
    }

    if !executor.queues.is_empty() && !executor.queues.contains(&executor.default_queue) {
        return Err(QueuedagError::ConfigError(format!(
            "[executor].default_queue '{}' is not listed in [executor].queues",
            executor.default_queue
        )));
    }

    Ok(())
}
