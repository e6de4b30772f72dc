// src/engine/mod.rs

//! Orchestration engine for queuedag.
//!
//! This module ties together:
//! - the active execution tracker
//! - the priority resolver that orders submissions and result scans
//! - the dispatch loop that submits steps to a task queue, polls their
//!   results and reacts to interrupts
//!
//! The loop itself lives in [`dispatch`]; [`events`] and [`context`] define
//! what it publishes and where.

use std::time::Duration;

use crate::types::RetryMode;

pub mod context;
pub mod dispatch;
pub mod events;
pub mod interrupt;
pub mod priority;

pub use context::RunContext;
pub use dispatch::{DispatchLoop, LoopPhase};
pub use events::{ExecutionEvent, StepEvent, StepEventKind};
pub use interrupt::InterruptHandle;
pub use priority::{PriorityResolver, warn_on_priority_misuse};

/// Queue name used for steps without a queue tag.
pub const DEFAULT_QUEUE: &str = "default";

/// Interval between two scans of outstanding results.
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// How long a revoked task may take to settle before its handle is abandoned.
pub const DEFAULT_REVOKE_GRACE: Duration = Duration::from_secs(30);

/// Settings the dispatch loop consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Priority of steps without a priority tag.
    pub default_priority: i64,
    /// Queue for steps without a queue tag.
    pub default_queue: String,
    pub tick_interval: Duration,
    pub retry_mode: RetryMode,
    /// A revoked handle still not ready after this long is dropped and its
    /// step failed.
    pub revoke_grace: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_priority: 0,
            default_queue: DEFAULT_QUEUE.to_string(),
            tick_interval: DEFAULT_TICK,
            retry_mode: RetryMode::Disabled,
            revoke_grace: DEFAULT_REVOKE_GRACE,
        }
    }
}
