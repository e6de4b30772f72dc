// src/active/mod.rs

//! Active execution tracking.
//!
//! - [`tracker`] holds the per-run state machine that decides which steps
//!   are ready, records outcomes and cascades skips downstream of failures.
//! - [`state`] defines step states and the snapshots handed out by the
//!   tracker.

pub mod state;
pub mod tracker;

pub use state::{KnownExecutionState, RunSummary, StepState};
pub use tracker::ActiveExecution;
