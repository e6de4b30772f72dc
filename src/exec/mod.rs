// src/exec/mod.rs

//! Task queue layer.
//!
//! - [`backend`] defines the [`TaskQueue`] / [`PendingResult`] traits the
//!   dispatch loop submits through, plus their error types.
//! - [`local`] provides [`LocalTaskQueue`], an in-process queue with a fixed
//!   worker pool per named queue.
//! - [`pool`] is that worker pool; it serves waiting steps by priority.
//! - [`task_runner`] runs a single step's command for the local queue using
//!   `tokio::process::Command`.

pub mod backend;
pub mod local;
pub mod pool;
pub mod task_runner;

pub use backend::{FetchError, PendingResult, QueueError, SubmitRequest, TaskQueue};
pub use local::{LocalHandle, LocalTaskQueue};
pub use pool::{WorkerPermit, WorkerPool};
