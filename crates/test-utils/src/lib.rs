pub mod builders;
pub mod fake_queue;

use std::sync::Once;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, fmt};

use queuedag::active::RunSummary;
use queuedag::engine::{DispatchLoop, ExecutionEvent, ExecutorConfig, InterruptHandle, RunContext};
use queuedag::errors::Result;
use queuedag::exec::TaskQueue;
use queuedag::plan::{ExecutionPlan, RunTags};
use queuedag::types::RetryMode;

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Executor settings with a 1ms tick and a short revoke grace period so
/// tests don't crawl.
pub fn fast_config() -> ExecutorConfig {
    ExecutorConfig {
        tick_interval: Duration::from_millis(1),
        revoke_grace: Duration::from_millis(200),
        ..ExecutorConfig::default()
    }
}

/// Like [`fast_config`] with retries enabled.
pub fn fast_config_with_retries(max_retries: u32) -> ExecutorConfig {
    ExecutorConfig {
        retry_mode: RetryMode::Enabled { max_retries },
        ..fast_config()
    }
}

/// Outcome of [`run_plan`]: the loop's result plus every event it published.
pub struct RunOutput {
    pub result: Result<RunSummary>,
    pub events: Vec<ExecutionEvent>,
}

impl RunOutput {
    /// Keys of the `StepSubmitted` events, in publication order.
    pub fn submitted(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|e| match e {
                ExecutionEvent::StepSubmitted { step_key, .. } => Some(step_key.clone()),
                _ => None,
            })
            .collect()
    }
}

/// Drive `plan` through `queue` to completion (with a timeout) and collect
/// the published events.
pub async fn run_plan<Q: TaskQueue>(
    plan: ExecutionPlan,
    queue: Q,
    config: ExecutorConfig,
    tags: RunTags,
    interrupt: InterruptHandle,
) -> RunOutput {
    let (context, rx) = RunContext::channel(tags);
    let context = context.with_interrupt(interrupt);

    let result = with_timeout(DispatchLoop::new(plan, context, queue, config).run()).await;

    RunOutput {
        result,
        events: drain_events(rx),
    }
}

/// Collect whatever is buffered on an event receiver without waiting.
pub fn drain_events(mut rx: mpsc::UnboundedReceiver<ExecutionEvent>) -> Vec<ExecutionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
