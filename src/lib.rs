// src/lib.rs

pub mod active;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod plan;
pub mod types;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::active::RunSummary;
use crate::cli::CliArgs;
use crate::config::loader::{default_plan_path, load_from_path};
use crate::config::model::{PlanFile, RawPlanFile};
use crate::engine::{
    DispatchLoop, ExecutionEvent, InterruptHandle, PriorityResolver, RunContext,
};
use crate::exec::LocalTaskQueue;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - plan loading (with CLI overrides applied before validation)
/// - the local task queue
/// - the dispatch loop
/// - Ctrl-C handling
/// - the event printer
pub async fn run(args: CliArgs) -> Result<()> {
    let plan_path = args
        .plan
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(default_plan_path);
    let mut raw = load_from_path(&plan_path)
        .with_context(|| format!("failed to load plan file {}", plan_path.display()))?;
    apply_overrides(&mut raw, &args);

    let plan_file = PlanFile::try_from(raw)?;

    if args.dry_run {
        print_dry_run(&plan_file);
        return Ok(());
    }

    let summary = execute(plan_file, args.json).await?;

    if summary.interrupted {
        bail!(
            "run interrupted; {} step(s) did not finish",
            summary.unfinished.len()
        );
    }
    if !summary.is_success() {
        bail!(
            "run finished with {} failed and {} skipped step(s)",
            summary.failed.len(),
            summary.skipped.len()
        );
    }

    Ok(())
}

/// Run a validated plan on the local task queue until it completes, fails or
/// is interrupted.
pub async fn execute(plan_file: PlanFile, json: bool) -> Result<RunSummary> {
    let PlanFile {
        executor,
        workers,
        queues,
        run_tags,
        plan,
    } = plan_file;

    let interrupt = InterruptHandle::new();
    let (context, events_rx) = RunContext::channel(run_tags);
    let context = context.with_interrupt(interrupt.clone());

    // Ctrl-C → drain.
    {
        let interrupt = interrupt.clone();
        tokio::spawn(async move {
            loop {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "failed to listen for Ctrl+C");
                    return;
                }
                info!("interrupt received; draining in-flight steps");
                interrupt.request();
            }
        });
    }

    let printer = tokio::spawn(print_events(events_rx, json));

    info!(queues = ?queues, workers, "starting local task queue");
    let queue = LocalTaskQueue::new(&queues, workers);

    let result = DispatchLoop::new(plan, context, queue, executor).run().await;

    // The loop owned the only sender; the printer ends once it has drained.
    if let Err(e) = printer.await {
        warn!(error = %e, "event printer task failed");
    }

    Ok(result?)
}

/// Apply `--select` / `--tick-ms` / `--retries` / `--max-retries` on top of
/// the raw plan file.
pub fn apply_overrides(raw: &mut RawPlanFile, args: &CliArgs) {
    if !args.select.is_empty() {
        debug!(select = ?args.select, "overriding [run].select from CLI");
        raw.run.select = Some(args.select.clone());
    }
    if let Some(ms) = args.tick_ms {
        debug!(tick_ms = ms, "overriding [executor].tick_ms from CLI");
        raw.executor.tick_ms = ms;
    }
    if let Some(policy) = args.retries {
        debug!(?policy, "overriding [executor].retries from CLI");
        raw.executor.retries = policy;
    }
    if let Some(max) = args.max_retries {
        debug!(max_retries = max, "overriding [executor].max_retries from CLI");
        raw.executor.max_retries = max;
    }
}

async fn print_events(mut rx: mpsc::UnboundedReceiver<ExecutionEvent>, json: bool) {
    while let Some(event) = rx.recv().await {
        if !json {
            continue;
        }
        match serde_json::to_string(&event) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!(error = %e, "failed to serialise event"),
        }
    }
}

/// Print selected steps in the order they would be submitted if all were
/// ready at once.
fn print_dry_run(plan_file: &PlanFile) {
    let resolver =
        PriorityResolver::new(plan_file.executor.default_priority, &plan_file.run_tags);
    let plan = &plan_file.plan;

    println!("queuedag dry-run");
    println!("  executor.default_queue = {}", plan_file.executor.default_queue);
    println!(
        "  executor.tick_ms = {}",
        plan_file.executor.tick_interval.as_millis()
    );
    println!("  executor.retry_mode = {:?}", plan_file.executor.retry_mode);
    println!("  run priority = {}", resolver.run_priority());
    println!();

    let mut steps: Vec<_> = plan.steps_to_execute().collect();
    resolver.sort_steps(&mut steps);

    println!("steps ({} of {} selected):", steps.len(), plan.steps().len());
    for step in steps {
        let queue = step
            .tags
            .queue
            .as_deref()
            .unwrap_or(plan_file.executor.default_queue.as_str());
        println!("  - {}", step.key);
        println!("      priority: {}", resolver.submission_priority(step));
        println!("      queue: {queue}");
        if let Some(ref cmd) = step.command {
            println!("      cmd: {cmd}");
        }
        if !step.deps.is_empty() {
            println!("      after: {:?}", step.deps);
        }
    }

    debug!("dry-run complete (no execution)");
}
