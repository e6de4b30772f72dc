// tests/local_queue.rs
//
// These run real `sh -c` commands through the in-process worker pool.

use std::time::Duration;

use queuedag::active::KnownExecutionState;
use queuedag::engine::{InterruptHandle, StepEventKind};
use queuedag::errors::QueuedagError;
use queuedag::exec::{FetchError, LocalTaskQueue, PendingResult, QueueError, SubmitRequest, TaskQueue};
use queuedag::plan::RunTags;
use queuedag_test_utils::builders::{PlanBuilder, StepBuilder};
use queuedag_test_utils::{fast_config, fast_config_with_retries, init_tracing, run_plan, with_timeout};

fn default_queue() -> LocalTaskQueue {
    LocalTaskQueue::new(["default"], 2)
}

async fn wait_until_ready<H: PendingResult>(handle: &mut H) {
    with_timeout(async {
        while !handle.is_ready() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
}

#[tokio::test]
async fn successful_commands_run_in_dependency_order() {
    init_tracing();

    let plan = PlanBuilder::new()
        .with_step(StepBuilder::new("first").cmd("echo first"))
        .with_step(StepBuilder::new("second").cmd("true").after("first"))
        .with_step(StepBuilder::new("noop"))
        .build();

    let out = run_plan(
        plan,
        default_queue(),
        fast_config(),
        RunTags::default(),
        InterruptHandle::new(),
    )
    .await;

    let summary = out.result.expect("run should succeed");
    assert!(summary.is_success());
    assert_eq!(summary.succeeded, vec!["first", "second", "noop"]);
}

#[tokio::test]
async fn non_zero_exit_fails_the_step() {
    init_tracing();

    let plan = PlanBuilder::new()
        .with_step(StepBuilder::new("broken").cmd("exit 3"))
        .with_step(StepBuilder::new("after").cmd("true").after("broken"))
        .build();

    let out = run_plan(
        plan,
        default_queue(),
        fast_config(),
        RunTags::default(),
        InterruptHandle::new(),
    )
    .await;

    let summary = out.result.expect("a failing command is not a run error");
    assert_eq!(summary.failed, vec!["broken"]);
    assert_eq!(summary.skipped, vec!["after"]);
}

#[tokio::test]
async fn retry_exit_code_requests_a_retry() {
    init_tracing();

    let plan = PlanBuilder::new()
        .with_step(StepBuilder::new("flaky").cmd("exit 75"))
        .build();

    let out = run_plan(
        plan,
        default_queue(),
        fast_config_with_retries(1),
        RunTags::default(),
        InterruptHandle::new(),
    )
    .await;

    assert_eq!(out.submitted(), vec!["flaky", "flaky"]);
    let summary = out.result.expect("run should complete");
    assert_eq!(summary.failed, vec!["flaky"]);
}

#[tokio::test]
async fn unknown_queue_is_a_submission_error() {
    init_tracing();

    let plan = PlanBuilder::new()
        .with_step(StepBuilder::new("gpu_job").cmd("true").queue("gpu"))
        .build();

    let out = run_plan(
        plan,
        default_queue(),
        fast_config(),
        RunTags::default(),
        InterruptHandle::new(),
    )
    .await;

    match out.result {
        Err(QueuedagError::Submission { step_key, source }) => {
            assert_eq!(step_key, "gpu_job");
            assert!(matches!(source, QueueError::UnknownQueue(q) if q == "gpu"));
        }
        other => panic!("expected Submission error, got {other:?}"),
    }
}

#[tokio::test]
async fn interrupt_kills_running_commands() {
    init_tracing();

    let plan = PlanBuilder::new()
        .with_step(StepBuilder::new("sleepy").cmd("sleep 30"))
        .with_step(StepBuilder::new("after").cmd("true").after("sleepy"))
        .build();

    let interrupt = InterruptHandle::new();
    {
        let interrupt = interrupt.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            interrupt.request();
        });
    }

    let out = run_plan(plan, default_queue(), fast_config(), RunTags::default(), interrupt).await;

    let summary = out.result.expect("an interrupted run is not an error");
    assert!(summary.interrupted);
    assert_eq!(summary.failed, vec!["sleepy"]);
    assert_eq!(summary.skipped, vec!["after"]);
}

#[tokio::test]
async fn handle_reports_command_outcome_and_environment() {
    init_tracing();

    let plan = PlanBuilder::new()
        .with_step(
            StepBuilder::new("env_check")
                .cmd(r#"test "$QUEUEDAG_STEP_KEY" = env_check && test "$QUEUEDAG_PRIORITY" = 3"#),
        )
        .build();
    let step = plan.get_step_by_key("env_check").unwrap();

    let mut queue = default_queue();
    assert!(queue.has_queue("default"));
    assert!(!queue.has_queue("gpu"));
    let mut handle = queue
        .submit(SubmitRequest {
            step,
            queue: "default",
            priority: 3,
            route: None,
            exchange: None,
            known_state: KnownExecutionState::default(),
        })
        .expect("submit to a configured queue");

    wait_until_ready(&mut handle).await;
    let events = handle.fetch().expect("command should report events");

    let kinds: Vec<StepEventKind> = events.into_iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![StepEventKind::Started, StepEventKind::Success]);
}

#[tokio::test]
async fn revoking_a_queued_step_reports_revoked() {
    init_tracing();

    let plan = PlanBuilder::new()
        .with_step(StepBuilder::new("blocker").cmd("sleep 30"))
        .with_step(StepBuilder::new("queued").cmd("true"))
        .build();

    // One worker: `queued` waits behind `blocker`.
    let mut queue = LocalTaskQueue::new(["default"], 1);
    let request = |key: &str| SubmitRequest {
        step: plan.get_step_by_key(key).unwrap(),
        queue: "default",
        priority: 0,
        route: None,
        exchange: None,
        known_state: KnownExecutionState::default(),
    };

    let mut blocker = queue.submit(request("blocker")).unwrap();
    let mut queued = queue.submit(request("queued")).unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!queued.is_ready());

    queued.revoke();
    queued.revoke();
    wait_until_ready(&mut queued).await;
    assert_eq!(queued.fetch(), Err(FetchError::Revoked));

    blocker.revoke();
    wait_until_ready(&mut blocker).await;
    assert_eq!(blocker.fetch(), Err(FetchError::Revoked));
}

#[tokio::test]
async fn freed_worker_goes_to_the_highest_priority_waiter() {
    init_tracing();

    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("order.log");
    let append = |name: &str| format!("echo {name} >> '{}'", log.display());

    let plan = PlanBuilder::new()
        .with_step(StepBuilder::new("blocker").cmd("sleep 30"))
        .with_step(StepBuilder::new("low").cmd(&append("low")))
        .with_step(StepBuilder::new("high").cmd(&append("high")))
        .build();

    let mut queue = LocalTaskQueue::new(["default"], 1);
    let request = |key: &str, priority: i64| SubmitRequest {
        step: plan.get_step_by_key(key).unwrap(),
        queue: "default",
        priority,
        route: None,
        exchange: None,
        known_state: KnownExecutionState::default(),
    };

    let mut blocker = queue.submit(request("blocker", 0)).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(queue.idle_workers("default"), Some(0));

    // `low` queues up first, `high` later.
    let mut low = queue.submit(request("low", 1)).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    let mut high = queue.submit(request("high", 9)).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    blocker.revoke();
    wait_until_ready(&mut blocker).await;
    wait_until_ready(&mut low).await;
    wait_until_ready(&mut high).await;
    assert!(low.fetch().is_ok());
    assert!(high.fetch().is_ok());

    let order = std::fs::read_to_string(&log).unwrap();
    assert_eq!(order.lines().collect::<Vec<_>>(), vec!["high", "low"]);
    assert_eq!(queue.idle_workers("default"), Some(1));
    assert_eq!(queue.idle_workers("gpu"), None);
}
