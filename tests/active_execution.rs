// tests/active_execution.rs

use queuedag::active::{ActiveExecution, StepState};
use queuedag::engine::{InterruptHandle, StepEvent, StepEventKind};
use queuedag::errors::{ErrorInfo, QueuedagError};
use queuedag::plan::ExecutionPlan;
use queuedag::types::RetryMode;
use queuedag_test_utils::builders::{PlanBuilder, StepBuilder};
use queuedag_test_utils::init_tracing;

/// a -> b -> c, plus an independent d.
fn chain_plan() -> ExecutionPlan {
    PlanBuilder::new()
        .with_step(StepBuilder::new("a"))
        .with_step(StepBuilder::new("b").after("a"))
        .with_step(StepBuilder::new("c").after("b"))
        .with_step(StepBuilder::new("d"))
        .build()
}

fn keys(steps: &[&queuedag::plan::Step]) -> Vec<String> {
    steps.iter().map(|s| s.key.clone()).collect()
}

#[test]
fn ready_steps_are_released_exactly_once() {
    init_tracing();
    let plan = chain_plan();
    let mut active = ActiveExecution::new(&plan, RetryMode::Disabled, InterruptHandle::new());

    assert_eq!(keys(&active.get_steps_to_execute()), vec!["a", "d"]);
    assert!(active.get_steps_to_execute().is_empty());
    assert_eq!(active.state_of("a"), Some(StepState::InFlight));
    assert_eq!(active.state_of("b"), Some(StepState::NotReady));

    active.handle_event(&StepEvent::started("a"));
    active.handle_event(&StepEvent::success("a"));
    active.verify_complete("a").expect("a finished cleanly");

    assert_eq!(keys(&active.get_steps_to_execute()), vec!["b"]);
    assert!(!active.is_complete());
}

#[test]
fn failure_cascades_skips_through_the_graph() {
    init_tracing();
    let plan = chain_plan();
    let mut active = ActiveExecution::new(&plan, RetryMode::Disabled, InterruptHandle::new());

    active.get_steps_to_execute();
    active.handle_event(&StepEvent::failure("a", ErrorInfo::new("boom")));
    active.handle_event(&StepEvent::success("d"));

    let skipped: Vec<String> = active
        .plan_events_iterator()
        .filter(|e| matches!(e.kind, StepEventKind::Skipped { .. }))
        .map(|e| e.step_key)
        .collect();
    assert_eq!(skipped.len(), 2);
    assert!(skipped.contains(&"b".to_string()));
    assert!(skipped.contains(&"c".to_string()));

    // Drained.
    assert_eq!(active.plan_events_iterator().count(), 0);

    assert!(active.is_complete());
    let summary = active.summary();
    assert_eq!(summary.failed, vec!["a"]);
    assert_eq!(summary.skipped, vec!["b", "c"]);
    assert_eq!(summary.succeeded, vec!["d"]);
}

#[test]
fn outcome_for_a_step_not_in_flight_is_ignored() {
    init_tracing();
    let plan = chain_plan();
    let mut active = ActiveExecution::new(&plan, RetryMode::Disabled, InterruptHandle::new());

    active.handle_event(&StepEvent::success("b"));
    active.handle_event(&StepEvent::success("nope"));

    assert_eq!(active.state_of("b"), Some(StepState::NotReady));
    assert_eq!(active.state_of("nope"), None);
}

#[test]
fn verify_complete_reports_lost_state() {
    init_tracing();
    let plan = chain_plan();
    let mut active = ActiveExecution::new(&plan, RetryMode::Disabled, InterruptHandle::new());

    match active.verify_complete("ghost") {
        Err(QueuedagError::Consistency(msg)) => assert!(msg.contains("ghost")),
        other => panic!("expected Consistency error, got {other:?}"),
    }

    match active.verify_complete("b") {
        Err(QueuedagError::Consistency(msg)) => assert!(msg.contains("never released")),
        other => panic!("expected Consistency error, got {other:?}"),
    }
}

#[test]
fn verify_complete_fails_a_step_left_in_flight() {
    init_tracing();
    let plan = chain_plan();
    let mut active = ActiveExecution::new(&plan, RetryMode::Disabled, InterruptHandle::new());

    active.get_steps_to_execute();
    active.handle_event(&StepEvent::started("a"));
    active.verify_complete("a").expect("in-flight step is failed, not an error");

    assert_eq!(active.state_of("a"), Some(StepState::Failed));
    assert_eq!(active.state_of("b"), Some(StepState::Skipped));

    let events: Vec<StepEvent> = active.plan_events_iterator().collect();
    assert!(matches!(events[0].kind, StepEventKind::Failure { .. }));
    assert_eq!(events[0].step_key, "a");
}

#[test]
fn retry_re_releases_until_the_limit() {
    init_tracing();
    let plan = PlanBuilder::new()
        .with_step(StepBuilder::new("flaky"))
        .build();
    let mut active = ActiveExecution::new(
        &plan,
        RetryMode::Enabled { max_retries: 1 },
        InterruptHandle::new(),
    );

    assert_eq!(keys(&active.get_steps_to_execute()), vec!["flaky"]);
    active.handle_event(&StepEvent::up_for_retry("flaky", ErrorInfo::new("busy")));
    active.verify_complete("flaky").expect("retry pending is consistent");
    assert_eq!(active.state_of("flaky"), Some(StepState::Ready));
    assert_eq!(active.get_known_state().retries.get("flaky"), Some(&1));

    assert_eq!(keys(&active.get_steps_to_execute()), vec!["flaky"]);
    active.handle_event(&StepEvent::up_for_retry("flaky", ErrorInfo::new("busy")));
    assert_eq!(active.state_of("flaky"), Some(StepState::Failed));
    assert!(active.is_complete());
}

#[test]
fn interrupt_is_consumed_once_and_stops_releases() {
    init_tracing();
    let plan = chain_plan();
    let interrupt = InterruptHandle::new();
    let mut active = ActiveExecution::new(&plan, RetryMode::Disabled, interrupt.clone());

    assert!(!active.check_for_interrupts());
    interrupt.request();
    assert!(interrupt.is_requested());
    assert!(active.check_for_interrupts());
    assert!(!interrupt.is_requested());
    assert!(!active.check_for_interrupts());

    active.mark_interrupted();
    active.mark_interrupted();
    assert!(active.is_interrupted());
    assert!(active.get_steps_to_execute().is_empty());

    let summary = active.summary();
    assert!(summary.interrupted);
    assert_eq!(summary.unfinished, vec!["a", "b", "c", "d"]);
}

#[test]
fn known_state_tracks_terminal_outcomes() {
    init_tracing();
    let plan = chain_plan();
    let mut active = ActiveExecution::new(&plan, RetryMode::Disabled, InterruptHandle::new());

    active.get_steps_to_execute();
    active.handle_event(&StepEvent::success("d"));
    active.handle_event(&StepEvent::failure("a", ErrorInfo::new("boom")));

    let known = active.get_known_state();
    assert!(known.succeeded.contains("d"));
    assert!(known.failed.contains("a"));
    assert!(known.skipped.contains("b"));
    assert!(known.skipped.contains("c"));
    assert!(known.retries.is_empty());
}
