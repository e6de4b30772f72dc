// tests/config_loading.rs

use std::io::Write;
use std::time::Duration;

use tempfile::NamedTempFile;

use queuedag::config::{PlanFile, load_and_validate, load_from_path};
use queuedag::errors::QueuedagError;
use queuedag::types::RetryMode;

fn plan_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

#[test]
fn full_plan_file_is_loaded_with_defaults() {
    let file = plan_file(
        r#"
[executor]
retries = "enabled"
max_retries = 3
queues = ["default", "io"]

[run]
tags = { "queuedag/run_priority" = "2", "owner" = "etl" }

[step.extract]
cmd = "echo extract"
tags = { "queuedag/queue" = "io", "queuedag/priority" = "10" }

[step.load]
cmd = "echo load"
after = ["extract"]
"#,
    );

    let cfg = load_and_validate(file.path()).expect("plan should be valid");

    assert_eq!(cfg.executor.default_queue, "default");
    assert_eq!(cfg.executor.tick_interval, Duration::from_millis(1000));
    assert_eq!(cfg.executor.revoke_grace, Duration::from_secs(30));
    assert_eq!(cfg.executor.retry_mode, RetryMode::Enabled { max_retries: 3 });
    assert_eq!(cfg.workers, 4);
    assert_eq!(cfg.queues, vec!["default", "io"]);
    assert_eq!(cfg.run_tags.run_priority(), 2);
    assert_eq!(cfg.run_tags.extra.get("owner").map(String::as_str), Some("etl"));

    let extract = cfg.plan.get_step_by_key("extract").unwrap();
    assert_eq!(extract.tags.priority, Some(10));
    assert_eq!(extract.tags.queue.as_deref(), Some("io"));
    assert_eq!(extract.command.as_deref(), Some("echo extract"));

    let load = cfg.plan.get_step_by_key("load").unwrap();
    assert_eq!(load.deps, vec!["extract"]);
    assert_eq!(cfg.plan.step_keys_to_execute().len(), 2);
}

#[test]
fn queues_default_to_the_default_queue() {
    let file = plan_file(
        r#"
[executor]
default_queue = "batch"

[step.only]
"#,
    );

    let cfg = load_and_validate(file.path()).unwrap();
    assert_eq!(cfg.queues, vec!["batch"]);
    assert_eq!(cfg.executor.retry_mode, RetryMode::Disabled);
}

#[test]
fn dag_cycle_returns_structured_error() {
    let file = plan_file(
        r#"
[step.A]
after = ["B"]

[step.B]
after = ["A"]
"#,
    );

    match load_and_validate(file.path()) {
        Err(QueuedagError::DagCycle(msg)) => {
            assert!(msg.contains("cycle detected"));
            assert!(msg.contains('A') || msg.contains('B'));
        }
        Err(e) => panic!("Expected DagCycle error, got: {e:?}"),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn unknown_dependency_returns_plan_error() {
    let file = plan_file(
        r#"
[step.A]
after = ["NonExistent"]
"#,
    );

    match load_and_validate(file.path()) {
        Err(QueuedagError::PlanError(msg)) => {
            assert!(msg.contains("unknown dependency"));
            assert!(msg.contains("NonExistent"));
        }
        Err(e) => panic!("Expected PlanError, got: {e:?}"),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn external_dependency_is_accepted() {
    let file = plan_file(
        r#"
[run]
external = ["upstream_job"]

[step.A]
after = ["upstream_job"]
"#,
    );

    let cfg = load_and_validate(file.path()).unwrap();
    assert!(cfg.plan.external_keys().contains("upstream_job"));
}

#[test]
fn self_dependency_is_rejected() {
    let file = plan_file(
        r#"
[step.A]
after = ["A"]
"#,
    );

    assert!(matches!(
        load_and_validate(file.path()),
        Err(QueuedagError::PlanError(_))
    ));
}

#[test]
fn non_integer_step_priority_is_rejected() {
    let file = plan_file(
        r#"
[step.A]
tags = { "queuedag/priority" = "high" }
"#,
    );

    match load_and_validate(file.path()) {
        Err(QueuedagError::PlanError(msg)) => {
            assert!(msg.contains("'A'"));
            assert!(msg.contains("high"));
        }
        Err(e) => panic!("Expected PlanError, got: {e:?}"),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn unknown_selected_step_is_rejected() {
    let file = plan_file(
        r#"
[run]
select = ["missing"]

[step.A]
"#,
    );

    match load_and_validate(file.path()) {
        Err(QueuedagError::PlanError(msg)) => assert!(msg.contains("missing")),
        Err(e) => panic!("Expected PlanError, got: {e:?}"),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn empty_plan_is_a_config_error() {
    let file = plan_file("[executor]\ntick_ms = 10\n");

    assert!(matches!(
        load_and_validate(file.path()),
        Err(QueuedagError::ConfigError(_))
    ));
}

#[test]
fn invalid_executor_settings_are_config_errors() {
    for executor in [
        "tick_ms = 0",
        "retries = \"enabled\"",
        "workers = 0",
        "default_queue = \"\"",
        "default_queue = \"gpu\"\nqueues = [\"cpu\"]",
    ] {
        let file = plan_file(&format!("[executor]\n{executor}\n\n[step.A]\n"));
        match load_and_validate(file.path()) {
            Err(QueuedagError::ConfigError(_)) => {}
            Err(e) => panic!("[{executor}]: expected ConfigError, got: {e:?}"),
            Ok(_) => panic!("[{executor}]: expected error, got Ok"),
        }
    }
}

#[test]
fn malformed_toml_is_a_toml_error() {
    let file = plan_file("[step.A\ncmd = ");

    assert!(matches!(
        load_and_validate(file.path()),
        Err(QueuedagError::TomlError(_))
    ));
}

#[test]
fn raw_file_can_be_adjusted_before_validation() {
    let file = plan_file(
        r#"
[step.A]

[step.B]
after = ["A"]
"#,
    );

    let mut raw = load_from_path(file.path()).unwrap();
    raw.run.select = Some(vec!["B".to_string()]);
    raw.executor.tick_ms = 5;
    raw.executor.revoke_grace_ms = 250;

    let cfg = PlanFile::try_from(raw).unwrap();
    assert!(cfg.plan.is_selected("B"));
    assert!(!cfg.plan.is_selected("A"));
    assert_eq!(cfg.executor.tick_interval, Duration::from_millis(5));
    assert_eq!(cfg.executor.revoke_grace, Duration::from_millis(250));
}
