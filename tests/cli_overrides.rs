// tests/cli_overrides.rs

use std::io::Write;

use clap::Parser;
use tempfile::NamedTempFile;

use queuedag::apply_overrides;
use queuedag::cli::CliArgs;
use queuedag::config::{PlanFile, load_from_path};
use queuedag::errors::QueuedagError;
use queuedag::types::RetryMode;

fn raw_plan() -> queuedag::config::RawPlanFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "[step.A]\n\n[step.B]\nafter = [\"A\"]\n").unwrap();
    load_from_path(file.path()).unwrap()
}

#[test]
fn retries_and_max_retries_flags_enable_retrying() {
    let args =
        CliArgs::try_parse_from(["queuedag", "--retries", "enabled", "--max-retries", "2"]).unwrap();

    let mut raw = raw_plan();
    apply_overrides(&mut raw, &args);

    let cfg = PlanFile::try_from(raw).unwrap();
    assert_eq!(cfg.executor.retry_mode, RetryMode::Enabled { max_retries: 2 });
}

#[test]
fn enabling_retries_without_a_limit_is_rejected() {
    let args = CliArgs::try_parse_from(["queuedag", "--retries", "enabled"]).unwrap();

    let mut raw = raw_plan();
    apply_overrides(&mut raw, &args);

    match PlanFile::try_from(raw) {
        Err(QueuedagError::ConfigError(msg)) => assert!(msg.contains("max_retries")),
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn select_and_tick_flags_override_the_file() {
    let args = CliArgs::try_parse_from(["queuedag", "--select", "B", "--tick-ms", "7"]).unwrap();

    let mut raw = raw_plan();
    apply_overrides(&mut raw, &args);

    let cfg = PlanFile::try_from(raw).unwrap();
    assert!(cfg.plan.is_selected("B"));
    assert!(!cfg.plan.is_selected("A"));
    assert_eq!(cfg.executor.tick_interval.as_millis(), 7);
}

#[test]
fn unknown_retry_policy_is_rejected_by_the_parser() {
    assert!(CliArgs::try_parse_from(["queuedag", "--retries", "sometimes"]).is_err());
}
