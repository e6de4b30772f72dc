// src/exec/task_runner.rs

//! Runs a single step's command for the local task queue.

use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::active::KnownExecutionState;
use crate::engine::events::StepEvent;
use crate::errors::ErrorInfo;
use crate::exec::backend::FetchError;
use crate::plan::StepKey;

/// Exit code a command uses to ask for a retry (`EX_TEMPFAIL`).
pub const RETRY_EXIT_CODE: i32 = 75;

/// Outcome delivered back to a [`LocalHandle`](super::LocalHandle).
pub type StepOutcome = std::result::Result<Vec<StepEvent>, FetchError>;

/// A step as seen by a local worker.
#[derive(Debug, Clone)]
pub struct StepJob {
    pub step_key: StepKey,
    pub command: Option<String>,
    pub queue: String,
    pub priority: i64,
    pub known_state: KnownExecutionState,
}

/// Run a step's command and translate the exit status into step events.
///
/// - No command: the step succeeds immediately.
/// - Exit 0: success. Exit [`RETRY_EXIT_CODE`]: up for retry. Anything else:
///   failure.
/// - If the cancel channel fires (or its sender is dropped) the child is
///   killed and the outcome is [`FetchError::Revoked`].
/// - Failing to spawn or wait on the process is a remote error, not a step
///   failure: the step never got to report anything.
pub async fn run_step(job: &StepJob, cancel_rx: &mut oneshot::Receiver<()>) -> StepOutcome {
    let Some(command) = job.command.as_deref() else {
        debug!(step = %job.step_key, "step has no command; reporting success");
        return Ok(vec![
            StepEvent::started(job.step_key.clone()),
            StepEvent::success(job.step_key.clone()),
        ]);
    };

    match run_command(job, command, cancel_rx).await {
        Ok(Some(code)) => Ok(events_for_exit_code(&job.step_key, code)),
        Ok(None) => Err(FetchError::Revoked),
        Err(err) => Err(FetchError::Remote(ErrorInfo::from_anyhow(&err))),
    }
}

fn events_for_exit_code(step_key: &str, code: i32) -> Vec<StepEvent> {
    let started = StepEvent::started(step_key);
    match code {
        0 => vec![started, StepEvent::success(step_key)],
        RETRY_EXIT_CODE => vec![
            started,
            StepEvent::up_for_retry(
                step_key,
                ErrorInfo::new(format!("command exited with status {code} (retry requested)")),
            ),
        ],
        _ => vec![
            started,
            StepEvent::failure(
                step_key,
                ErrorInfo::new(format!("command exited with status {code}")),
            ),
        ],
    }
}

/// Returns the exit code, or `None` if the run was cancelled.
async fn run_command(
    job: &StepJob,
    command: &str,
    cancel_rx: &mut oneshot::Receiver<()>,
) -> Result<Option<i32>> {
    info!(
        step = %job.step_key,
        queue = %job.queue,
        priority = job.priority,
        cmd = %command,
        "starting step process"
    );

    let known_state =
        serde_json::to_string(&job.known_state).context("serializing known execution state")?;

    // Build a shell command appropriate for the platform.
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(command);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(command);
        c
    };

    cmd.env("QUEUEDAG_STEP_KEY", &job.step_key)
        .env("QUEUEDAG_QUEUE", &job.queue)
        .env("QUEUEDAG_PRIORITY", job.priority.to_string())
        .env("QUEUEDAG_KNOWN_STATE", known_state)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning process for step '{}'", job.step_key))?;

    // Always consume output so buffers don't fill; log at debug.
    if let Some(stdout) = child.stdout.take() {
        let step_key = job.step_key.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(step = %step_key, "stdout: {}", line);
            }
        });
    }
    if let Some(stderr) = child.stderr.take() {
        let step_key = job.step_key.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(step = %step_key, "stderr: {}", line);
            }
        });
    }

    tokio::select! {
        status_res = child.wait() => {
            let status = status_res.with_context(|| {
                format!("waiting for process of step '{}'", job.step_key)
            })?;
            let code = status.code().unwrap_or(-1);

            info!(
                step = %job.step_key,
                exit_code = code,
                success = status.success(),
                "step process exited"
            );

            Ok(Some(code))
        }

        _ = cancel_rx => {
            info!(step = %job.step_key, "revoke requested; killing step process");
            if let Err(e) = child.kill().await {
                warn!(
                    step = %job.step_key,
                    error = %e,
                    "failed to kill child process on revoke"
                );
            }
            Ok(None)
        }
    }
}
