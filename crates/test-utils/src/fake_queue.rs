use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use queuedag::active::KnownExecutionState;
use queuedag::engine::{InterruptHandle, StepEvent};
use queuedag::errors::ErrorInfo;
use queuedag::exec::{FetchError, PendingResult, QueueError, SubmitRequest, TaskQueue};

/// What a scripted task reports once it is ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// `Started` then `Success`.
    Succeed,
    /// `Started` then `Failure`.
    Fail(String),
    /// `Started` then `UpForRetry`.
    Retry(String),
    /// `Started` and nothing else.
    Silent,
    /// The fetch itself fails, as a crashed remote task would.
    RemoteError(String),
    /// The fetch reports the task as revoked.
    Revoked,
    /// Never ready until revoked.
    Hang,
    /// Never ready, and revoking it changes nothing.
    Unresponsive,
}

/// One submission as seen by the queue.
#[derive(Debug, Clone)]
pub struct Submission {
    pub step_key: String,
    pub queue: String,
    pub priority: i64,
    pub route: Option<String>,
    pub exchange: Option<String>,
    pub known_state: KnownExecutionState,
}

#[derive(Debug, Default)]
struct Recorded {
    submissions: Vec<Submission>,
    revokes: Vec<String>,
}

/// Shared view of everything a [`ScriptedQueue`] saw, usable after the queue
/// has been moved into the dispatch loop.
#[derive(Debug, Clone, Default)]
pub struct QueueRecorder {
    inner: Arc<Mutex<Recorded>>,
}

impl QueueRecorder {
    pub fn submissions(&self) -> Vec<Submission> {
        self.inner.lock().unwrap().submissions.clone()
    }

    pub fn submitted_keys(&self) -> Vec<String> {
        self.submissions().into_iter().map(|s| s.step_key).collect()
    }

    /// Every `revoke` call, duplicates included.
    pub fn revokes(&self) -> Vec<String> {
        self.inner.lock().unwrap().revokes.clone()
    }
}

/// A fake task queue that:
/// - records every submission and revoke
/// - answers each submission with the next scripted outcome for that step
///   (the last outcome repeats; unscripted steps succeed)
/// - optionally becomes ready only after a number of polls
/// - can reject submissions or raise an interrupt when a step is submitted
#[derive(Debug, Default)]
pub struct ScriptedQueue {
    scripts: HashMap<String, VecDeque<Outcome>>,
    delays: HashMap<String, u32>,
    reject: HashSet<String>,
    interrupt_on: HashMap<String, InterruptHandle>,
    recorder: QueueRecorder,
}

impl ScriptedQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorder(&self) -> QueueRecorder {
        self.recorder.clone()
    }

    /// Outcomes for successive submissions of `key`.
    pub fn script(mut self, key: &str, outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        self.scripts
            .insert(key.to_string(), outcomes.into_iter().collect());
        self
    }

    pub fn outcome(self, key: &str, outcome: Outcome) -> Self {
        self.script(key, [outcome])
    }

    /// Report not-ready for `polls` readiness checks before settling.
    pub fn delay(mut self, key: &str, polls: u32) -> Self {
        self.delays.insert(key.to_string(), polls);
        self
    }

    /// Refuse to enqueue `key`.
    pub fn reject(mut self, key: &str) -> Self {
        self.reject.insert(key.to_string());
        self
    }

    /// Request an interrupt as soon as `key` is submitted.
    pub fn interrupt_on_submit(mut self, key: &str, handle: InterruptHandle) -> Self {
        self.interrupt_on.insert(key.to_string(), handle);
        self
    }

    fn next_outcome(&mut self, key: &str) -> Outcome {
        match self.scripts.get_mut(key) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(Outcome::Succeed),
            Some(queue) => queue.front().cloned().unwrap_or(Outcome::Succeed),
            None => Outcome::Succeed,
        }
    }
}

impl TaskQueue for ScriptedQueue {
    type Handle = ScriptedHandle;

    fn submit(&mut self, request: SubmitRequest<'_>) -> Result<ScriptedHandle, QueueError> {
        let key = request.step.key.clone();

        if self.reject.contains(&key) {
            return Err(QueueError::Unavailable(format!(
                "scripted rejection of '{key}'"
            )));
        }

        self.recorder.inner.lock().unwrap().submissions.push(Submission {
            step_key: key.clone(),
            queue: request.queue.to_string(),
            priority: request.priority,
            route: request.route.map(str::to_string),
            exchange: request.exchange.map(str::to_string),
            known_state: request.known_state,
        });

        if let Some(handle) = self.interrupt_on.get(&key) {
            handle.request();
        }

        Ok(ScriptedHandle {
            outcome: self.next_outcome(&key),
            polls_left: self.delays.get(&key).copied().unwrap_or(0),
            revoked: false,
            recorder: self.recorder.clone(),
            step_key: key,
        })
    }
}

/// Pending result handed out by [`ScriptedQueue`].
#[derive(Debug)]
pub struct ScriptedHandle {
    step_key: String,
    outcome: Outcome,
    polls_left: u32,
    revoked: bool,
    recorder: QueueRecorder,
}

impl PendingResult for ScriptedHandle {
    /// A revoked task still waits out its remaining delay, so revocation is
    /// only as prompt as the script allows.
    fn is_ready(&mut self) -> bool {
        if self.outcome == Outcome::Unresponsive {
            return false;
        }
        if self.outcome == Outcome::Hang && !self.revoked {
            return false;
        }
        if self.polls_left > 0 {
            self.polls_left -= 1;
            return false;
        }
        true
    }

    fn fetch(&mut self) -> Result<Vec<StepEvent>, FetchError> {
        if self.revoked {
            return Err(FetchError::Revoked);
        }

        let key = self.step_key.as_str();
        match &self.outcome {
            Outcome::Succeed => Ok(vec![StepEvent::started(key), StepEvent::success(key)]),
            Outcome::Fail(msg) => Ok(vec![
                StepEvent::started(key),
                StepEvent::failure(key, ErrorInfo::new(msg.clone())),
            ]),
            Outcome::Retry(msg) => Ok(vec![
                StepEvent::started(key),
                StepEvent::up_for_retry(key, ErrorInfo::new(msg.clone())),
            ]),
            Outcome::Silent => Ok(vec![StepEvent::started(key)]),
            Outcome::RemoteError(msg) => Err(FetchError::Remote(ErrorInfo::new(msg.clone()))),
            Outcome::Revoked | Outcome::Hang | Outcome::Unresponsive => {
                Err(FetchError::Revoked)
            }
        }
    }

    /// Revoking a task that already finished, or an unresponsive one, is
    /// recorded but has no effect.
    fn revoke(&mut self) {
        self.recorder
            .inner
            .lock()
            .unwrap()
            .revokes
            .push(self.step_key.clone());
        if self.outcome == Outcome::Unresponsive {
            return;
        }
        let finished = self.outcome != Outcome::Hang && self.polls_left == 0;
        if !finished {
            self.revoked = true;
        }
    }
}
