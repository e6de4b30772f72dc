// src/engine/context.rs

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::engine::events::{ExecutionEvent, StepEventKind};
use crate::engine::interrupt::InterruptHandle;
use crate::plan::RunTags;

/// Per-run context: run-scoped tags, the event sink and the interrupt flag.
#[derive(Debug, Clone)]
pub struct RunContext {
    tags: RunTags,
    events: mpsc::UnboundedSender<ExecutionEvent>,
    interrupt: InterruptHandle,
}

impl RunContext {
    pub fn new(tags: RunTags, events: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
        Self {
            tags,
            events,
            interrupt: InterruptHandle::new(),
        }
    }

    /// Create a context together with the receiving end of its event stream.
    pub fn channel(tags: RunTags) -> (Self, mpsc::UnboundedReceiver<ExecutionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tags, tx), rx)
    }

    /// Use an externally owned interrupt flag (e.g. one wired to Ctrl-C).
    pub fn with_interrupt(mut self, interrupt: InterruptHandle) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn tags(&self) -> &RunTags {
        &self.tags
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    /// Log an event and publish it to the sink.
    ///
    /// A dropped receiver is not an error: the run keeps going without an
    /// observer.
    pub fn emit(&self, event: ExecutionEvent) {
        log_event(&event);
        if self.events.send(event).is_err() {
            debug!("event receiver dropped; event not delivered");
        }
    }
}

fn log_event(event: &ExecutionEvent) {
    let step = event.step_key().unwrap_or("-");
    match event {
        ExecutionEvent::Step(e) => match e.kind {
            StepEventKind::Failure { .. } | StepEventKind::UpForRetry { .. } => {
                warn!(step = %step, "{event}")
            }
            StepEventKind::Started => debug!(step = %step, "{event}"),
            _ => info!(step = %step, "{event}"),
        },
        ExecutionEvent::StepErrored { .. } => warn!(step = %step, "{event}"),
        ExecutionEvent::EngineError { .. } | ExecutionEvent::AggregateFailure { .. } => {
            error!(step = %step, "{event}")
        }
        _ => info!(step = %step, "{event}"),
    }
}
