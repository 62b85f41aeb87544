//! Observer interface through which the engine reports a run.
//!
//! For every accepted run exactly one of `on_complete`, `on_stopped` or
//! `on_error` fires. `on_step_done` fires once per advanced step, including
//! recognize steps that missed, and never for a gesture that failed.
//! A stopped run reports nothing after `on_stopped`.

use std::sync::Mutex;

use crate::script::{Comparison, Step, StepKind};

pub trait ExecutionCallback: Send + Sync {
    fn on_start(&self);

    fn on_complete(&self);

    fn on_stopped(&self);

    fn on_error(&self, reason: &str);

    fn on_step_done(&self, step: &Step, index: usize);

    fn on_number_match(&self, _recognized: f64, _target: f64, _comparison: Comparison) {}

    fn on_text_match(&self, _recognized: &str, _target: &str, _comparison: Comparison) {}

    /// The license gate closed, before or during a run. `on_error` follows.
    fn on_token_invalid(&self) {}

    /// A recognize step exhausted every stage without a match. The run
    /// continues with the next step.
    fn on_recognition_miss(&self, _step: &Step, _index: usize, _reason: &str) {}
}

/// One callback invocation, as captured by [`RecordingCallback`].
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionEvent {
    Start,
    Complete,
    Stopped,
    Error(String),
    StepDone {
        index: usize,
        kind: StepKind,
    },
    NumberMatch {
        recognized: f64,
        target: f64,
        comparison: Comparison,
    },
    TextMatch {
        recognized: String,
        target: String,
        comparison: Comparison,
    },
    TokenInvalid,
    RecognitionMiss {
        index: usize,
        reason: String,
    },
}

impl ExecutionEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionEvent::Complete | ExecutionEvent::Stopped | ExecutionEvent::Error(_)
        )
    }
}

/// Keeps every callback it receives, in order.
#[derive(Debug, Default)]
pub struct RecordingCallback {
    events: Mutex<Vec<ExecutionEvent>>,
}

impl RecordingCallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ExecutionEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn count(&self, predicate: impl Fn(&ExecutionEvent) -> bool) -> usize {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|e| predicate(*e))
            .count()
    }

    fn push(&self, event: ExecutionEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}

impl ExecutionCallback for RecordingCallback {
    fn on_start(&self) {
        self.push(ExecutionEvent::Start);
    }

    fn on_complete(&self) {
        self.push(ExecutionEvent::Complete);
    }

    fn on_stopped(&self) {
        self.push(ExecutionEvent::Stopped);
    }

    fn on_error(&self, reason: &str) {
        self.push(ExecutionEvent::Error(reason.to_string()));
    }

    fn on_step_done(&self, step: &Step, index: usize) {
        self.push(ExecutionEvent::StepDone {
            index,
            kind: step.kind(),
        });
    }

    fn on_number_match(&self, recognized: f64, target: f64, comparison: Comparison) {
        self.push(ExecutionEvent::NumberMatch {
            recognized,
            target,
            comparison,
        });
    }

    fn on_text_match(&self, recognized: &str, target: &str, comparison: Comparison) {
        self.push(ExecutionEvent::TextMatch {
            recognized: recognized.to_string(),
            target: target.to_string(),
            comparison,
        });
    }

    fn on_token_invalid(&self) {
        self.push(ExecutionEvent::TokenInvalid);
    }

    fn on_recognition_miss(&self, _step: &Step, index: usize, reason: &str) {
        self.push(ExecutionEvent::RecognitionMiss {
            index,
            reason: reason.to_string(),
        });
    }
}
