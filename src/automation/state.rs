//! Run lifecycle states and the process-wide single-flight guard.
//!
//! A run moves Idle → Running → {Completed, Stopped, Errored}. Running carries
//! the step index and repeat pass; WaitingToRepeat is the pause between
//! passes of a repeating script.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionState {
    /// No run has started on this engine yet
    Idle,
    /// Executing the step at `index` during pass `repeat_pass` (0-based)
    Running { index: usize, repeat_pass: u32 },
    /// Between passes of a repeating script
    WaitingToRepeat,
    /// A run-once script finished all of its steps
    Completed,
    /// `stop()` ended the run
    Stopped,
    /// The run ended on an error
    Errored(String),
}

impl ExecutionState {
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ExecutionState::Running { .. } | ExecutionState::WaitingToRepeat
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionState::Completed | ExecutionState::Stopped | ExecutionState::Errored(_)
        )
    }
}

impl std::fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionState::Idle => write!(f, "Idle"),
            ExecutionState::Running { index, repeat_pass } => {
                write!(f, "Running step {} (pass {})", index + 1, repeat_pass + 1)
            }
            ExecutionState::WaitingToRepeat => write!(f, "Waiting to repeat"),
            ExecutionState::Completed => write!(f, "Completed"),
            ExecutionState::Stopped => write!(f, "Stopped"),
            ExecutionState::Errored(msg) => write!(f, "Error: {}", msg),
        }
    }
}

/// Guards "at most one script running" across every engine that shares it.
///
/// Engines created with [`Coordinator::global`] share one process-wide flag
/// that outlives any individual engine.
#[derive(Debug, Default)]
pub struct Coordinator {
    any_running: AtomicBool,
}

static GLOBAL: OnceLock<Arc<Coordinator>> = OnceLock::new();

impl Coordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide coordinator.
    pub fn global() -> Arc<Coordinator> {
        GLOBAL.get_or_init(|| Arc::new(Coordinator::new())).clone()
    }

    /// Claims the run slot. Returns false if another run holds it.
    pub fn try_acquire(&self) -> bool {
        self.any_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn release(&self) {
        self.any_running.store(false, Ordering::SeqCst);
    }

    pub fn is_any_running(&self) -> bool {
        self.any_running.load(Ordering::SeqCst)
    }
}
