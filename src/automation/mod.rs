//! Script execution.
//!
//! This module provides:
//! - The execution engine that replays a script's steps
//! - Run states and the process-wide single-flight coordinator
//! - The callback contract runs are reported through
//! - Typed errors for refused and failed runs

pub mod callback;
pub mod engine;
pub mod error;
pub mod state;

pub use callback::{ExecutionCallback, ExecutionEvent, RecordingCallback};
pub use engine::{Engine, RunHandle};
pub use error::ExecutionError;
pub use state::{Coordinator, ExecutionState};
