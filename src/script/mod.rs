//! Recorded scripts: a named, ordered list of steps plus a repeat mode.

pub mod geometry;
pub mod step;
pub mod store;

pub use geometry::{GeometryError, MIN_REGION_SIZE, Rect};
pub use step::{Comparison, Recognition, Step, StepError, StepKind, Target};
pub use store::ScriptStore;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionMode {
    /// Run the steps once, then complete.
    #[default]
    Once,
    /// Start over from the first step until stopped.
    Repeat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub id: String,
    pub name: String,
    #[serde(rename = "events")]
    pub steps: Vec<Step>,
    #[serde(rename = "executionMode", default)]
    pub mode: ExecutionMode,
}

impl Script {
    /// Creates a script with a fresh unique id.
    pub fn new(name: impl Into<String>, steps: Vec<Step>, mode: ExecutionMode) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            steps,
            mode,
        }
    }

    pub fn is_repeating(&self) -> bool {
        self.mode == ExecutionMode::Repeat
    }
}
