//! Screen Replay
//!
//! Records taps, swipes, waits and on-screen text/number checks into named
//! scripts and replays them against a host screen.

pub mod automation;
pub mod config;
pub mod device;
pub mod logging;
pub mod ocr;
pub mod paths;
pub mod script;

pub use automation::{Engine, ExecutionCallback, ExecutionError, ExecutionState};
pub use config::Config;
pub use script::{Script, ScriptStore, Step};
