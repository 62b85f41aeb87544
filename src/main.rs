//! Screen Replay dry runner
//!
//! Replays a stored script against the simulated device, printing every
//! callback. Usage: `screen-replay <script-name> [scripts.json]`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use tracing::{info, warn};

use screen_replay::automation::{Engine, ExecutionCallback, ExecutionState};
use screen_replay::device::{AlwaysValid, BlankDetector, SimulatedDevice};
use screen_replay::script::{Comparison, Step};
use screen_replay::{logging, paths, Config, ScriptStore};

/// Prints callbacks to stdout.
struct ConsoleCallback;

impl ExecutionCallback for ConsoleCallback {
    fn on_start(&self) {
        println!("started");
    }

    fn on_complete(&self) {
        println!("completed");
    }

    fn on_stopped(&self) {
        println!("stopped");
    }

    fn on_error(&self, reason: &str) {
        println!("error: {}", reason);
    }

    fn on_step_done(&self, step: &Step, index: usize) {
        println!("step {} done: {}", index + 1, step);
    }

    fn on_number_match(&self, recognized: f64, target: f64, comparison: Comparison) {
        println!("number match: {} {} {}", recognized, comparison, target);
    }

    fn on_text_match(&self, recognized: &str, target: &str, comparison: Comparison) {
        println!("text match: \"{}\" {} \"{}\"", recognized, comparison, target);
    }

    fn on_token_invalid(&self) {
        println!("license invalid");
    }

    fn on_recognition_miss(&self, _step: &Step, index: usize, reason: &str) {
        println!("step {} recognition missed: {}", index + 1, reason);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = paths::ensure_directories() {
        eprintln!("Warning: failed to create log directory: {}", e);
    }
    logging::init(Some(&paths::logs_dir()))?;

    let mut args = std::env::args().skip(1);
    let name = args
        .next()
        .ok_or_else(|| anyhow!("usage: screen-replay <script-name> [scripts.json]"))?;
    let store = ScriptStore::new(
        args.next()
            .map(PathBuf::from)
            .unwrap_or_else(paths::scripts_path),
    );

    let config = Config::load(&paths::config_path());
    let script = store.find_by_name(&name)?.ok_or_else(|| {
        anyhow!(
            "no script named '{}' in {}",
            name,
            store.path().display()
        )
    })?;

    let engine = Engine::new(SimulatedDevice, BlankDetector, AlwaysValid, &config)?;
    let handle = engine.execute(script, Arc::new(ConsoleCallback))?;

    let state = tokio::select! {
        state = handle.finished() => state,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, stopping run");
            engine.stop();
            ExecutionState::Stopped
        }
    };

    info!(%state, "run finished");
    match state {
        ExecutionState::Errored(reason) => Err(anyhow!(reason)),
        _ => Ok(()),
    }
}
