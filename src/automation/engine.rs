//! Execution engine: walks a script's steps against the host device.
//!
//! Each accepted run is a spawned task that interprets steps one at a time.
//! All waits (settle delays, wait steps, the repeat interval and the
//! recognition cascade) race the run's cancellation token, so `stop()` takes
//! effect at the next suspension point and no step is dispatched after it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use super::callback::ExecutionCallback;
use super::error::ExecutionError;
use super::state::{Coordinator, ExecutionState};
use crate::config::{Config, ExecutionConfig};
use crate::device::{GestureDevice, LicenseGate, ScreenCapture, TextDetector};
use crate::ocr::{RecognitionCascade, RecognitionOutcome, Recognized};
use crate::script::{Recognition, Script, Step, StepKind, Target};

struct ActiveRun {
    id: u64,
    token: CancellationToken,
    callback: Arc<dyn ExecutionCallback>,
    reporter: Arc<Reporter>,
    done: watch::Sender<Option<ExecutionState>>,
}

/// Orders a run's progress callbacks against `on_stopped`.
///
/// The run task delivers progress while holding `gate`. A stop that finds the
/// gate taken leaves `on_stopped` owed and the task delivers it on release,
/// so `on_stopped` is the last callback of a stopped run even when `stop()`
/// is called from inside a progress callback.
#[derive(Default)]
struct Reporter {
    gate: Mutex<()>,
    stop_owed: AtomicBool,
}

impl Reporter {
    fn owe_stop(&self, callback: &dyn ExecutionCallback) {
        self.stop_owed.store(true, Ordering::SeqCst);
        let free = match self.gate.try_lock() {
            Ok(_) | Err(TryLockError::Poisoned(_)) => true,
            Err(TryLockError::WouldBlock) => false,
        };
        if free {
            self.settle_stop(callback);
        }
    }

    fn settle_stop(&self, callback: &dyn ExecutionCallback) {
        if self.stop_owed.swap(false, Ordering::SeqCst) {
            callback.on_stopped();
        }
    }
}

/// What one spawned run needs while it walks its steps.
struct RunScope<'a> {
    id: u64,
    token: &'a CancellationToken,
    reporter: &'a Reporter,
    callback: &'a dyn ExecutionCallback,
}

enum StepResult {
    Advanced,
    Cancelled,
    Failed(StepKind),
}

/// Resolves to the terminal state of one run.
pub struct RunHandle {
    id: u64,
    done: watch::Receiver<Option<ExecutionState>>,
}

impl RunHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.done.borrow().is_some()
    }

    /// Waits for the run to complete, stop or fail.
    pub async fn finished(mut self) -> ExecutionState {
        let result = self
            .done
            .wait_for(Option::is_some)
            .await
            .map(|state| (*state).clone());
        match result {
            Ok(Some(state)) => state,
            _ => self
                .done
                .borrow()
                .clone()
                .unwrap_or(ExecutionState::Stopped),
        }
    }
}

struct Inner<D, O, L> {
    device: Arc<D>,
    cascade: RecognitionCascade<Arc<D>, O>,
    license: L,
    coordinator: Arc<Coordinator>,
    config: ExecutionConfig,
    running: AtomicBool,
    repeating: AtomicBool,
    active: Mutex<Option<ActiveRun>>,
    state: Mutex<ExecutionState>,
    next_run_id: AtomicU64,
}

/// Held by every `Engine` clone; the run task only holds `Inner`.
struct Shared<D, O, L> {
    inner: Arc<Inner<D, O, L>>,
}

impl<D, O, L> Drop for Shared<D, O, L> {
    fn drop(&mut self) {
        self.inner.stop();
    }
}

/// Replays scripts against one device.
///
/// Clones share the same run. Dropping the last clone stops the current run,
/// which reports `on_stopped` and frees the coordinator.
pub struct Engine<D, O, L> {
    shared: Arc<Shared<D, O, L>>,
}

impl<D, O, L> Clone for Engine<D, O, L> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<D, O, L> Engine<D, O, L>
where
    D: GestureDevice + ScreenCapture,
    O: TextDetector,
    L: LicenseGate,
{
    /// Creates an engine that shares the process-wide single-flight guard.
    pub fn new(device: D, detector: O, license: L, config: &Config) -> anyhow::Result<Self> {
        Self::with_coordinator(device, detector, license, config, Coordinator::global())
    }

    pub fn with_coordinator(
        device: D,
        detector: O,
        license: L,
        config: &Config,
        coordinator: Arc<Coordinator>,
    ) -> anyhow::Result<Self> {
        let device = Arc::new(device);
        let cascade =
            RecognitionCascade::new(Arc::clone(&device), detector, config.recognition.clone())?;

        let inner = Arc::new(Inner {
            device,
            cascade,
            license,
            coordinator,
            config: config.execution.clone(),
            running: AtomicBool::new(false),
            repeating: AtomicBool::new(false),
            active: Mutex::new(None),
            state: Mutex::new(ExecutionState::Idle),
            next_run_id: AtomicU64::new(0),
        });
        Ok(Self {
            shared: Arc::new(Shared { inner }),
        })
    }

    fn inner(&self) -> &Arc<Inner<D, O, L>> {
        &self.shared.inner
    }

    pub fn is_running(&self) -> bool {
        self.inner().running.load(Ordering::SeqCst)
    }

    pub fn is_repeating(&self) -> bool {
        self.inner().repeating.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> ExecutionState {
        self.inner().lock_state().clone()
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.inner().coordinator
    }

    /// Starts running `script` on the current tokio runtime.
    ///
    /// A refused start is reported to `callback.on_error` as well as
    /// returned, and leaves every flag untouched.
    pub fn execute(
        &self,
        script: impl Into<Arc<Script>>,
        callback: Arc<dyn ExecutionCallback>,
    ) -> Result<RunHandle, ExecutionError> {
        let script = script.into();
        let inner = self.inner();

        if let Err(e) = inner.admit() {
            warn!(script = %script.name, reason = %e, "run refused");
            if e.is_license() {
                callback.on_token_invalid();
            }
            callback.on_error(&e.to_string());
            return Err(e);
        }

        let id = inner.next_run_id.fetch_add(1, Ordering::SeqCst) + 1;
        let token = CancellationToken::new();
        let reporter = Arc::new(Reporter::default());
        let (done_tx, done_rx) = watch::channel(None);
        {
            let mut active = inner.lock_active();
            inner.running.store(true, Ordering::SeqCst);
            inner
                .repeating
                .store(script.is_repeating(), Ordering::SeqCst);
            *active = Some(ActiveRun {
                id,
                token: token.clone(),
                callback: Arc::clone(&callback),
                reporter: Arc::clone(&reporter),
                done: done_tx,
            });
            *inner.lock_state() = ExecutionState::Running {
                index: 0,
                repeat_pass: 0,
            };
        }

        inner.license.touch_activity();
        info!(
            script = %script.name,
            steps = script.steps.len(),
            mode = ?script.mode,
            "run started"
        );
        callback.on_start();

        let span = info_span!("run", script = %script.name, run = id);
        tokio::spawn(
            Arc::clone(inner)
                .run(id, token, reporter, script, callback)
                .instrument(span),
        );

        Ok(RunHandle { id, done: done_rx })
    }

    /// Stops the current run, if any. Safe to call from anywhere, any number
    /// of times; only the first call for a run reports `on_stopped`.
    pub fn stop(&self) {
        self.inner().stop();
    }
}

impl<D, O, L> Inner<D, O, L> {
    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveRun>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_state(&self) -> MutexGuard<'_, ExecutionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn clear_flags(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.repeating.store(false, Ordering::SeqCst);
        self.coordinator.release();
    }

    fn is_current(active: &Option<ActiveRun>, id: u64) -> bool {
        active
            .as_ref()
            .is_some_and(|run| run.id == id && !run.token.is_cancelled())
    }

    fn is_live(&self, id: u64) -> bool {
        Self::is_current(&self.lock_active(), id)
    }

    fn set_state(&self, id: u64, state: ExecutionState) {
        let active = self.lock_active();
        if Self::is_current(&active, id) {
            *self.lock_state() = state;
        }
    }

    /// Ends run `id` with a terminal state. Returns false if the run was
    /// already stopped or replaced, in which case the caller must not report.
    fn finish(&self, id: u64, state: ExecutionState) -> bool {
        let mut active = self.lock_active();
        if !Self::is_current(&active, id) {
            return false;
        }
        let Some(run) = active.take() else {
            return false;
        };
        self.clear_flags();
        *self.lock_state() = state.clone();
        run.done.send_replace(Some(state));
        true
    }

    fn stop(&self) {
        let run = {
            let mut active = self.lock_active();
            let Some(run) = active.take() else {
                debug!("stop requested with nothing running");
                return;
            };
            run.token.cancel();
            self.clear_flags();
            *self.lock_state() = ExecutionState::Stopped;
            run.done.send_replace(Some(ExecutionState::Stopped));
            run
        };

        info!(run = run.id, "run stopped");
        run.reporter.owe_stop(run.callback.as_ref());
    }

    /// Delivers a progress callback unless the run has been stopped, then
    /// pays any `on_stopped` a concurrent stop left owed.
    fn report(&self, scope: &RunScope<'_>, emit: impl FnOnce(&dyn ExecutionCallback)) -> bool {
        let delivered = {
            let _gate = scope.reporter.gate.lock().unwrap_or_else(|e| e.into_inner());
            let live = self.is_live(scope.id);
            if live {
                emit(scope.callback);
            }
            live
        };
        scope.reporter.settle_stop(scope.callback);
        delivered
    }
}

impl<D, O, L> Inner<D, O, L>
where
    D: GestureDevice + ScreenCapture,
    O: TextDetector,
    L: LicenseGate,
{
    fn license_error(&self) -> ExecutionError {
        if self.license.is_expired() {
            ExecutionError::LicenseExpired
        } else {
            ExecutionError::LicenseInvalid
        }
    }

    fn admit(&self) -> Result<(), ExecutionError> {
        if !self.license.is_valid() {
            return Err(self.license_error());
        }
        if self.running.load(Ordering::SeqCst) {
            return Err(ExecutionError::EngineBusy);
        }
        if !self.coordinator.try_acquire() {
            return Err(ExecutionError::AlreadyRunning);
        }
        Ok(())
    }

    async fn run(
        self: Arc<Self>,
        id: u64,
        token: CancellationToken,
        reporter: Arc<Reporter>,
        script: Arc<Script>,
        callback: Arc<dyn ExecutionCallback>,
    ) {
        let scope = RunScope {
            id,
            token: &token,
            reporter: &reporter,
            callback: callback.as_ref(),
        };
        let mut index = 0usize;
        let mut pass = 0u32;

        loop {
            if !self.is_live(id) {
                debug!(index, "run no longer live");
                return;
            }

            if !self.license.is_valid() {
                let err = self.license_error();
                warn!(index, reason = %err, "license closed during run");
                if self.finish(id, ExecutionState::Errored(err.to_string())) {
                    callback.on_token_invalid();
                    callback.on_error(&err.to_string());
                }
                return;
            }

            let Some(step) = script.steps.get(index) else {
                if script.is_repeating() {
                    self.set_state(id, ExecutionState::WaitingToRepeat);
                    debug!(pass, "pass finished, waiting to repeat");
                    if !pause(&token, self.config.repeat_interval_ms).await {
                        return;
                    }
                    index = 0;
                    pass += 1;
                    continue;
                }

                if self.finish(id, ExecutionState::Completed) {
                    info!("run completed");
                    callback.on_complete();
                }
                return;
            };

            self.set_state(
                id,
                ExecutionState::Running {
                    index,
                    repeat_pass: pass,
                },
            );
            debug!(index, %step, "dispatching step");

            match self.dispatch(step, index, &scope).await {
                StepResult::Advanced => {
                    if !self.report(&scope, |cb| cb.on_step_done(step, index)) {
                        return;
                    }
                    index += 1;
                }
                StepResult::Cancelled => return,
                StepResult::Failed(kind) => {
                    let err = ExecutionError::StepFailed(kind);
                    warn!(index, %step, "gesture was not delivered");
                    if self.finish(id, ExecutionState::Errored(err.to_string())) {
                        callback.on_error(&err.to_string());
                    }
                    return;
                }
            }
        }
    }

    async fn dispatch(&self, step: &Step, index: usize, scope: &RunScope<'_>) -> StepResult {
        let token = scope.token;
        match step {
            Step::Click { x, y } => {
                let delivered = self.device.tap(*x, *y).await;
                if token.is_cancelled() {
                    return StepResult::Cancelled;
                }
                if !delivered {
                    return StepResult::Failed(StepKind::Click);
                }
                settle(token, self.config.click_settle_ms).await
            }
            Step::Swipe { x1, y1, x2, y2 } => {
                let delivered = self
                    .device
                    .swipe(*x1, *y1, *x2, *y2, self.config.swipe_duration_ms)
                    .await;
                if token.is_cancelled() {
                    return StepResult::Cancelled;
                }
                if !delivered {
                    return StepResult::Failed(StepKind::Swipe);
                }
                settle(token, self.config.swipe_settle_ms).await
            }
            Step::Wait { duration_ms } => settle(token, *duration_ms).await,
            Step::Recognize(recognition) => self.recognize(step, recognition, index, scope).await,
        }
    }

    /// A miss is reported and the run moves on; only cancellation stops it.
    async fn recognize(
        &self,
        step: &Step,
        recognition: &Recognition,
        index: usize,
        scope: &RunScope<'_>,
    ) -> StepResult {
        let token = scope.token;
        let comparison = recognition.comparison();
        let outcome = tokio::select! {
            _ = token.cancelled() => return StepResult::Cancelled,
            outcome = self.cascade.recognize(recognition.region(), recognition.target(), comparison) => outcome,
        };
        if token.is_cancelled() {
            return StepResult::Cancelled;
        }

        let delivered = match (outcome, recognition.target()) {
            (RecognitionOutcome::Success(Recognized::Number(value)), Target::Number(target)) => {
                info!(index, value, target, %comparison, "number matched");
                self.report(scope, |cb| cb.on_number_match(value, *target, comparison))
            }
            (RecognitionOutcome::Success(Recognized::Text(text)), Target::Text(target)) => {
                info!(index, %text, %target, "text matched");
                self.report(scope, |cb| cb.on_text_match(&text, target, comparison))
            }
            (RecognitionOutcome::Success(value), target) => {
                let reason = format!("recognized {} does not fit target {}", value, target);
                warn!(index, %reason, "recognition missed");
                self.report(scope, |cb| cb.on_recognition_miss(step, index, &reason))
            }
            (RecognitionOutcome::Failure { reason }, _) => {
                info!(index, %reason, "recognition missed, continuing");
                self.report(scope, |cb| cb.on_recognition_miss(step, index, &reason))
            }
        };

        if delivered {
            StepResult::Advanced
        } else {
            StepResult::Cancelled
        }
    }
}

/// Sleeps for `ms` unless cancelled first. Returns whether the full delay
/// elapsed.
async fn pause(token: &CancellationToken, ms: u64) -> bool {
    tokio::select! {
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(Duration::from_millis(ms)) => true,
    }
}

async fn settle(token: &CancellationToken, ms: u64) -> StepResult {
    if pause(token, ms).await {
        StepResult::Advanced
    } else {
        StepResult::Cancelled
    }
}
