//! # Job: one in-flight level transition.
//!
//! A [`Job`] is created per accepted transition request. It exposes the
//! future-shaped surface (`wait`, `cancel`, `change_proposed_level`) and
//! owns the driver of the current direction as a tagged state:
//!
//! ```text
//! Idle ──► Ascending(driver) ◄──repurpose──► Descending(driver) ──► Done
//! ```
//!
//! ## Rules
//! - At most one job is non-done per context; the gate is released when
//!   the job reaches a terminal state.
//! - Listener callbacks are dispatched from here, outside every lock, with
//!   panic isolation; `in_callback` is a depth counter because a callback
//!   that retargets the job may run the replacement driver inline.
//! - `change_proposed_level` is legal only from inside a callback on this
//!   job; a sign flip repurposes the current driver and starts a fresh one
//!   of the opposite direction.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{Mutex as AsyncMutex, Notify};

use crate::config::Config;
use crate::core::ascent::AscentDriver;
use crate::core::context::RunLevelContext;
use crate::core::descent::DescentDriver;
use crate::core::lock;
use crate::error::{JobFailure, OrchestratorError};
use crate::listeners::{ErrorAction, ErrorInfo, ProgressStartedListener, RunLevelListener, Sorter};
use crate::registry::Locator;
use crate::service::ServiceHandle;

/// Result of one [`Job::wait`] round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The transition reached a terminal state.
    Done,
    /// The timeout elapsed first; the job is still in flight.
    TimedOut,
    /// The job reversed direction underneath the waiter. Re-query
    /// direction and wait again.
    Repurposed,
}

/// Completion state of one driver, shared with waiters.
pub(crate) struct Completion {
    state: Mutex<CompletionState>,
    notify: Notify,
}

#[derive(Default)]
struct CompletionState {
    done: bool,
    repurposed: bool,
    failure: Option<JobFailure>,
}

impl Completion {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(CompletionState::default()),
            notify: Notify::new(),
        })
    }

    pub(crate) fn finish(&self, failure: Option<JobFailure>) {
        {
            let mut state = lock(&self.state);
            state.done = true;
            state.failure = failure;
        }
        self.notify.notify_waiters();
    }

    pub(crate) fn mark_repurposed(&self) {
        lock(&self.state).repurposed = true;
        self.notify.notify_waiters();
    }

    async fn wait(&self) -> Result<WaitOutcome, JobFailure> {
        loop {
            let notified = self.notify.notified();
            {
                let state = lock(&self.state);
                if state.repurposed {
                    return Ok(WaitOutcome::Repurposed);
                }
                if state.done {
                    return match &state.failure {
                        Some(failure) => Err(failure.clone()),
                        None => Ok(WaitOutcome::Done),
                    };
                }
            }
            notified.await;
        }
    }
}

/// Tagged driver state of a job.
pub(crate) enum JobState {
    /// Construction placeholder; never observed once `create` returns.
    Idle,
    Ascending(Arc<AscentDriver>),
    Descending(Arc<DescentDriver>),
    Done { failure: Option<JobFailure> },
}

pub(crate) struct JobCore {
    pub(crate) proposed: i32,
    pub(crate) state: JobState,
    pub(crate) cancelled: bool,
    /// Callback nesting depth; non-zero while a listener runs.
    pub(crate) in_callback: u32,
}

/// A driver about to be started.
pub(crate) enum DriverRef {
    Up(Arc<AscentDriver>),
    Down(Arc<DescentDriver>),
}

/// Handle to one in-flight level transition.
pub struct Job {
    pub(crate) ctx: Arc<RunLevelContext>,
    pub(crate) locator: Arc<dyn Locator>,
    pub(crate) cfg: Config,
    listeners: Arc<[Arc<dyn RunLevelListener>]>,
    progress_started: Arc<[Arc<dyn ProgressStartedListener>]>,
    sorters: Arc<[Arc<dyn Sorter>]>,
    core: Mutex<JobCore>,
    /// Serializes `on_error` dispatch from concurrent pool workers.
    error_gate: AsyncMutex<()>,
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("proposed", &lock(&self.core).proposed)
            .finish()
    }
}

impl Job {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn create(
        ctx: Arc<RunLevelContext>,
        locator: Arc<dyn Locator>,
        cfg: Config,
        listeners: Arc<[Arc<dyn RunLevelListener>]>,
        progress_started: Arc<[Arc<dyn ProgressStartedListener>]>,
        sorters: Arc<[Arc<dyn Sorter>]>,
        proposed: i32,
        current: i32,
    ) -> Arc<Self> {
        let job = Arc::new(Self {
            ctx,
            locator,
            cfg,
            listeners,
            progress_started,
            sorters,
            core: Mutex::new(JobCore {
                proposed,
                state: JobState::Idle,
                cancelled: false,
                in_callback: 0,
            }),
            error_gate: AsyncMutex::new(()),
        });
        let state = if current == proposed {
            JobState::Done { failure: None }
        } else if current < proposed {
            JobState::Ascending(AscentDriver::new(&job, proposed, current))
        } else {
            JobState::Descending(DescentDriver::new(&job, proposed, current))
        };
        lock(&job.core).state = state;
        job
    }

    /// The level this job is moving the container to.
    pub fn proposed_level(&self) -> i32 {
        lock(&self.core).proposed
    }

    /// True while the job ascends.
    pub fn is_up(&self) -> bool {
        matches!(lock(&self.core).state, JobState::Ascending(_))
    }

    /// True while the job descends.
    pub fn is_down(&self) -> bool {
        matches!(lock(&self.core).state, JobState::Descending(_))
    }

    /// True once the job reached a terminal state.
    pub fn is_done(&self) -> bool {
        matches!(lock(&self.core).state, JobState::Done { .. })
    }

    /// True once `cancel` took effect on this job.
    pub fn is_cancelled(&self) -> bool {
        lock(&self.core).cancelled
    }

    /// Waits until the transition completes.
    ///
    /// Returns [`WaitOutcome::Repurposed`] when the job reversed direction
    /// underneath the waiter; re-query direction and wait again. A job that
    /// completed with accumulated failures reports them as an error.
    pub async fn wait(&self) -> Result<WaitOutcome, JobFailure> {
        self.wait_inner(None).await
    }

    /// Like [`Job::wait`] but gives up after `timeout`, returning
    /// [`WaitOutcome::TimedOut`].
    pub async fn wait_timeout(&self, timeout: Duration) -> Result<WaitOutcome, JobFailure> {
        self.wait_inner(Some(timeout)).await
    }

    async fn wait_inner(&self, timeout: Option<Duration>) -> Result<WaitOutcome, JobFailure> {
        let completion = {
            let core = lock(&self.core);
            match &core.state {
                JobState::Done { failure } => {
                    return match failure {
                        Some(failure) => Err(failure.clone()),
                        None => Ok(WaitOutcome::Done),
                    };
                }
                // No driver: nothing to wait for.
                JobState::Idle => return Ok(WaitOutcome::Done),
                JobState::Ascending(up) => up.completion(),
                JobState::Descending(down) => down.completion(),
            }
        };
        match timeout {
            None => completion.wait().await,
            Some(timeout) => match tokio::time::timeout(timeout, completion.wait()).await {
                Ok(result) => result,
                Err(_elapsed) => Ok(WaitOutcome::TimedOut),
            },
        }
    }

    /// Requests cancellation. Idempotent; returns `false` if the job is
    /// already done or cancelled.
    ///
    /// Cancellation is best-effort and non-blocking: it prevents new work
    /// and arms the hard-cancel deadline; completion may lag behind by up
    /// to `cancel_timeout` plus one stuck teardown.
    pub fn cancel(&self) -> bool {
        // Gate lock first; taking the job lock before it can deadlock
        // against submit/driver paths.
        let _gate = self.ctx.hold_gate();
        let driver = {
            let mut core = lock(&self.core);
            if matches!(core.state, JobState::Done { .. }) || core.cancelled {
                return false;
            }
            core.cancelled = true;
            match &core.state {
                JobState::Ascending(up) => Some(DriverRef::Up(up.clone())),
                JobState::Descending(down) => Some(DriverRef::Down(down.clone())),
                _ => None,
            }
        };
        match driver {
            Some(DriverRef::Up(up)) => up.cancel(),
            Some(DriverRef::Down(down)) => down.cancel(),
            None => {}
        }
        true
    }

    /// Replaces the proposed level of the in-flight transition.
    ///
    /// Permitted only from inside a listener callback on this job; fails
    /// with `IllegalState` otherwise, or when the job is already done. If
    /// the new level is on the other side of the current level, the job is
    /// repurposed: the active driver winds down to the level it already
    /// achieved, waiters observe [`WaitOutcome::Repurposed`], and a fresh
    /// driver of the opposite direction takes over.
    ///
    /// Returns the previously proposed level.
    pub async fn change_proposed_level(
        self: &Arc<Self>,
        proposed: i32,
    ) -> Result<i32, OrchestratorError> {
        let current = self.ctx.current_level();
        let (old, launch) = {
            let mut core = lock(&self.core);
            if matches!(core.state, JobState::Done { .. }) {
                return Err(OrchestratorError::IllegalState {
                    reason: "cannot change the proposed level of a completed job".into(),
                });
            }
            if core.in_callback == 0 {
                return Err(OrchestratorError::IllegalState {
                    reason: "change_proposed_level must be called from inside a listener callback"
                        .into(),
                });
            }
            let old = core.proposed;
            core.proposed = proposed;
            let launch = match &core.state {
                JobState::Ascending(up) => {
                    if current <= proposed {
                        up.set_going_to(proposed, false);
                        None
                    } else {
                        // Direction flips to down.
                        up.set_going_to(current, true);
                        let down = DescentDriver::new(self, proposed, current);
                        core.state = JobState::Descending(down.clone());
                        Some(DriverRef::Down(down))
                    }
                }
                JobState::Descending(down) => {
                    if current >= proposed {
                        down.set_going_to(proposed, false);
                        None
                    } else {
                        // Direction flips to up.
                        down.set_going_to(current, true);
                        let up = AscentDriver::new(self, proposed, current);
                        core.state = JobState::Ascending(up.clone());
                        Some(DriverRef::Up(up))
                    }
                }
                _ => {
                    return Err(OrchestratorError::IllegalState {
                        reason: "job has no active driver".into(),
                    });
                }
            };
            (old, launch)
        };
        if let Some(driver) = launch {
            self.go(driver).await;
        }
        Ok(old)
    }

    /// Starts a driver, once: spawned in threaded mode, inline otherwise.
    pub(crate) async fn go(&self, driver: DriverRef) {
        match driver {
            DriverRef::Up(up) => {
                if !up.mark_started() {
                    return;
                }
                if self.cfg.threaded() {
                    tokio::spawn(up.run());
                } else {
                    up.run().await;
                }
            }
            DriverRef::Down(down) => {
                if !down.mark_started() {
                    return;
                }
                if self.cfg.threaded() {
                    tokio::spawn(down.run());
                } else {
                    down.run().await;
                }
            }
        }
    }

    /// The driver currently installed, if any.
    pub(crate) fn driver_ref(&self) -> Option<DriverRef> {
        match &lock(&self.core).state {
            JobState::Ascending(up) => Some(DriverRef::Up(up.clone())),
            JobState::Descending(down) => Some(DriverRef::Down(down.clone())),
            _ => None,
        }
    }

    /// Moves the job to its terminal state. The gate is released
    /// separately by the driver, after this call.
    pub(crate) fn finish(&self, failure: Option<JobFailure>) {
        lock(&self.core).state = JobState::Done { failure };
    }

    fn begin_callback(&self) {
        lock(&self.core).in_callback += 1;
    }

    fn end_callback(&self) {
        lock(&self.core).in_callback -= 1;
    }

    pub(crate) async fn dispatch_progress_started(self: &Arc<Self>, current_level: i32) {
        let listeners = self.progress_started.clone();
        self.begin_callback();
        for listener in listeners.iter() {
            let call = listener.on_progress_starting(self, current_level);
            if let Err(panic) = std::panic::AssertUnwindSafe(call).catch_unwind().await {
                eprintln!(
                    "[levelvisor] progress-started listener '{}' panicked: {:?}",
                    listener.name(),
                    panic
                );
            }
        }
        self.end_callback();
    }

    pub(crate) async fn dispatch_progress(self: &Arc<Self>, level: i32) {
        let listeners = self.listeners.clone();
        self.begin_callback();
        for listener in listeners.iter() {
            let call = listener.on_progress(self, level);
            if let Err(panic) = std::panic::AssertUnwindSafe(call).catch_unwind().await {
                eprintln!(
                    "[levelvisor] listener '{}' panicked in on_progress: {:?}",
                    listener.name(),
                    panic
                );
            }
        }
        self.end_callback();
    }

    pub(crate) async fn dispatch_cancelled(self: &Arc<Self>, level: i32) {
        let listeners = self.listeners.clone();
        self.begin_callback();
        for listener in listeners.iter() {
            let call = listener.on_cancelled(self, level);
            if let Err(panic) = std::panic::AssertUnwindSafe(call).catch_unwind().await {
                eprintln!(
                    "[levelvisor] listener '{}' panicked in on_cancelled: {:?}",
                    listener.name(),
                    panic
                );
            }
        }
        self.end_callback();
    }

    /// Reports a failure to every listener and aggregates their votes:
    /// any expressed stop wins over ignore; no votes fall back to the
    /// phase default.
    pub(crate) async fn dispatch_error(self: &Arc<Self>, info: &ErrorInfo) -> ErrorAction {
        // Pool workers may report failures concurrently in threaded mode;
        // in cooperative mode everything already runs on one task, and a
        // callback retargeting the job may legally re-enter here.
        let _serial = if self.cfg.threaded() {
            Some(self.error_gate.lock().await)
        } else {
            None
        };
        let listeners = self.listeners.clone();
        self.begin_callback();
        let mut vote: Option<ErrorAction> = None;
        for listener in listeners.iter() {
            let call = listener.on_error(self, info);
            match std::panic::AssertUnwindSafe(call).catch_unwind().await {
                Ok(Some(ErrorAction::GoToNextLowerLevelAndStop)) => {
                    vote = Some(ErrorAction::GoToNextLowerLevelAndStop);
                }
                Ok(Some(ErrorAction::Ignore)) => {
                    if vote.is_none() {
                        vote = Some(ErrorAction::Ignore);
                    }
                }
                Ok(None) => {}
                Err(panic) => {
                    eprintln!(
                        "[levelvisor] listener '{}' panicked in on_error: {:?}",
                        listener.name(),
                        panic
                    );
                }
            }
        }
        self.end_callback();
        vote.unwrap_or_else(|| info.default_action())
    }

    /// Runs a level snapshot through the sorter chain. A sorter returning
    /// `None` leaves the order unchanged; a panicking sorter is skipped.
    pub(crate) fn apply_sorters(
        &self,
        mut handles: Vec<Arc<ServiceHandle>>,
    ) -> Vec<Arc<ServiceHandle>> {
        for sorter in self.sorters.iter() {
            match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                sorter.sort(&handles)
            })) {
                Ok(Some(next)) => handles = next,
                Ok(None) => {}
                Err(_) => {
                    eprintln!(
                        "[levelvisor] sorter '{}' panicked; order unchanged",
                        sorter.name()
                    );
                }
            }
        }
        handles
    }
}
